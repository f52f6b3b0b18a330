//! ROP operation numbers.

use binrw::prelude::*;

/// Synchronization and FastTransfer ROP opnums served by the engine.
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[brw(little, repr(u8))]
pub enum RopOpnum {
    FastTransferSourceCopyTo = 0x4D,
    FastTransferSourceGetBuffer = 0x4E,
    SyncConfigure = 0x70,
    SyncImportMessageChange = 0x72,
    SyncImportHierarchyChange = 0x73,
    SyncImportDeletes = 0x74,
    SyncUploadStateStreamBegin = 0x75,
    SyncUploadStateStreamContinue = 0x76,
    SyncUploadStateStreamEnd = 0x77,
    SyncImportMessageMove = 0x78,
    SyncOpenCollector = 0x7E,
    GetLocalReplicaIds = 0x7F,
    SyncImportReadStateChanges = 0x80,
    SyncGetTransferState = 0x82,
    SetLocalReplicaMidsetDeleted = 0x93,
}

impl std::fmt::Display for RopOpnum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RopOpnum::FastTransferSourceCopyTo => "FastTransferSourceCopyTo",
            RopOpnum::FastTransferSourceGetBuffer => "FastTransferSourceGetBuffer",
            RopOpnum::SyncConfigure => "SyncConfigure",
            RopOpnum::SyncImportMessageChange => "SyncImportMessageChange",
            RopOpnum::SyncImportHierarchyChange => "SyncImportHierarchyChange",
            RopOpnum::SyncImportDeletes => "SyncImportDeletes",
            RopOpnum::SyncUploadStateStreamBegin => "SyncUploadStateStreamBegin",
            RopOpnum::SyncUploadStateStreamContinue => "SyncUploadStateStreamContinue",
            RopOpnum::SyncUploadStateStreamEnd => "SyncUploadStateStreamEnd",
            RopOpnum::SyncImportMessageMove => "SyncImportMessageMove",
            RopOpnum::SyncOpenCollector => "SyncOpenCollector",
            RopOpnum::GetLocalReplicaIds => "GetLocalReplicaIds",
            RopOpnum::SyncImportReadStateChanges => "SyncImportReadStateChanges",
            RopOpnum::SyncGetTransferState => "SyncGetTransferState",
            RopOpnum::SetLocalReplicaMidsetDeleted => "SetLocalReplicaMidsetDeleted",
        };
        write!(f, "{} ({:#04x})", name, *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_tests::*;

    test_binrw! {
        RopOpnum => sync_configure: RopOpnum::SyncConfigure => "70"
    }

    #[test]
    fn display_includes_opnum() {
        assert_eq!(
            RopOpnum::SyncGetTransferState.to_string(),
            "SyncGetTransferState (0x82)"
        );
    }
}
