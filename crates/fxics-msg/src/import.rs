//! Import (upload) ROPs: applying client changes to the store.

use binrw::prelude::*;
use fxics_dtyp::{Fmid, Guid};
use modular_bitfield::prelude::*;

use fxics_dtyp::bitfield_binrw;

use crate::values::{PropertyValueArray, SizedBlob};

/// Flags of the message-change import.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportFlags {
    #[skip]
    __: B4,
    /// The imported message is folder-associated (FAI).
    pub associated: bool,
    #[skip]
    __: B1,
    pub fail_on_conflict: bool,
    #[skip]
    __: B1,
}
bitfield_binrw!(ImportFlags, 1);

/// Flags of the deletes import.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportDeleteFlags {
    /// The source keys name folders, not messages.
    pub hierarchy: bool,
    /// Hard-delete instead of moving to soft-deleted state.
    pub hard_delete: bool,
    #[skip]
    __: B6,
}
bitfield_binrw!(ImportDeleteFlags, 1);

/// Creates or modifies a message from client-supplied properties. The
/// first property value is the message's source key.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct SyncImportMessageChangeRequest {
    /// Handle slot the opened/created message is placed in.
    pub output_handle_idx: u8,
    pub import_flags: ImportFlags,
    pub property_values: PropertyValueArray,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncImportMessageChangeResponse {
    /// Always zero.
    pub message_id: Fmid,
}

/// Creates or modifies a folder. `hierarchy_values[0]` is the parent
/// source key and `hierarchy_values[1]` the folder's own.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct SyncImportHierarchyChangeRequest {
    pub hierarchy_values: PropertyValueArray,
    pub property_values: PropertyValueArray,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncImportHierarchyChangeResponse {
    /// Always zero.
    pub folder_id: Fmid,
}

/// Applies client-side deletions. `property_values[0]` is a
/// multi-valued binary of source keys.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct SyncImportDeletesRequest {
    pub flags: ImportDeleteFlags,
    pub property_values: PropertyValueArray,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncImportDeletesResponse {}

/// Moves a message between folders, with all ids supplied as
/// replica-GUID-prefixed blobs.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncImportMessageMoveRequest {
    pub source_folder_id: SizedBlob,
    pub source_message_id: SizedBlob,
    pub destination_message_id: SizedBlob,
    /// Change key recorded on the moved message.
    pub change_number: SizedBlob,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncImportMessageMoveResponse {
    /// Always zero.
    pub message_id: Fmid,
}

/// Uploads read-state toggles as a packed stream of
/// [`crate::MessageReadState`] entries.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncImportReadStateChangesRequest {
    #[bw(try_calc = message_read_states.len().try_into())]
    #[br(temp)]
    size: u16,
    #[br(count = size)]
    pub message_read_states: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncImportReadStateChangesResponse {}

/// Reserves a contiguous range of ids on the local replica.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct GetLocalReplicaIdsRequest {
    pub id_count: u32,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct GetLocalReplicaIdsResponse {
    pub replica_guid: Guid,
    /// First reserved globcnt, little-endian.
    pub global_count: [u8; 6],
}
