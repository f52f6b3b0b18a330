//! Synchronization configure, state-upload, and state-query ROPs.

use binrw::prelude::*;
use fxics_props::PropertyTag;
use modular_bitfield::prelude::*;

use fxics_dtyp::bitfield_binrw;

use crate::fxtransfer::SendOptions;

/// What a synccontext synchronizes.
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[brw(little, repr(u8))]
pub enum SyncType {
    /// Messages of one folder (normal and/or FAI streams).
    Contents = 0x01,
    /// The folder subtree itself.
    Hierarchy = 0x02,
}

/// Synchronization flags.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncFlags {
    pub unicode: bool,
    pub no_deletions: bool,
    pub ignore_no_longer_in_scope: bool,
    pub read_state: bool,
    pub fai: bool,
    pub normal: bool,
    #[skip]
    __: B1,
    pub only_specified_properties: bool,
    pub no_foreign_identifiers: bool,
    pub no_soft_deletions: bool,
    #[skip]
    __: B1,
    pub best_body: bool,
    pub ignore_specified_on_fai: bool,
    #[skip]
    __: B1,
    pub progress: bool,
    #[skip]
    __: B1,
}
bitfield_binrw!(SyncFlags, 2);

/// Extra synchronization flags: which conditional header properties
/// the client wants echoed per change.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncExtraFlags {
    pub eid: bool,
    pub message_size: bool,
    pub cn: bool,
    pub order_by_delivery_time: bool,
    #[skip]
    __: B28,
}
bitfield_binrw!(SyncExtraFlags, 4);

/// Creates a synccontext for downloading changes from a folder.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct SyncConfigureRequest {
    /// Handle slot the created synccontext is placed in.
    pub output_handle_idx: u8,
    pub sync_type: SyncType,
    pub send_options: SendOptions,
    pub sync_flags: SyncFlags,
    #[bw(try_calc = restriction_data.len().try_into())]
    #[br(temp)]
    restriction_size: u16,
    /// Serialized restriction; opaque to the engine for now.
    #[br(count = restriction_size)]
    pub restriction_data: Vec<u8>,
    pub extra_flags: SyncExtraFlags,
    #[bw(try_calc = property_tags.len().try_into())]
    #[br(temp)]
    property_count: u16,
    /// Inclusion list under `only_specified_properties`, exclusion
    /// list otherwise.
    #[br(count = property_count)]
    pub property_tags: Vec<PropertyTag>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncConfigureResponse {}

/// Starts staging one state property upload.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncUploadStateStreamBeginRequest {
    /// One of the idset pseudo-property tags.
    pub state_property: PropertyTag,
    /// Announced total size; informational.
    pub transfer_buffer_size: u32,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncUploadStateStreamBeginResponse {}

/// Appends bytes to the staged state property.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncUploadStateStreamContinueRequest {
    #[bw(try_calc = stream_data.len().try_into())]
    #[br(temp)]
    stream_size: u32,
    #[br(count = stream_size)]
    pub stream_data: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncUploadStateStreamContinueResponse {}

/// Finishes the staged upload and applies the parsed idset.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncUploadStateStreamEndRequest {}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncUploadStateStreamEndResponse {}

/// Creates an upload collector over the handle's folder.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncOpenCollectorRequest {
    /// Handle slot the created collector is placed in.
    pub output_handle_idx: u8,
    #[br(map = |v: u8| v != 0)]
    #[bw(map = |v: &bool| u8::from(*v))]
    pub is_contents_collector: bool,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncOpenCollectorResponse {}

/// Materializes the synccontext's checkpoint state as a download
/// stream of its own.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SyncGetTransferStateRequest {
    /// Handle slot the created download context is placed in.
    pub output_handle_idx: u8,
    pub send_options: SendOptions,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SyncGetTransferStateResponse {}

/// Declares a range of local-replica mids as deleted. Accepted for
/// compatibility; backends without tombstone tracking treat it as a
/// no-op.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SetLocalReplicaMidsetDeletedRequest {
    #[bw(try_calc = data.len().try_into())]
    #[br(temp)]
    data_size: u16,
    /// Long-term-id range pairs, opaque here.
    #[br(count = data_size)]
    pub data: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[brw(little)]
pub struct SetLocalReplicaMidsetDeletedResponse {}
