//! The store backend abstraction.
//!
//! The engine never touches persistent state directly: folders,
//! messages, attachments, recipients and the change-number sequence
//! all live behind [`StoreBackend`]. Backends may block; the engine is
//! called from per-session threads and performs no I/O of its own.
//!
//! Capability probes (`supports_tombstones`, `supports_moves`) are the
//! only backend differences the sync core is allowed to observe.

use modular_bitfield::prelude::*;

use fxics_dtyp::bitfield_binrw;
use fxics_dtyp::{Cn, Fmid, GlobCnt};
use fxics_props::{PropertyTag, PropertyValue};

use crate::Result;

mod memory;

pub use memory::MemoryStore;

/// Which row collection of a folder (or message) a table walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Child folders.
    Folder,
    /// Normal messages.
    Message,
    /// Folder-associated (FAI) messages.
    Fai,
    /// Attachments of one message.
    Attachment,
}

/// Message deletion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Recoverable delete; the row moves to the soft-deleted state.
    Soft,
    /// Permanent delete.
    Hard,
}

/// Read-flag bits applied by the read-state import.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFlags {
    pub suppress_receipt: bool,
    #[skip]
    __: B1,
    pub clear_read_flag: bool,
    #[skip]
    __: B1,
    pub generate_receipt_only: bool,
    pub clear_rn_pending: bool,
    pub clear_nrn_pending: bool,
    #[skip]
    __: B1,
}
bitfield_binrw!(ReadFlags, 1);

impl ReadFlags {
    /// Flags applied when a client marks a message read.
    pub fn mark_read() -> Self {
        ReadFlags::new()
            .with_suppress_receipt(true)
            .with_clear_rn_pending(true)
    }

    /// Flags applied when a client marks a message unread.
    pub fn mark_unread() -> Self {
        ReadFlags::new()
            .with_clear_read_flag(true)
            .with_clear_nrn_pending(true)
    }
}

/// Row filter handed to table walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    /// Keep rows whose change number is strictly greater.
    ChangeNumberGreaterThan(Cn),
}

/// One table row: values parallel to the requested column list, with
/// `None` for columns the row does not carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyRow {
    pub values: Vec<Option<PropertyValue>>,
}

impl PropertyRow {
    pub fn new(values: Vec<Option<PropertyValue>>) -> Self {
        PropertyRow { values }
    }
}

/// One recipient of an opened message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientRow {
    /// To/Cc/Bcc discriminant.
    pub recipient_type: u32,
    /// Values parallel to [`MessageData::recipient_columns`].
    pub values: Vec<Option<PropertyValue>>,
}

/// What an opened message exposes to the sync producers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageData {
    pub recipient_columns: Vec<PropertyTag>,
    pub recipients: Vec<RecipientRow>,
}

/// A folder or message referenced as a property-bearing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    Folder(Fmid),
    Message { folder: Fmid, message: Fmid },
}

/// The persistent mailbox store.
///
/// Change tracking is the backend's duty: rows carry
/// `PidTagChangeNumber`, `PidTagChangeKey` and
/// `PidTagPredecessorChangeList`, updated on every mutation.
pub trait StoreBackend: Send + Sync {
    /// Verifies a folder exists and is accessible.
    fn open_folder(&self, fid: Fmid) -> Result<()>;

    /// Creates a folder under `parent` with the given initial
    /// properties.
    fn create_folder(
        &self,
        parent: Fmid,
        fid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()>;

    /// Deletes a folder and its subtree.
    fn delete_folder(&self, fid: Fmid) -> Result<()>;

    fn set_folder_properties(
        &self,
        fid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()>;

    /// Opens a message, returning its recipient table.
    fn open_message(&self, folder: Fmid, mid: Fmid) -> Result<MessageData>;

    /// Creates an empty read-write message.
    fn create_message(&self, folder: Fmid, mid: Fmid, associated: bool) -> Result<()>;

    /// Applies every supplied property, or none of them.
    fn set_message_properties(
        &self,
        folder: Fmid,
        mid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()>;

    fn delete_message(&self, folder: Fmid, mid: Fmid, mode: DeleteMode) -> Result<()>;

    /// Column tags a table of this kind can produce, beyond the
    /// engine-computed ones.
    fn available_properties(&self, fid: Fmid, kind: TableKind) -> Result<Vec<PropertyTag>>;

    /// Walks a folder table, returning one row per object with values
    /// parallel to `columns`.
    fn table_rows(
        &self,
        fid: Fmid,
        kind: TableKind,
        columns: &[PropertyTag],
        restriction: Option<&Restriction>,
    ) -> Result<Vec<PropertyRow>>;

    /// Walks the attachment table of one message.
    fn attachment_rows(
        &self,
        folder: Fmid,
        mid: Fmid,
        columns: &[PropertyTag],
    ) -> Result<Vec<PropertyRow>>;

    /// Property tags available on a single object.
    fn object_available_properties(&self, object: &ObjectRef) -> Result<Vec<PropertyTag>>;

    /// Fetches properties of a single object.
    fn object_properties(
        &self,
        object: &ObjectRef,
        columns: &[PropertyTag],
    ) -> Result<PropertyRow>;

    /// Ids deleted from a folder table since a change number, plus the
    /// change number that covers the reported tombstones.
    fn deleted_fmids(&self, fid: Fmid, kind: TableKind, since: Cn) -> Result<(Vec<Fmid>, Cn)>;

    /// Moves one message, recording the supplied change key on the
    /// destination row.
    fn move_message(
        &self,
        source_folder: Fmid,
        destination_folder: Fmid,
        source_mid: Fmid,
        destination_mid: Fmid,
        change_key: &[u8],
    ) -> Result<()>;

    fn set_read_flag(&self, folder: Fmid, mid: Fmid, flags: ReadFlags) -> Result<()>;

    /// Drops a message id from the indexing map after deletion.
    fn indexing_remove_mid(&self, mid: Fmid, mode: DeleteMode) -> Result<()>;

    /// Atomically reserves `count` consecutive ids on the local
    /// replica, returning the first.
    fn reserve_id_range(&self, count: u64) -> Result<GlobCnt>;

    /// Allocates the next local change number.
    fn next_change_number(&self) -> Result<Cn>;

    /// Whether deletions are tracked and reportable.
    fn supports_tombstones(&self) -> bool {
        true
    }

    /// Whether cross-folder message moves are supported.
    fn supports_moves(&self) -> bool {
        true
    }
}
