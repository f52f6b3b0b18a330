//! In-memory reference backend.
//!
//! Used by the integration tests and as executable documentation of
//! the [`StoreBackend`] contract. Change tracking follows the backend
//! duty split: every mutation allocates a change number from the
//! shared local counter and rewrites the row's change key and
//! predecessor list. Deletions leave tombstones so incremental
//! downloads can report them.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fxics_dtyp::eid::gid_bytes;
use fxics_dtyp::{Cn, FileTime, Fmid, GlobCnt, Guid, PredecessorChangeList, ReplId};
use fxics_props::{PropertyTag, PropertyValue, pidtag};

use crate::{Error, Result};

use super::{
    DeleteMode, MessageData, ObjectRef, PropertyRow, ReadFlags, RecipientRow, Restriction,
    StoreBackend, TableKind,
};

/// Default last-modification time stamped on rows created through the
/// builder API without one.
const DEFAULT_MODIFICATION_SECS: i64 = 0x4dbb_2dbe;

#[derive(Default)]
struct MessageEntry {
    associated: bool,
    read_write: bool,
    read: bool,
    properties: BTreeMap<u32, PropertyValue>,
    recipients: Vec<(u32, BTreeMap<u32, PropertyValue>)>,
    attachments: Vec<BTreeMap<u32, PropertyValue>>,
}

struct Tombstone {
    fmid: Fmid,
    cn: Cn,
    associated: bool,
}

#[derive(Default)]
struct FolderEntry {
    parent: Option<Fmid>,
    children: Vec<Fmid>,
    properties: BTreeMap<u32, PropertyValue>,
    messages: BTreeMap<u64, MessageEntry>,
    tombstones: Vec<Tombstone>,
}

struct Inner {
    next_glob: u64,
    folders: BTreeMap<u64, FolderEntry>,
}

/// A whole mailbox in memory, behind one mutex.
pub struct MemoryStore {
    replica_guid: Guid,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(replica_guid: Guid) -> Self {
        MemoryStore {
            replica_guid,
            inner: Mutex::new(Inner {
                next_glob: 1,
                folders: BTreeMap::new(),
            }),
        }
    }

    pub fn replica_guid(&self) -> Guid {
        self.replica_guid
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current local counter value; the next allocation starts
    /// here.
    pub fn current_counter(&self) -> u64 {
        self.lock().next_glob
    }

    /// Adds a folder with a display name and change number. Builder
    /// API for tests and provisioning.
    pub fn add_folder(&self, parent: Option<Fmid>, fid: Fmid, name: &str, cn: Cn) -> Result<()> {
        let guid = self.replica_guid;
        let mut inner = self.lock();
        inner.note_glob(fid.globcnt().value());
        inner.note_glob(cn.globcnt().value());
        if let Some(parent_fid) = parent {
            let parent_entry = inner.folder_mut(parent_fid)?;
            parent_entry.children.push(fid);
        }
        let mut entry = FolderEntry {
            parent,
            ..Default::default()
        };
        entry.properties.insert(
            pidtag::DISPLAY_NAME.0,
            PropertyValue::Unicode(name.to_string()),
        );
        stamp_change(&mut entry.properties, &guid, cn);
        default_modification_time(&mut entry.properties);
        inner.folders.insert(fid.0, entry);
        Ok(())
    }

    /// Adds a message with its change number and extra properties.
    pub fn add_message(
        &self,
        folder: Fmid,
        mid: Fmid,
        cn: Cn,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        self.add_message_inner(folder, mid, cn, false, properties)
    }

    /// Adds a folder-associated message.
    pub fn add_fai_message(
        &self,
        folder: Fmid,
        mid: Fmid,
        cn: Cn,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        self.add_message_inner(folder, mid, cn, true, properties)
    }

    fn add_message_inner(
        &self,
        folder: Fmid,
        mid: Fmid,
        cn: Cn,
        associated: bool,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        let guid = self.replica_guid;
        let mut inner = self.lock();
        inner.note_glob(mid.globcnt().value());
        inner.note_glob(cn.globcnt().value());
        let entry_props = {
            let mut props = BTreeMap::new();
            stamp_change(&mut props, &guid, cn);
            for (tag, value) in properties {
                props.insert(tag.0, value.clone());
            }
            default_modification_time(&mut props);
            props
        };
        let folder_entry = inner.folder_mut(folder)?;
        folder_entry.messages.insert(
            mid.0,
            MessageEntry {
                associated,
                properties: entry_props,
                ..Default::default()
            },
        );
        Ok(())
    }

    /// Attaches a recipient row to a message.
    pub fn add_recipient(
        &self,
        folder: Fmid,
        mid: Fmid,
        recipient_type: u32,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner.message_mut(folder, mid)?;
        let props = properties
            .iter()
            .map(|(tag, value)| (tag.0, value.clone()))
            .collect();
        entry.recipients.push((recipient_type, props));
        Ok(())
    }

    /// Attaches an attachment row to a message.
    pub fn add_attachment(
        &self,
        folder: Fmid,
        mid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner.message_mut(folder, mid)?;
        let props = properties
            .iter()
            .map(|(tag, value)| (tag.0, value.clone()))
            .collect();
        entry.attachments.push(props);
        Ok(())
    }

    /// Test accessor: a message property as stored.
    pub fn message_property(
        &self,
        folder: Fmid,
        mid: Fmid,
        tag: PropertyTag,
    ) -> Option<PropertyValue> {
        let inner = self.lock();
        inner
            .folders
            .get(&folder.0)?
            .messages
            .get(&mid.0)?
            .properties
            .get(&tag.0)
            .cloned()
    }

    /// Test accessor: whether the message exists.
    pub fn contains_message(&self, folder: Fmid, mid: Fmid) -> bool {
        let inner = self.lock();
        inner
            .folders
            .get(&folder.0)
            .is_some_and(|f| f.messages.contains_key(&mid.0))
    }

    /// Test accessor: whether the folder exists.
    pub fn contains_folder(&self, fid: Fmid) -> bool {
        self.lock().folders.contains_key(&fid.0)
    }

    /// Test accessor: the message's read state.
    pub fn message_read(&self, folder: Fmid, mid: Fmid) -> Option<bool> {
        let inner = self.lock();
        Some(inner.folders.get(&folder.0)?.messages.get(&mid.0)?.read)
    }

    /// Test accessor: a folder property as stored.
    pub fn folder_property(&self, fid: Fmid, tag: PropertyTag) -> Option<PropertyValue> {
        let inner = self.lock();
        inner.folders.get(&fid.0)?.properties.get(&tag.0).cloned()
    }
}

impl Inner {
    fn alloc(&mut self) -> u64 {
        let value = self.next_glob;
        self.next_glob += 1;
        value
    }

    fn alloc_cn(&mut self) -> Cn {
        let value = self.alloc();
        Cn::new(ReplId::LOCAL, GlobCnt::new(value))
    }

    fn note_glob(&mut self, used: u64) {
        if used >= self.next_glob {
            self.next_glob = used + 1;
        }
    }

    fn folder(&self, fid: Fmid) -> Result<&FolderEntry> {
        self.folders.get(&fid.0).ok_or(Error::NotFound)
    }

    fn folder_mut(&mut self, fid: Fmid) -> Result<&mut FolderEntry> {
        self.folders.get_mut(&fid.0).ok_or(Error::NotFound)
    }

    fn message_mut(&mut self, folder: Fmid, mid: Fmid) -> Result<&mut MessageEntry> {
        self.folder_mut(folder)?
            .messages
            .get_mut(&mid.0)
            .ok_or(Error::NotFound)
    }
}

/// Rewrites a row's change-tracking triple for a new change number.
fn stamp_change(properties: &mut BTreeMap<u32, PropertyValue>, guid: &Guid, cn: Cn) {
    let change_key = gid_bytes(guid, cn.globcnt().value());
    let predecessors = match properties.get(&pidtag::PREDECESSOR_CHANGE_LIST.0) {
        Some(PropertyValue::Binary(existing)) => {
            let mut list = PredecessorChangeList::from_bytes(existing.clone());
            list.push_front(&change_key);
            list
        }
        _ => PredecessorChangeList::from_change_key(&change_key),
    };
    properties.insert(pidtag::CHANGE_NUMBER.0, PropertyValue::I8(cn.0));
    properties.insert(
        pidtag::CHANGE_KEY.0,
        PropertyValue::Binary(change_key),
    );
    properties.insert(
        pidtag::PREDECESSOR_CHANGE_LIST.0,
        PropertyValue::Binary(predecessors.into_bytes()),
    );
}

fn default_modification_time(properties: &mut BTreeMap<u32, PropertyValue>) {
    properties.entry(pidtag::LAST_MODIFICATION_TIME.0).or_insert(
        PropertyValue::SysTime(FileTime::from_unix_seconds(DEFAULT_MODIFICATION_SECS)),
    );
}

fn message_row_value(
    fid: Fmid,
    mid: u64,
    entry: &MessageEntry,
    tag: PropertyTag,
) -> Option<PropertyValue> {
    if tag == pidtag::MID {
        Some(PropertyValue::I8(mid))
    } else if tag == pidtag::FID {
        Some(PropertyValue::I8(fid.0))
    } else if tag == pidtag::ASSOCIATED {
        Some(PropertyValue::Bool(entry.associated))
    } else {
        entry.properties.get(&tag.0).cloned()
    }
}

fn folder_row_value(
    fid: Fmid,
    entry: &FolderEntry,
    tag: PropertyTag,
) -> Option<PropertyValue> {
    if tag == pidtag::FID {
        Some(PropertyValue::I8(fid.0))
    } else if tag == pidtag::PARENT_FID {
        entry.parent.map(|p| PropertyValue::I8(p.0))
    } else {
        entry.properties.get(&tag.0).cloned()
    }
}

fn row_passes(restriction: Option<&Restriction>, cn_value: Option<&PropertyValue>) -> bool {
    match restriction {
        None => true,
        Some(Restriction::ChangeNumberGreaterThan(threshold)) => match cn_value {
            Some(PropertyValue::I8(cn)) => *cn > threshold.0,
            _ => true,
        },
    }
}

impl StoreBackend for MemoryStore {
    fn open_folder(&self, fid: Fmid) -> Result<()> {
        self.lock().folder(fid).map(|_| ())
    }

    fn create_folder(
        &self,
        parent: Fmid,
        fid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        let guid = self.replica_guid;
        let mut inner = self.lock();
        inner.note_glob(fid.globcnt().value());
        inner.folder(parent)?;
        if inner.folders.contains_key(&fid.0) {
            return Err(Error::CallFailed("folder already exists".into()));
        }
        let mut props: BTreeMap<u32, PropertyValue> = properties
            .iter()
            .map(|(tag, value)| (tag.0, value.clone()))
            .collect();
        let cn = match props.get(&pidtag::CHANGE_NUMBER.0) {
            Some(PropertyValue::I8(cn)) => Fmid(*cn),
            _ => inner.alloc_cn(),
        };
        inner.note_glob(cn.globcnt().value());
        stamp_change(&mut props, &guid, cn);
        default_modification_time(&mut props);
        inner.folders.insert(
            fid.0,
            FolderEntry {
                parent: Some(parent),
                properties: props,
                ..Default::default()
            },
        );
        inner.folder_mut(parent)?.children.push(fid);
        Ok(())
    }

    fn delete_folder(&self, fid: Fmid) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner.folders.remove(&fid.0).ok_or(Error::NotFound)?;
        let mut pending = entry.children;
        while let Some(child) = pending.pop() {
            if let Some(child_entry) = inner.folders.remove(&child.0) {
                pending.extend(child_entry.children);
            }
        }
        if let Some(parent) = entry.parent {
            if let Ok(parent_entry) = inner.folder_mut(parent) {
                parent_entry.children.retain(|c| *c != fid);
            }
        }
        Ok(())
    }

    fn set_folder_properties(
        &self,
        fid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        let guid = self.replica_guid;
        let mut inner = self.lock();
        let cn = inner.alloc_cn();
        let entry = inner.folder_mut(fid)?;
        for (tag, value) in properties {
            entry.properties.insert(tag.0, value.clone());
        }
        stamp_change(&mut entry.properties, &guid, cn);
        Ok(())
    }

    fn open_message(&self, folder: Fmid, mid: Fmid) -> Result<MessageData> {
        let inner = self.lock();
        let entry = inner
            .folder(folder)?
            .messages
            .get(&mid.0)
            .ok_or(Error::NotFound)?;

        let mut column_ids: Vec<u32> = entry
            .recipients
            .iter()
            .flat_map(|(_, props)| props.keys().copied())
            .collect();
        column_ids.sort_unstable();
        column_ids.dedup();
        let recipient_columns: Vec<PropertyTag> =
            column_ids.iter().map(|&id| PropertyTag(id)).collect();

        let recipients = entry
            .recipients
            .iter()
            .map(|(recipient_type, props)| RecipientRow {
                recipient_type: *recipient_type,
                values: column_ids
                    .iter()
                    .map(|id| props.get(id).cloned())
                    .collect(),
            })
            .collect();

        Ok(MessageData {
            recipient_columns,
            recipients,
        })
    }

    fn create_message(&self, folder: Fmid, mid: Fmid, associated: bool) -> Result<()> {
        let guid = self.replica_guid;
        let mut inner = self.lock();
        inner.note_glob(mid.globcnt().value());
        let cn = inner.alloc_cn();
        let entry = inner.folder_mut(folder)?;
        let mut properties = BTreeMap::new();
        stamp_change(&mut properties, &guid, cn);
        default_modification_time(&mut properties);
        entry.messages.insert(
            mid.0,
            MessageEntry {
                associated,
                read_write: true,
                properties,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn set_message_properties(
        &self,
        folder: Fmid,
        mid: Fmid,
        properties: &[(PropertyTag, PropertyValue)],
    ) -> Result<()> {
        let guid = self.replica_guid;
        let mut inner = self.lock();
        let cn = inner.alloc_cn();
        let entry = inner.message_mut(folder, mid)?;
        for (tag, value) in properties {
            entry.properties.insert(tag.0, value.clone());
        }
        stamp_change(&mut entry.properties, &guid, cn);
        Ok(())
    }

    fn delete_message(&self, folder: Fmid, mid: Fmid, _mode: DeleteMode) -> Result<()> {
        let mut inner = self.lock();
        let cn = inner.alloc_cn();
        let entry = inner.folder_mut(folder)?;
        let removed = entry.messages.remove(&mid.0).ok_or(Error::NotFound)?;
        entry.tombstones.push(Tombstone {
            fmid: mid,
            cn,
            associated: removed.associated,
        });
        Ok(())
    }

    fn available_properties(&self, fid: Fmid, kind: TableKind) -> Result<Vec<PropertyTag>> {
        let inner = self.lock();
        let entry = inner.folder(fid)?;
        let mut ids: Vec<u32> = match kind {
            TableKind::Message | TableKind::Fai => {
                let associated = kind == TableKind::Fai;
                entry
                    .messages
                    .values()
                    .filter(|m| m.associated == associated)
                    .flat_map(|m| m.properties.keys().copied())
                    .collect()
            }
            TableKind::Folder => entry
                .children
                .iter()
                .filter_map(|child| inner.folders.get(&child.0))
                .flat_map(|f| f.properties.keys().copied())
                .collect(),
            TableKind::Attachment => return Err(Error::InvalidParameter("attachment table")),
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.into_iter().map(PropertyTag).collect())
    }

    fn table_rows(
        &self,
        fid: Fmid,
        kind: TableKind,
        columns: &[PropertyTag],
        restriction: Option<&Restriction>,
    ) -> Result<Vec<PropertyRow>> {
        let inner = self.lock();
        let entry = inner.folder(fid)?;
        let mut rows = Vec::new();
        match kind {
            TableKind::Message | TableKind::Fai => {
                let associated = kind == TableKind::Fai;
                for (&mid, message) in &entry.messages {
                    if message.associated != associated {
                        continue;
                    }
                    if !row_passes(
                        restriction,
                        message.properties.get(&pidtag::CHANGE_NUMBER.0),
                    ) {
                        continue;
                    }
                    rows.push(PropertyRow::new(
                        columns
                            .iter()
                            .map(|&tag| message_row_value(fid, mid, message, tag))
                            .collect(),
                    ));
                }
            }
            TableKind::Folder => {
                for child in &entry.children {
                    let Some(child_entry) = inner.folders.get(&child.0) else {
                        continue;
                    };
                    if !row_passes(
                        restriction,
                        child_entry.properties.get(&pidtag::CHANGE_NUMBER.0),
                    ) {
                        continue;
                    }
                    rows.push(PropertyRow::new(
                        columns
                            .iter()
                            .map(|&tag| folder_row_value(*child, child_entry, tag))
                            .collect(),
                    ));
                }
            }
            TableKind::Attachment => return Err(Error::InvalidParameter("attachment table")),
        }
        Ok(rows)
    }

    fn attachment_rows(
        &self,
        folder: Fmid,
        mid: Fmid,
        columns: &[PropertyTag],
    ) -> Result<Vec<PropertyRow>> {
        let inner = self.lock();
        let entry = inner
            .folder(folder)?
            .messages
            .get(&mid.0)
            .ok_or(Error::NotFound)?;
        Ok(entry
            .attachments
            .iter()
            .map(|props| {
                PropertyRow::new(
                    columns
                        .iter()
                        .map(|tag| props.get(&tag.0).cloned())
                        .collect(),
                )
            })
            .collect())
    }

    fn object_available_properties(&self, object: &ObjectRef) -> Result<Vec<PropertyTag>> {
        let inner = self.lock();
        let ids: Vec<u32> = match object {
            ObjectRef::Folder(fid) => inner.folder(*fid)?.properties.keys().copied().collect(),
            ObjectRef::Message { folder, message } => inner
                .folder(*folder)?
                .messages
                .get(&message.0)
                .ok_or(Error::NotFound)?
                .properties
                .keys()
                .copied()
                .collect(),
        };
        Ok(ids.into_iter().map(PropertyTag).collect())
    }

    fn object_properties(
        &self,
        object: &ObjectRef,
        columns: &[PropertyTag],
    ) -> Result<PropertyRow> {
        let inner = self.lock();
        let values = match object {
            ObjectRef::Folder(fid) => {
                let entry = inner.folder(*fid)?;
                columns
                    .iter()
                    .map(|&tag| folder_row_value(*fid, entry, tag))
                    .collect()
            }
            ObjectRef::Message { folder, message } => {
                let entry = inner
                    .folder(*folder)?
                    .messages
                    .get(&message.0)
                    .ok_or(Error::NotFound)?;
                columns
                    .iter()
                    .map(|&tag| message_row_value(*folder, message.0, entry, tag))
                    .collect()
            }
        };
        Ok(PropertyRow::new(values))
    }

    fn deleted_fmids(&self, fid: Fmid, kind: TableKind, since: Cn) -> Result<(Vec<Fmid>, Cn)> {
        let associated = kind == TableKind::Fai;
        let inner = self.lock();
        let entry = inner.folder(fid)?;
        let mut high = since;
        let mut deleted = Vec::new();
        for tombstone in &entry.tombstones {
            if tombstone.associated == associated && tombstone.cn.0 > since.0 {
                deleted.push(tombstone.fmid);
                if tombstone.cn.0 > high.0 {
                    high = tombstone.cn;
                }
            }
        }
        Ok((deleted, high))
    }

    fn move_message(
        &self,
        source_folder: Fmid,
        destination_folder: Fmid,
        source_mid: Fmid,
        destination_mid: Fmid,
        change_key: &[u8],
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.note_glob(destination_mid.globcnt().value());
        let cn = inner.alloc_cn();

        let source_entry = inner.folder_mut(source_folder)?;
        let mut message = source_entry
            .messages
            .remove(&source_mid.0)
            .ok_or(Error::NotFound)?;
        source_entry.tombstones.push(Tombstone {
            fmid: source_mid,
            cn,
            associated: message.associated,
        });

        let predecessors = match message.properties.get(&pidtag::PREDECESSOR_CHANGE_LIST.0) {
            Some(PropertyValue::Binary(existing)) => {
                let mut list = PredecessorChangeList::from_bytes(existing.clone());
                list.push_front(change_key);
                list
            }
            _ => PredecessorChangeList::from_change_key(change_key),
        };
        message
            .properties
            .insert(pidtag::CHANGE_NUMBER.0, PropertyValue::I8(cn.0));
        message.properties.insert(
            pidtag::CHANGE_KEY.0,
            PropertyValue::Binary(change_key.to_vec()),
        );
        message.properties.insert(
            pidtag::PREDECESSOR_CHANGE_LIST.0,
            PropertyValue::Binary(predecessors.into_bytes()),
        );

        inner
            .folder_mut(destination_folder)?
            .messages
            .insert(destination_mid.0, message);
        Ok(())
    }

    fn set_read_flag(&self, folder: Fmid, mid: Fmid, flags: ReadFlags) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner.message_mut(folder, mid)?;
        if flags.clear_read_flag() {
            entry.read = false;
        } else {
            entry.read = true;
        }
        Ok(())
    }

    fn indexing_remove_mid(&self, mid: Fmid, _mode: DeleteMode) -> Result<()> {
        log::trace!("indexing record dropped for {mid}");
        Ok(())
    }

    fn reserve_id_range(&self, count: u64) -> Result<GlobCnt> {
        if count == 0 {
            return Err(Error::InvalidParameter("empty id range"));
        }
        let mut inner = self.lock();
        let first = inner.next_glob;
        inner.next_glob += count;
        Ok(GlobCnt::new(first))
    }

    fn next_change_number(&self) -> Result<Cn> {
        Ok(self.lock().alloc_cn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid() -> Guid {
        "11111111-2222-3333-4444-555555555555".parse().unwrap()
    }

    fn fid(glob: u64) -> Fmid {
        Fmid::new(ReplId::LOCAL, GlobCnt::new(glob))
    }

    #[test]
    fn change_stamping_tracks_modifications() {
        let store = MemoryStore::new(guid());
        let folder = fid(0x10);
        store.add_folder(None, folder, "Inbox", Fmid(0x11_0001)).unwrap();
        let mid = fid(0x20);
        store.add_message(folder, mid, Fmid(0x21_0001), &[]).unwrap();

        let before = store
            .message_property(folder, mid, pidtag::CHANGE_NUMBER)
            .unwrap();
        store
            .set_message_properties(
                folder,
                mid,
                &[(pidtag::MESSAGE_SIZE, PropertyValue::Long(10))],
            )
            .unwrap();
        let after = store
            .message_property(folder, mid, pidtag::CHANGE_NUMBER)
            .unwrap();
        assert_ne!(before, after);

        let Some(PropertyValue::Binary(pcl)) =
            store.message_property(folder, mid, pidtag::PREDECESSOR_CHANGE_LIST)
        else {
            panic!("missing predecessor list");
        };
        let list = PredecessorChangeList::from_bytes(pcl);
        assert_eq!(list.entries().count(), 2);
    }

    #[test]
    fn restriction_filters_rows() {
        let store = MemoryStore::new(guid());
        let folder = fid(0x10);
        store.add_folder(None, folder, "Inbox", Fmid(0x11_0001)).unwrap();
        store
            .add_message(folder, fid(0x20), Fmid(0x21_0001), &[])
            .unwrap();
        store
            .add_message(folder, fid(0x30), Fmid(0x31_0001), &[])
            .unwrap();

        let all = store
            .table_rows(folder, TableKind::Message, &[pidtag::MID], None)
            .unwrap();
        assert_eq!(all.len(), 2);

        let restricted = store
            .table_rows(
                folder,
                TableKind::Message,
                &[pidtag::MID],
                Some(&Restriction::ChangeNumberGreaterThan(Fmid(0x21_0001))),
            )
            .unwrap();
        assert_eq!(restricted.len(), 1);
        assert_eq!(
            restricted[0].values[0],
            Some(PropertyValue::I8(fid(0x30).0))
        );
    }

    #[test]
    fn deletions_leave_tombstones() {
        let store = MemoryStore::new(guid());
        let folder = fid(0x10);
        store.add_folder(None, folder, "Inbox", Fmid(0x11_0001)).unwrap();
        let mid = fid(0x20);
        store.add_message(folder, mid, Fmid(0x21_0001), &[]).unwrap();
        store.delete_message(folder, mid, DeleteMode::Hard).unwrap();

        let (deleted, high) = store
            .deleted_fmids(folder, TableKind::Message, Fmid(0))
            .unwrap();
        assert_eq!(deleted, vec![mid]);
        assert!(high.0 > 0x21_0001);

        let (none, _) = store.deleted_fmids(folder, TableKind::Fai, Fmid(0)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn id_reservation_is_contiguous() {
        let store = MemoryStore::new(guid());
        let first = store.reserve_id_range(5).unwrap();
        let second = store.reserve_id_range(5).unwrap();
        assert!(second.value() >= first.value() + 5);
    }
}
