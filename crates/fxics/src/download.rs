//! Change-stream producers: contents and hierarchy downloads, the
//! transfer-state stream, and the single-object property dump.
//!
//! All producers build the full stream (and its cutmark index) in one
//! pass; the chunked reader in [`crate::ftstream`] never observes a
//! partially built buffer.

use fxics_dtyp::eid::gid_bytes;
use fxics_dtyp::{Cn, FileTime, Fmid, GlobCnt, Guid, IdSet, PredecessorChangeList, RawIdSet, ReplId};
use fxics_props::pidtag::{self, metatag};
use fxics_props::{NamedPropResolver, PropertyTag, PropertyValue, PropertyWriter};

use crate::ftstream::FtContext;
use crate::session::Session;
use crate::store::{MessageData, ObjectRef, PropertyRow, Restriction, StoreBackend, TableKind};
use crate::synccontext::SyncContext;
use crate::{Error, Result};

/// Substitute modification time for rows that lack one: a fixed epoch
/// predating any change number this engine can produce.
const VERSION_TIME_SECS: i64 = 0x4dbb_2dbe;

/// Fixed column list of the attachment sub-blocks.
const ATTACHMENT_PROPERTIES: &[PropertyTag] = &[
    pidtag::ATTACH_METHOD,
    pidtag::ATTACH_TAG,
    pidtag::ATTACH_SIZE,
    pidtag::ATTACH_ENCODING,
    pidtag::ATTACH_FLAGS,
    pidtag::ATTACHMENT_FLAGS,
    pidtag::ATTACHMENT_HIDDEN,
    pidtag::ATTACHMENT_LINK_ID,
    pidtag::ATTACH_EXTENSION,
    pidtag::ATTACH_FILENAME,
    pidtag::ATTACH_LONG_FILENAME,
    pidtag::ATTACH_CONTENT_ID,
    pidtag::ATTACH_MIME_TAG,
    pidtag::DISPLAY_NAME,
    pidtag::CREATION_TIME,
    pidtag::LAST_MODIFICATION_TIME,
    pidtag::ATTACH_DATA_BIN,
    pidtag::ATTACHMENT_CONTACT_PHOTO,
    pidtag::RENDERING_POSITION,
    pidtag::RECORD_KEY,
];

/// Positions of the header-relevant columns within a computed
/// property list.
struct PropIndex {
    eid: usize,
    parent_fid: Option<usize>,
    change_number: usize,
    change_key: usize,
    predecessor_change_list: usize,
    last_modification_time: usize,
    display_name: Option<usize>,
    associated: Option<usize>,
    message_size: Option<usize>,
}

impl PropIndex {
    fn locate(columns: &[PropertyTag], contents: bool) -> Result<PropIndex> {
        let find = |tag: PropertyTag| columns.iter().position(|t| *t == tag);
        let eid_tag = if contents { pidtag::MID } else { pidtag::FID };
        let missing = |name: &str| Error::CallFailed(format!("column list lacks {name}"));
        Ok(PropIndex {
            eid: find(eid_tag).ok_or_else(|| missing("the object id"))?,
            parent_fid: find(pidtag::PARENT_FID),
            change_number: find(pidtag::CHANGE_NUMBER)
                .ok_or_else(|| missing("the change number"))?,
            change_key: find(pidtag::CHANGE_KEY).ok_or_else(|| missing("the change key"))?,
            predecessor_change_list: find(pidtag::PREDECESSOR_CHANGE_LIST)
                .ok_or_else(|| missing("the predecessor list"))?,
            last_modification_time: find(pidtag::LAST_MODIFICATION_TIME)
                .ok_or_else(|| missing("the modification time"))?,
            display_name: find(pidtag::DISPLAY_NAME),
            associated: find(pidtag::ASSOCIATED),
            message_size: find(pidtag::MESSAGE_SIZE),
        })
    }
}

/// Scan state shared across the table passes of one download.
struct SyncData {
    replica_guid: Guid,
    writer: PropertyWriter,
    eid_set: RawIdSet,
    deleted_eid_set: RawIdSet,
}

impl SyncData {
    fn new(replica_guid: Guid) -> SyncData {
        SyncData {
            replica_guid,
            writer: PropertyWriter::new(),
            eid_set: RawIdSet::new(false),
            deleted_eid_set: RawIdSet::new(false),
        }
    }
}

/// A row value by column position; short rows read as absent.
fn value_at(row: &PropertyRow, idx: usize) -> Option<&PropertyValue> {
    row.values.get(idx).and_then(|v| v.as_ref())
}

fn write_prop(
    writer: &mut PropertyWriter,
    resolver: &dyn NamedPropResolver,
    tag: PropertyTag,
    value: &PropertyValue,
) -> Result<()> {
    if !writer.write_property(resolver, tag, value)? {
        log::debug!("named property {tag} has no registry mapping, skipped");
    }
    Ok(())
}

/// The one-range watermark restriction, applicable only when the
/// client set holds exactly one range for the local replica.
fn cn_restriction(cnset: &IdSet, local: &Guid) -> Option<Restriction> {
    let ranges = cnset.ranges_for(&fxics_dtyp::IdSetReplica::Guid(*local))?;
    if ranges.len() != 1 {
        log::debug!("client change set is not a single range, walking unrestricted");
        return None;
    }
    Some(Restriction::ChangeNumberGreaterThan(Fmid(
        (ranges[0].high << 16) | u64::from(ReplId::LOCAL.0),
    )))
}

/// The change number tombstone queries resume from.
fn watermark_cn(cnset: &IdSet, local: &Guid) -> Cn {
    match cnset.ranges_for(&fxics_dtyp::IdSetReplica::Guid(*local)) {
        Some(ranges) if !ranges.is_empty() => {
            Fmid((ranges[0].high << 16) | u64::from(ReplId::LOCAL.0))
        }
        _ => Fmid(0),
    }
}

/// Materializes the download stream of a configured synccontext.
pub(crate) fn materialize_stream(session: &Session, ctx: &mut SyncContext) -> Result<FtContext> {
    if ctx.contents_mode {
        contents_stream(session, ctx)
    } else {
        hierarchy_stream(session, ctx)
    }
}

fn contents_stream(session: &Session, ctx: &mut SyncContext) -> Result<FtContext> {
    let mut data = SyncData::new(session.replicas().local_guid());

    if ctx.options.normal {
        let new_seen = push_message_changes(session, ctx, &mut data, TableKind::Message)?;
        ctx.cnset_seen = ctx.cnset_seen.merge(&new_seen.to_idset());
    }
    if ctx.options.fai {
        let new_seen = push_message_changes(session, ctx, &mut data, TableKind::Fai)?;
        ctx.cnset_seen_fai = ctx.cnset_seen_fai.merge(&new_seen.to_idset());
    }

    if !data.deleted_eid_set.is_empty() && !ctx.options.no_deletions {
        ctx.idset_given.remove_raw(&data.deleted_eid_set);
        let deleted = data.deleted_eid_set.to_idset_with_replid(ReplId::LOCAL);
        data.writer.write_marker(metatag::INCR_SYNC_DEL)?;
        data.writer
            .write_idset_property(metatag::IDSET_DELETED, &deleted)?;
    }

    data.writer.write_marker(metatag::INCR_SYNC_STATE_BEGIN)?;
    ctx.idset_given = ctx.idset_given.merge(&data.eid_set.to_idset());
    data.writer
        .write_idset_property(metatag::CNSET_SEEN, &ctx.cnset_seen)?;
    if ctx.options.fai {
        data.writer
            .write_idset_property(metatag::CNSET_SEEN_FAI, &ctx.cnset_seen_fai)?;
    }
    data.writer
        .write_idset_property(metatag::IDSET_GIVEN, &ctx.idset_given)?;
    if ctx.options.read_state {
        data.writer
            .write_idset_property(metatag::CNSET_READ, &ctx.cnset_read)?;
    }
    data.writer.write_marker(metatag::INCR_SYNC_STATE_END)?;
    data.writer.write_marker(metatag::INCR_SYNC_END)?;

    let (buffer, cutmarks) = data.writer.finish();
    Ok(FtContext::new(buffer, cutmarks))
}

/// Emits every changed message of one table, returning the raw set of
/// newly seen change numbers (tombstone coverage included).
fn push_message_changes(
    session: &Session,
    ctx: &SyncContext,
    data: &mut SyncData,
    kind: TableKind,
) -> Result<RawIdSet> {
    let store = session.store();
    let registry = session.registry();
    let (original_cnset, columns) = if kind == TableKind::Fai {
        (&ctx.cnset_seen_fai, &ctx.fai_properties)
    } else {
        (&ctx.cnset_seen, &ctx.properties)
    };
    let index = PropIndex::locate(columns, true)?;
    let mut new_seen = RawIdSet::new(true);

    let restriction = cn_restriction(original_cnset, &data.replica_guid);
    let rows = store.table_rows(ctx.folder, kind, columns, restriction.as_ref())?;

    for row in &rows {
        let Some(PropertyValue::I8(eid_raw)) = value_at(row, index.eid) else {
            log::warn!("message row without an id, skipped");
            continue;
        };
        let eid = Fmid(*eid_raw);
        if eid == Fmid::INVALID {
            log::error!("message row without a valid id, skipped");
            continue;
        }
        let message = match store.open_message(ctx.folder, eid) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("message {eid} could not be opened, skipped: {err}");
                continue;
            }
        };
        let Some(source_key) = session.replicas().source_key_from_fmid(eid) else {
            log::warn!("message {eid} belongs to an unknown replica, skipped");
            continue;
        };
        data.eid_set.push(source_key.replica_guid, eid.globcnt());

        let modification_time = match value_at(row, index.last_modification_time) {
            Some(PropertyValue::SysTime(time)) => *time,
            _ => FileTime::from_unix_seconds(VERSION_TIME_SECS),
        };

        let Some(PropertyValue::I8(cn_raw)) = value_at(row, index.change_number) else {
            log::error!("mandatory change number missing on message {eid}, skipped");
            continue;
        };
        let cn_glob = GlobCnt::new(cn_raw >> 16);
        if original_cnset.includes(&data.replica_guid, cn_glob) {
            log::debug!("message change {cn_raw:#x} already seen by the client");
            continue;
        }
        new_seen.push(data.replica_guid, cn_glob);

        let Some(PropertyValue::Binary(change_key)) = value_at(row, index.change_key) else {
            log::error!("mandatory change key missing on message {eid}, skipped");
            continue;
        };
        let predecessors = match value_at(row, index.predecessor_change_list) {
            Some(PropertyValue::Binary(list)) => list.clone(),
            _ => {
                log::warn!(
                    "predecessor change list missing on message {eid}; synthesizing a one-entry list from its change key"
                );
                PredecessorChangeList::from_change_key(change_key).into_bytes()
            }
        };
        let associated = match index.associated.and_then(|i| value_at(row, i)) {
            Some(PropertyValue::Bool(value)) => *value,
            _ => false,
        };

        let mut header: Vec<(PropertyTag, PropertyValue)> = vec![
            (
                pidtag::SOURCE_KEY,
                PropertyValue::Binary(source_key.to_bytes().to_vec()),
            ),
            (
                pidtag::LAST_MODIFICATION_TIME,
                PropertyValue::SysTime(modification_time),
            ),
            (pidtag::CHANGE_KEY, PropertyValue::Binary(change_key.clone())),
            (
                pidtag::PREDECESSOR_CHANGE_LIST,
                PropertyValue::Binary(predecessors),
            ),
            (pidtag::ASSOCIATED, PropertyValue::Bool(associated)),
        ];
        if ctx.options.request_eid {
            header.push((pidtag::MID, PropertyValue::I8(eid.0)));
        }
        if ctx.options.request_message_size {
            let size = match index.message_size.and_then(|i| value_at(row, i)) {
                Some(PropertyValue::Long(size)) => *size,
                _ => 0,
            };
            header.push((pidtag::MESSAGE_SIZE, PropertyValue::Long(size)));
        }
        if ctx.options.request_cn {
            header.push((pidtag::CHANGE_NUMBER, PropertyValue::I8(*cn_raw)));
        }

        data.writer.write_marker(metatag::INCR_SYNC_CHG)?;
        for (tag, value) in &header {
            write_prop(&mut data.writer, registry, *tag, value)?;
        }
        data.writer.write_marker(metatag::INCR_SYNC_MESSAGE)?;
        for (i, tag) in columns.iter().enumerate().skip(ctx.mandatory_count) {
            if let Some(value) = value_at(row, i) {
                write_prop(&mut data.writer, registry, *tag, value)?;
            }
        }

        push_recipients(&mut data.writer, registry, &message)?;
        push_attachments(&mut data.writer, registry, store, ctx.folder, eid)?;
    }

    // Tombstones: everything deleted since the client's watermark.
    if store.supports_tombstones() {
        let since = watermark_cn(original_cnset, &data.replica_guid);
        let (deleted, covered) = store.deleted_fmids(ctx.folder, kind, since)?;
        for fmid in &deleted {
            data.deleted_eid_set
                .push(data.replica_guid, fmid.globcnt());
        }
        if !deleted.is_empty() {
            new_seen.push(data.replica_guid, covered.globcnt());
        }
    }

    Ok(new_seen)
}

/// messageChildren: the recipient sub-block.
fn push_recipients(
    writer: &mut PropertyWriter,
    resolver: &dyn NamedPropResolver,
    message: &MessageData,
) -> Result<()> {
    writer.write_meta_long(metatag::FX_DEL_PROP, pidtag::MESSAGE_RECIPIENTS.0)?;

    let position_of = |candidates: &[PropertyTag]| {
        candidates
            .iter()
            .find_map(|tag| message.recipient_columns.iter().position(|c| c == tag))
    };
    let display_name_idx = position_of(&[
        pidtag::DISPLAY_NAME,
        pidtag::SEVEN_BIT_DISPLAY_NAME,
        pidtag::RECIPIENT_DISPLAY_NAME,
    ]);
    let email_idx = position_of(&[pidtag::EMAIL_ADDRESS, pidtag::SMTP_ADDRESS]);

    for (i, recipient) in message.recipients.iter().enumerate() {
        writer.write_marker(metatag::START_RECIP)?;
        write_prop(writer, resolver, pidtag::ROW_ID, &PropertyValue::Long(i as u32))?;

        let mut emitted = vec![false; message.recipient_columns.len()];
        if let Some(idx) = email_idx {
            if let Some(email) = recipient.values.get(idx).and_then(|v| v.as_ref()) {
                write_prop(
                    writer,
                    resolver,
                    pidtag::ADDRESS_TYPE,
                    &PropertyValue::Unicode("SMTP".into()),
                )?;
                write_prop(writer, resolver, pidtag::EMAIL_ADDRESS, email)?;
                emitted[idx] = true;
            }
        }
        if let Some(idx) = display_name_idx {
            if let Some(name) = recipient.values.get(idx).and_then(|v| v.as_ref()) {
                write_prop(writer, resolver, pidtag::DISPLAY_NAME, name)?;
                emitted[idx] = true;
            }
        }
        write_prop(
            writer,
            resolver,
            pidtag::RECIPIENT_TYPE,
            &PropertyValue::Long(recipient.recipient_type),
        )?;

        for (idx, column) in message.recipient_columns.iter().enumerate() {
            if emitted[idx] || *column == pidtag::RECIPIENT_TYPE {
                continue;
            }
            if let Some(value) = recipient.values.get(idx).and_then(|v| v.as_ref()) {
                write_prop(writer, resolver, *column, value)?;
            }
        }
        writer.write_marker(metatag::END_TO_RECIP)?;
    }
    Ok(())
}

/// messageChildren: the attachment sub-block.
fn push_attachments(
    writer: &mut PropertyWriter,
    resolver: &dyn NamedPropResolver,
    store: &dyn StoreBackend,
    folder: Fmid,
    mid: Fmid,
) -> Result<()> {
    writer.write_meta_long(metatag::FX_DEL_PROP, pidtag::MESSAGE_ATTACHMENTS.0)?;

    let rows = store.attachment_rows(folder, mid, ATTACHMENT_PROPERTIES)?;
    for (i, row) in rows.iter().enumerate() {
        writer.write_marker(metatag::NEW_ATTACH)?;
        write_prop(
            writer,
            resolver,
            pidtag::ATTACH_NUM,
            &PropertyValue::Long(i as u32),
        )?;
        for (tag, value) in ATTACHMENT_PROPERTIES.iter().zip(row.values.iter()) {
            if let Some(value) = value {
                write_prop(writer, resolver, *tag, value)?;
            }
        }
        writer.write_marker(metatag::END_ATTACH)?;
    }
    Ok(())
}

/// One folder's table scan in the hierarchy walk.
struct HierarchyFrame {
    folder: Fmid,
    rows: Vec<PropertyRow>,
    next: usize,
}

fn hierarchy_stream(session: &Session, ctx: &mut SyncContext) -> Result<FtContext> {
    let store = session.store();
    let registry = session.registry();
    let index = PropIndex::locate(&ctx.properties, false)?;
    let mut data = SyncData::new(session.replicas().local_guid());
    let mut new_seen = RawIdSet::new(true);

    let restriction = cn_restriction(&ctx.cnset_seen, &data.replica_guid);
    let topmost = ctx.folder;

    // Depth-first over the subtree with an explicit frame stack, so a
    // pathological hierarchy cannot exhaust the call stack.
    let mut stack = vec![HierarchyFrame {
        folder: topmost,
        rows: store.table_rows(topmost, TableKind::Folder, &ctx.properties, restriction.as_ref())?,
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.rows.len() {
            stack.pop();
            continue;
        }
        let row = frame.rows[frame.next].clone();
        frame.next += 1;
        let parent_is_topmost = frame.folder == topmost;

        let Some(child) = push_folder_row(
            session,
            ctx,
            &mut data,
            &mut new_seen,
            &index,
            &row,
            parent_is_topmost,
        )?
        else {
            continue;
        };
        match store.table_rows(child, TableKind::Folder, &ctx.properties, restriction.as_ref()) {
            Ok(rows) => stack.push(HierarchyFrame {
                folder: child,
                rows,
                next: 0,
            }),
            Err(err) => {
                log::debug!("folder {child} does not expose a hierarchy table: {err}");
            }
        }
    }

    data.writer.write_marker(metatag::INCR_SYNC_STATE_BEGIN)?;
    ctx.cnset_seen = ctx.cnset_seen.merge(&new_seen.to_idset());
    data.writer
        .write_idset_property(metatag::CNSET_SEEN, &ctx.cnset_seen)?;
    ctx.idset_given = ctx.idset_given.merge(&data.eid_set.to_idset());
    data.writer
        .write_idset_property(metatag::IDSET_GIVEN, &ctx.idset_given)?;
    data.writer.write_marker(metatag::INCR_SYNC_STATE_END)?;
    data.writer.write_marker(metatag::INCR_SYNC_END)?;

    let (buffer, cutmarks) = data.writer.finish();
    Ok(FtContext::new(buffer, cutmarks))
}

/// Emits one folderChange record, returning the row's folder id so the
/// walk can descend into it. Emission may be skipped for already-seen
/// changes; descent still happens.
fn push_folder_row(
    session: &Session,
    ctx: &SyncContext,
    data: &mut SyncData,
    new_seen: &mut RawIdSet,
    index: &PropIndex,
    row: &PropertyRow,
    parent_is_topmost: bool,
) -> Result<Option<Fmid>> {
    let registry = session.registry();

    let Some(PropertyValue::I8(eid_raw)) = value_at(row, index.eid) else {
        log::warn!("folder row without an id, skipped");
        return Ok(None);
    };
    let eid = Fmid(*eid_raw);
    if eid == Fmid::INVALID {
        log::error!("folder row without a valid id, skipped");
        return Ok(None);
    }
    let Some(source_key) = session.replicas().source_key_from_fmid(eid) else {
        log::warn!("folder {eid} belongs to an unknown replica, skipped");
        return Ok(None);
    };
    data.eid_set.push(source_key.replica_guid, eid.globcnt());

    let Some(PropertyValue::I8(cn_raw)) = value_at(row, index.change_number) else {
        log::error!("mandatory change number missing on folder {eid}, skipped");
        return Ok(Some(eid));
    };
    let cn_glob = GlobCnt::new(cn_raw >> 16);
    if ctx.cnset_seen.includes(&data.replica_guid, cn_glob) {
        log::debug!("folder change {cn_raw:#x} already seen by the client");
        return Ok(Some(eid));
    }
    new_seen.push(data.replica_guid, cn_glob);

    // The parent source key is empty at the top of the walk.
    let parent_source_key = if parent_is_topmost {
        Vec::new()
    } else {
        match index
            .parent_fid
            .and_then(|i| value_at(row, i))
            .and_then(|value| match value {
                PropertyValue::I8(parent) => {
                    session.replicas().source_key_from_fmid(Fmid(*parent))
                }
                _ => None,
            }) {
            Some(key) => key.to_bytes().to_vec(),
            None => {
                log::warn!("folder {eid} has no resolvable parent, emitting an empty parent key");
                Vec::new()
            }
        }
    };

    let modification_time = match value_at(row, index.last_modification_time) {
        Some(PropertyValue::SysTime(time)) => *time,
        _ => FileTime::from_unix_seconds(VERSION_TIME_SECS),
    };
    let change_key = gid_bytes(&data.replica_guid, cn_glob.value());
    let predecessors = PredecessorChangeList::from_change_key(&change_key).into_bytes();
    let display_name = match index.display_name.and_then(|i| value_at(row, i)) {
        Some(PropertyValue::Unicode(name)) => name.clone(),
        _ => String::new(),
    };

    let mut header: Vec<(PropertyTag, PropertyValue)> = vec![
        (
            pidtag::PARENT_SOURCE_KEY,
            PropertyValue::Binary(parent_source_key),
        ),
        (
            pidtag::SOURCE_KEY,
            PropertyValue::Binary(source_key.to_bytes().to_vec()),
        ),
        (
            pidtag::LAST_MODIFICATION_TIME,
            PropertyValue::SysTime(modification_time),
        ),
        (pidtag::CHANGE_KEY, PropertyValue::Binary(change_key)),
        (
            pidtag::PREDECESSOR_CHANGE_LIST,
            PropertyValue::Binary(predecessors),
        ),
        (pidtag::DISPLAY_NAME, PropertyValue::Unicode(display_name)),
    ];
    if ctx.options.request_eid {
        header.push((pidtag::FID, PropertyValue::I8(eid.0)));
    }
    if ctx.options.no_foreign_identifiers {
        let parent = match index.parent_fid.and_then(|i| value_at(row, i)) {
            Some(PropertyValue::I8(parent)) => *parent,
            _ => 0,
        };
        header.push((pidtag::PARENT_FID, PropertyValue::I8(parent)));
    }

    data.writer.write_marker(metatag::INCR_SYNC_CHG)?;
    for (tag, value) in &header {
        write_prop(&mut data.writer, registry, *tag, value)?;
    }
    for (i, tag) in ctx
        .properties
        .iter()
        .enumerate()
        .skip(ctx.mandatory_count)
    {
        if let Some(value) = value_at(row, i) {
            write_prop(&mut data.writer, registry, *tag, value)?;
        }
    }

    Ok(Some(eid))
}

/// Builds the checkpoint-only stream for SyncGetTransferState: the
/// state section reflecting the union of the client's prior state with
/// everything that currently exists.
pub(crate) fn transfer_state_stream(
    session: &Session,
    ctx: &mut SyncContext,
) -> Result<FtContext> {
    let mut writer = PropertyWriter::new();
    writer.write_marker(metatag::INCR_SYNC_STATE_BEGIN)?;

    let mut eid_set = RawIdSet::new(false);
    let mut cn_seen = RawIdSet::new(true);

    if ctx.contents_mode {
        if ctx.options.normal {
            fill_transfer_state(session, ctx.folder, TableKind::Message, &mut eid_set, &mut cn_seen)?;
        }
        if ctx.options.fai {
            fill_transfer_state(session, ctx.folder, TableKind::Fai, &mut eid_set, &mut cn_seen)?;
        }
    } else {
        fill_transfer_state(session, ctx.folder, TableKind::Folder, &mut eid_set, &mut cn_seen)?;
    }

    ctx.cnset_seen = ctx.cnset_seen.merge(&cn_seen.to_idset());
    writer.write_idset_property(metatag::CNSET_SEEN, &ctx.cnset_seen)?;
    // The FAI and read checkpoints are backed by the same merged set;
    // clients round-trip it unchanged.
    if ctx.contents_mode && ctx.options.fai {
        writer.write_idset_property(metatag::CNSET_SEEN_FAI, &ctx.cnset_seen)?;
    }

    ctx.idset_given = ctx.idset_given.merge(&eid_set.to_idset());
    writer.write_idset_property(metatag::IDSET_GIVEN, &ctx.idset_given)?;

    if ctx.contents_mode && ctx.options.read_state {
        writer.write_idset_property(metatag::CNSET_READ, &ctx.cnset_seen)?;
    }
    writer.write_marker(metatag::INCR_SYNC_STATE_END)?;

    let (buffer, _) = writer.finish();
    // The whole state section is one logical unit: only the
    // terminator appears in the cutmark index.
    Ok(FtContext::new(buffer, vec![u32::MAX]))
}

/// Collects existing ids and change numbers of one table (recursing
/// over subfolders for hierarchy contexts).
fn fill_transfer_state(
    session: &Session,
    folder: Fmid,
    kind: TableKind,
    eid_set: &mut RawIdSet,
    cn_seen: &mut RawIdSet,
) -> Result<()> {
    let store = session.store();
    let local_guid = session.replicas().local_guid();
    let (count_tag, eid_tag) = match kind {
        TableKind::Folder => (pidtag::FOLDER_CHILD_COUNT, pidtag::FID),
        TableKind::Message => (pidtag::CONTENT_COUNT, pidtag::MID),
        TableKind::Fai => (pidtag::ASSOC_CONTENT_COUNT, pidtag::MID),
        TableKind::Attachment => return Err(Error::InvalidParameter("attachment table")),
    };
    let columns = [eid_tag, pidtag::CHANGE_NUMBER];

    let mut pending = vec![folder];
    while let Some(current) = pending.pop() {
        // Row-count pre-check saves opening tables of empty folders.
        let count = store
            .object_properties(&ObjectRef::Folder(current), &[count_tag])?
            .values
            .first()
            .cloned()
            .flatten();
        if matches!(count, Some(PropertyValue::Long(0))) {
            continue;
        }

        for row in store.table_rows(current, kind, &columns, None)? {
            let Some(PropertyValue::I8(eid_raw)) = value_at(&row, 0) else {
                continue;
            };
            let eid = Fmid(*eid_raw);
            let Some(row_guid) = session.replicas().guid_of(eid.replid()) else {
                log::warn!("row {eid} belongs to an unknown replica, skipped");
                continue;
            };
            eid_set.push(row_guid, eid.globcnt());

            let Some(PropertyValue::I8(cn_raw)) = value_at(&row, 1) else {
                log::error!("mandatory change number missing on {eid}, skipped");
                continue;
            };
            cn_seen.push(local_guid, GlobCnt::new(cn_raw >> 16));

            if kind == TableKind::Folder {
                pending.push(eid);
            }
        }
    }
    Ok(())
}

/// Dumps one object's properties for FastTransferSourceCopyTo.
pub(crate) fn copy_to_stream(
    session: &Session,
    object: &ObjectRef,
    excluded: &[PropertyTag],
) -> Result<FtContext> {
    let store = session.store();
    let registry = session.registry();

    let mut columns = store.object_available_properties(object)?;
    columns.retain(|tag| !excluded.contains(tag));
    let row = store.object_properties(object, &columns)?;

    let mut writer = PropertyWriter::new();
    for (tag, value) in columns.iter().zip(row.values.iter()) {
        if let Some(value) = value {
            write_prop(&mut writer, registry, *tag, value)?;
        }
    }
    let (buffer, cutmarks) = writer.finish();
    Ok(FtContext::new(buffer, cutmarks))
}
