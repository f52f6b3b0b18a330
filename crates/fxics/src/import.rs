//! Import (upload) operations: applying client-side changes to the
//! store.

use std::io::Cursor;

use binrw::BinRead;

use fxics_dtyp::{Fmid, Guid};
use fxics_msg::import::{
    GetLocalReplicaIdsRequest, GetLocalReplicaIdsResponse, SyncImportDeletesRequest,
    SyncImportHierarchyChangeRequest, SyncImportMessageChangeRequest,
    SyncImportMessageMoveRequest, SyncImportReadStateChangesRequest,
};
use fxics_msg::MessageReadState;
use fxics_props::{pidtag, PropertyTag, PropertyValue};

use crate::session::Session;
use crate::store::{DeleteMode, ReadFlags};
use crate::{Error, Result};

fn owned_values(
    values: &[fxics_msg::TaggedPropertyValue],
) -> Vec<(PropertyTag, PropertyValue)> {
    values
        .iter()
        .map(|tv| (tv.tag, tv.value.clone()))
        .collect()
}

fn source_key_value(values: &[fxics_msg::TaggedPropertyValue], index: usize) -> Result<&[u8]> {
    match values.get(index).map(|tv| &tv.value) {
        Some(PropertyValue::Binary(data)) => Ok(data),
        _ => Err(Error::InvalidParameter("missing source key value")),
    }
}

/// Opens or creates the message named by the request's source key and
/// applies every supplied property. Returns the message id for the
/// handle the caller binds.
pub(crate) fn message_change(
    session: &Session,
    folder: Fmid,
    request: &SyncImportMessageChangeRequest,
) -> Result<Fmid> {
    let source_key = source_key_value(&request.property_values, 0)?;
    let mid = session
        .replicas()
        .fmid_from_source_key(source_key)
        .ok_or(Error::NotFound)?;

    match session.store().open_message(folder, mid) {
        Ok(_) => {}
        Err(Error::NotFound) => {
            session
                .store()
                .create_message(folder, mid, request.import_flags.associated())?;
            log::debug!("created message {mid} for import");
        }
        Err(Error::NoAccess) => return Err(Error::NoAccess),
        Err(_) => return Err(Error::InvalidObject),
    }

    session
        .store()
        .set_message_properties(folder, mid, &owned_values(&request.property_values))?;
    Ok(mid)
}

/// Opens or creates the folder named by `hierarchy_values[1]` under
/// the parent at index 0, then applies the merged property rows.
pub(crate) fn hierarchy_change(
    session: &Session,
    context_folder: Fmid,
    request: &SyncImportHierarchyChangeRequest,
) -> Result<()> {
    let parent_key = source_key_value(&request.hierarchy_values, 0)?;
    let parent_fid = session
        .replicas()
        .fmid_from_source_key(parent_key)
        .ok_or(Error::NotFound)?;
    let folder_key = source_key_value(&request.hierarchy_values, 1)?;
    let fid = session
        .replicas()
        .fmid_from_source_key(folder_key)
        .ok_or(Error::NotFound)?;

    let mut properties = owned_values(&request.hierarchy_values);
    properties.extend(owned_values(&request.property_values));

    if session.store().open_folder(fid).is_ok() {
        session.store().set_folder_properties(fid, &properties)?;
        return Ok(());
    }

    if parent_fid != context_folder {
        session.store().open_folder(parent_fid)?;
    }
    let cn = session
        .store()
        .next_change_number()
        .map_err(|err| {
            log::warn!("unable to obtain a change number: {err}");
            Error::NoSupport
        })?;
    properties.push((pidtag::CHANGE_NUMBER, PropertyValue::I8(cn.0)));
    session.store().create_folder(parent_fid, fid, &properties)?;
    session.store().set_folder_properties(fid, &properties)?;
    Ok(())
}

/// Applies a batch of deletions. Per-item failures are logged and
/// skipped; the batch itself never fails half-way into a reply error.
pub(crate) fn import_deletes(
    session: &Session,
    folder: Fmid,
    request: &SyncImportDeletesRequest,
) -> Result<()> {
    let blobs = match request.property_values.first().map(|tv| &tv.value) {
        Some(PropertyValue::MvBinary(blobs)) => blobs,
        _ => return Err(Error::InvalidParameter("missing source key array")),
    };
    let mode = if request.flags.hard_delete() {
        DeleteMode::Hard
    } else {
        DeleteMode::Soft
    };

    if request.flags.hierarchy() {
        for blob in blobs {
            let Some(fid) = session.replicas().fmid_from_source_key(blob) else {
                log::debug!("folder delete skipped an unresolvable source key");
                continue;
            };
            if let Err(err) = session.store().delete_folder(fid) {
                log::debug!("folder deletion failed for {fid}: {err}");
            }
        }
    } else {
        for blob in blobs {
            let Some(mid) = session.replicas().fmid_from_source_key(blob) else {
                log::debug!("message delete skipped an unresolvable source key");
                continue;
            };
            if let Err(err) = session.store().delete_message(folder, mid, mode) {
                log::debug!("message deletion failed for {mid}: {err}");
                continue;
            }
            if let Err(err) = session.store().indexing_remove_mid(mid, mode) {
                log::debug!("index record removal failed for {mid}: {err}");
            }
        }
    }
    Ok(())
}

/// Decodes one replica-GUID-prefixed id blob against the local
/// replica. Foreign ids are not accepted here.
fn convert_id_to_fmid(local: &Guid, blob: &[u8]) -> Option<Fmid> {
    if blob.len() < 17 || blob.len() > 24 {
        return None;
    }
    let mut guid = [0u8; 16];
    guid.copy_from_slice(&blob[..16]);
    if Guid::from_bytes(guid) != *local {
        return None;
    }
    let mut value = 0u64;
    for (i, &byte) in blob[16..].iter().enumerate() {
        value |= u64::from(byte) << (8 * i);
    }
    Some(Fmid((value << 16) | 0x0001))
}

/// Moves a message between folders on behalf of the client, recording
/// the supplied change key.
pub(crate) fn message_move(
    session: &Session,
    context_folder: Fmid,
    request: &SyncImportMessageMoveRequest,
) -> Result<()> {
    if !session.store().supports_moves() {
        return Err(Error::NoSupport);
    }
    let local = session.replicas().local_guid();
    let source_fid =
        convert_id_to_fmid(&local, &request.source_folder_id).ok_or(Error::NotFound)?;
    let source_mid =
        convert_id_to_fmid(&local, &request.source_message_id).ok_or(Error::NotFound)?;
    let destination_mid =
        convert_id_to_fmid(&local, &request.destination_message_id).ok_or(Error::NotFound)?;

    session
        .store()
        .open_folder(source_fid)
        .map_err(|_| Error::NotFound)?;
    session.store().move_message(
        source_fid,
        context_folder,
        source_mid,
        destination_mid,
        &request.change_number,
    )
}

/// Applies a packed stream of read-state toggles. Unresolvable entries
/// are skipped.
pub(crate) fn read_state_changes(
    session: &Session,
    folder: Fmid,
    request: &SyncImportReadStateChangesRequest,
) -> Result<()> {
    let data = &request.message_read_states;
    let mut cursor = Cursor::new(data.as_slice());
    while (cursor.position() as usize) < data.len() {
        let entry = MessageReadState::read_le(&mut cursor)
            .map_err(|_| Error::InvalidParameter("read state stream"))?;
        if entry.message_id.len() < 17 {
            log::debug!("read state entry with a short message id, skipped");
            continue;
        }
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&entry.message_id[..16]);
        let Some(replid) = session.replicas().replid_of(&Guid::from_bytes(guid)) else {
            log::debug!("read state entry for an unknown replica, skipped");
            continue;
        };
        let mut value = 0u64;
        for (i, &byte) in entry.message_id[16..].iter().enumerate() {
            value |= u64::from(byte) << (8 * i);
        }
        let mid = Fmid((value << 16) | u64::from(replid.0));

        let flags = if entry.mark_as_read {
            ReadFlags::mark_read()
        } else {
            ReadFlags::mark_unread()
        };
        match session.store().open_message(folder, mid) {
            Ok(_) => {
                if let Err(err) = session.store().set_read_flag(folder, mid, flags) {
                    log::debug!("read flag update failed for {mid}: {err}");
                }
            }
            Err(err) => {
                log::debug!("read state entry for unopenable message {mid}, skipped: {err}");
            }
        }
    }
    Ok(())
}

/// Reserves `id_count` consecutive local-replica ids.
pub(crate) fn local_replica_ids(
    session: &Session,
    request: &GetLocalReplicaIdsRequest,
) -> Result<GetLocalReplicaIdsResponse> {
    let first = session
        .store()
        .reserve_id_range(u64::from(request.id_count))?;
    Ok(GetLocalReplicaIdsResponse {
        replica_guid: session.replicas().local_guid(),
        global_count: first.to_le_bytes(),
    })
}
