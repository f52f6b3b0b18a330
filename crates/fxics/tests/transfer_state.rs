//! SyncGetTransferState and FastTransferSourceCopyTo flows.

mod common;

use common::{FOLDER, decode_stream, fixture, local_fmid, replica_guid};
use fxics_dtyp::{Fmid, GlobCnt, IdSetReplica};
use fxics_msg::fxtransfer::{
    FastTransferSourceCopyToRequest, SendOptions, TransferStatus,
};
use fxics_msg::sync::{SyncFlags, SyncGetTransferStateRequest, SyncType};
use fxics_msg::MapiStatus;
use fxics_props::pidtag::{self, metatag};
use fxics_props::{PropertyValue, StreamItem};

/// The transfer state reflects everything that currently exists, with
/// no change records, and mirrors the seen set into the FAI and read
/// checkpoints.
#[test]
fn transfer_state_reflects_existing_rows() {
    let mut fx = fixture();
    fx.store
        .add_message(FOLDER, local_fmid(1), Fmid(0x0002_0001), &[])
        .unwrap();
    fx.store
        .add_message(FOLDER, local_fmid(3), Fmid(0x0004_0001), &[])
        .unwrap();

    let ctx = fx.configure(
        SyncType::Contents,
        SyncFlags::new()
            .with_unicode(true)
            .with_normal(true)
            .with_fai(true)
            .with_read_state(true),
        vec![],
    );
    fx.exec_ok(
        ctx,
        SyncGetTransferStateRequest {
            output_handle_idx: 2,
            send_options: SendOptions::new(),
        },
    );

    let response = fx.get_buffer(2, 8192);
    assert_eq!(response.transfer_status, TransferStatus::Done);
    let items = decode_stream(&response.transfer_buffer);

    assert!(
        !items
            .iter()
            .any(|item| *item == StreamItem::Marker(metatag::INCR_SYNC_CHG)),
        "transfer state carries no change records"
    );
    assert_eq!(items[0], StreamItem::Marker(metatag::INCR_SYNC_STATE_BEGIN));
    assert_eq!(
        items.last(),
        Some(&StreamItem::Marker(metatag::INCR_SYNC_STATE_END))
    );

    let set_of = |wanted| {
        items.iter().find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == wanted => Some(set.clone()),
            _ => None,
        })
    };
    let seen = set_of(metatag::CNSET_SEEN).expect("seen set");
    let local = IdSetReplica::Guid(replica_guid());
    let ranges = seen.ranges_for(&local).expect("local ranges");
    assert_eq!((ranges[0].low, ranges[0].high), (2, 4));

    // The FAI and read checkpoints mirror the seen set.
    assert_eq!(set_of(metatag::CNSET_SEEN_FAI), Some(seen.clone()));
    assert_eq!(set_of(metatag::CNSET_READ), Some(seen));

    let given = set_of(metatag::IDSET_GIVEN).expect("given set");
    assert!(given.includes(&replica_guid(), GlobCnt::new(1)));
    assert!(given.includes(&replica_guid(), GlobCnt::new(3)));
    assert!(!given.includes(&replica_guid(), GlobCnt::new(2)));
}

/// Hierarchy transfer state walks the whole subtree.
#[test]
fn hierarchy_transfer_state_covers_subtree() {
    let mut fx = fixture();
    let child = local_fmid(0x200);
    fx.store
        .add_folder(Some(FOLDER), child, "Sub", Fmid(0x0021_0001))
        .unwrap();
    let grandchild = local_fmid(0x300);
    fx.store
        .add_folder(Some(child), grandchild, "Deep", Fmid(0x0031_0001))
        .unwrap();

    let ctx = fx.configure(
        SyncType::Hierarchy,
        SyncFlags::new().with_unicode(true),
        vec![],
    );
    fx.exec_ok(
        ctx,
        SyncGetTransferStateRequest {
            output_handle_idx: 2,
            send_options: SendOptions::new(),
        },
    );
    let response = fx.get_buffer(2, 8192);
    let items = decode_stream(&response.transfer_buffer);

    let given = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::IDSET_GIVEN => Some(set),
            _ => None,
        })
        .expect("given set");
    assert!(given.includes(&replica_guid(), GlobCnt::new(0x200)));
    assert!(given.includes(&replica_guid(), GlobCnt::new(0x300)));
}

/// CopyTo dumps an object's properties minus the exclusion list into
/// a fresh download context.
#[test]
fn copy_to_dumps_object_properties() {
    let mut fx = fixture();

    fx.exec_ok(
        0,
        FastTransferSourceCopyToRequest {
            output_handle_idx: 1,
            level: 0,
            copy_flags: 0,
            send_options: SendOptions::new(),
            excluded_tags: vec![pidtag::CHANGE_KEY, pidtag::PREDECESSOR_CHANGE_LIST],
        },
    );
    let response = fx.get_buffer(1, 8192);
    assert_eq!(response.transfer_status, TransferStatus::Done);
    let items = decode_stream(&response.transfer_buffer);

    assert!(items.iter().any(|item| matches!(
        item,
        StreamItem::Property { tag, value: PropertyValue::Unicode(name), .. }
            if *tag == pidtag::DISPLAY_NAME && name == "Inbox"
    )));
    assert!(!items.iter().any(|item| matches!(
        item,
        StreamItem::Property { tag, .. } if *tag == pidtag::CHANGE_KEY
    )));
}

/// Copy levels beyond the object itself are not served.
#[test]
fn copy_to_rejects_descendant_levels() {
    let mut fx = fixture();
    let reply = fx.exec(
        0,
        FastTransferSourceCopyToRequest {
            output_handle_idx: 1,
            level: 1,
            copy_flags: 0,
            send_options: SendOptions::new(),
            excluded_tags: vec![],
        },
    );
    assert_eq!(reply.error_code, MapiStatus::U32_INVALID_OBJECT);
}

/// GetTransferState requires a synccontext handle.
#[test]
fn transfer_state_requires_synccontext() {
    let mut fx = fixture();
    let reply = fx.exec(
        0,
        SyncGetTransferStateRequest {
            output_handle_idx: 2,
            send_options: SendOptions::new(),
        },
    );
    assert_eq!(reply.error_code, MapiStatus::U32_INVALID_OBJECT);
}
