//! Incremental download flows: empty sync, first delta, no-op replay,
//! deletions, FAI, hierarchy, and chunking.

mod common;

use common::{FOLDER, decode_stream, fixture, local_fmid, replica_guid};
use fxics::StoreBackend;
use fxics_dtyp::{Fmid, GlobCnt, IdSetReplica};
use fxics_msg::fxtransfer::TransferStatus;
use fxics_msg::sync::{SyncFlags, SyncType};
use fxics_props::pidtag::{self, metatag};
use fxics_props::{PropertyValue, StreamItem};

fn normal_flags() -> SyncFlags {
    SyncFlags::new().with_unicode(true).with_normal(true)
}

/// Empty folder, empty client state: the stream is just the state
/// section, delivered in one step.
#[test]
fn empty_sync_yields_state_only() {
    let mut fx = fixture();
    let ctx = fx.configure_contents(normal_flags());
    for tag in [
        metatag::CNSET_SEEN,
        metatag::CNSET_SEEN_FAI,
        metatag::CNSET_READ,
    ] {
        fx.upload_state(ctx, tag, &[]);
    }

    let response = fx.get_buffer(ctx, 8192);
    assert_eq!(response.transfer_status, TransferStatus::Done);
    assert_eq!(response.total_step_count, 1);

    let items = decode_stream(&response.transfer_buffer);
    assert_eq!(items.len(), 5);
    assert_eq!(items[0], StreamItem::Marker(metatag::INCR_SYNC_STATE_BEGIN));
    let StreamItem::IdSetProperty { tag, set } = &items[1] else {
        panic!("expected the seen set, got {:?}", items[1]);
    };
    assert_eq!(*tag, metatag::CNSET_SEEN);
    assert!(set.is_empty());
    let StreamItem::IdSetProperty { tag, set } = &items[2] else {
        panic!("expected the given set, got {:?}", items[2]);
    };
    assert_eq!(*tag, metatag::IDSET_GIVEN);
    assert!(set.is_empty());
    assert_eq!(items[3], StreamItem::Marker(metatag::INCR_SYNC_STATE_END));
    assert_eq!(items[4], StreamItem::Marker(metatag::INCR_SYNC_END));
}

/// One message, empty client state: a single change block followed by
/// the advanced state.
#[test]
fn single_message_delta() {
    let mut fx = fixture();
    let mid = local_fmid(1);
    fx.store
        .add_message(
            FOLDER,
            mid,
            Fmid(0x0002_0001),
            &[(pidtag::DISPLAY_NAME, PropertyValue::Unicode("hello".into()))],
        )
        .unwrap();

    let ctx = fx.configure_contents(normal_flags());
    for tag in [
        metatag::CNSET_SEEN,
        metatag::CNSET_SEEN_FAI,
        metatag::CNSET_READ,
    ] {
        fx.upload_state(ctx, tag, &[]);
    }

    let stream = fx.read_stream(ctx, 1024);
    let items = decode_stream(&stream);

    assert_eq!(items[0], StreamItem::Marker(metatag::INCR_SYNC_CHG));
    // The header block leads with the source key.
    let StreamItem::Property { tag, value, .. } = &items[1] else {
        panic!("expected the source key, got {:?}", items[1]);
    };
    assert_eq!(*tag, pidtag::SOURCE_KEY);
    let mut expected_key = replica_guid().to_bytes().to_vec();
    expected_key.extend_from_slice(&[1, 0, 0, 0, 0, 0]);
    assert_eq!(*value, PropertyValue::Binary(expected_key));

    // Header order: modification time, change key, predecessors,
    // associated flag.
    let header_tags: Vec<_> = items[2..6]
        .iter()
        .map(|item| match item {
            StreamItem::Property { tag, .. } => *tag,
            other => panic!("unexpected item in header: {other:?}"),
        })
        .collect();
    assert_eq!(
        header_tags,
        vec![
            pidtag::LAST_MODIFICATION_TIME,
            pidtag::CHANGE_KEY,
            pidtag::PREDECESSOR_CHANGE_LIST,
            pidtag::ASSOCIATED,
        ]
    );
    assert!(items.contains(&StreamItem::Marker(metatag::INCR_SYNC_MESSAGE)));

    // State: CnsetSeen = {[2,2]}, IdsetGiven = {[1,1]}.
    let local = IdSetReplica::Guid(replica_guid());
    let seen = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::CNSET_SEEN => Some(set),
            _ => None,
        })
        .expect("seen set present");
    let ranges = seen.ranges_for(&local).expect("local replica in seen set");
    assert_eq!((ranges[0].low, ranges[0].high), (2, 2));

    let given = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::IDSET_GIVEN => Some(set),
            _ => None,
        })
        .expect("given set present");
    let ranges = given.ranges_for(&local).expect("local replica in given set");
    assert_eq!((ranges[0].low, ranges[0].high), (1, 1));

    assert_eq!(
        items.last(),
        Some(&StreamItem::Marker(metatag::INCR_SYNC_END))
    );
}

/// Replaying the final state of a download returns no change blocks
/// and echoes the same state back.
#[test]
fn incremental_replay_is_a_no_op() {
    let mut fx = fixture();
    let mid = local_fmid(1);
    fx.store
        .add_message(FOLDER, mid, Fmid(0x0002_0001), &[])
        .unwrap();

    // First download, from an empty client state.
    let ctx = fx.configure_contents(normal_flags());
    let stream = fx.read_stream(ctx, 4096);
    let items = decode_stream(&stream);
    let final_state: Vec<_> = items
        .iter()
        .filter_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } => Some((*tag, set.clone())),
            _ => None,
        })
        .collect();

    // Second session of the same client: upload the final state.
    let ctx = fx.configure(SyncType::Contents, normal_flags(), vec![]);
    for (tag, set) in &final_state {
        fx.upload_state(ctx, *tag, &set.to_bytes());
    }

    let response = fx.get_buffer(ctx, 4096);
    assert_eq!(response.transfer_status, TransferStatus::Done);
    let replay = decode_stream(&response.transfer_buffer);
    assert!(
        !replay
            .iter()
            .any(|item| *item == StreamItem::Marker(metatag::INCR_SYNC_CHG)),
        "no change blocks expected on replay"
    );
    let echoed: Vec<_> = replay
        .iter()
        .filter_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } => Some((*tag, set.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(echoed, final_state);
}

/// Deleted messages appear under IncrSyncDel as an id-framed set and
/// leave the given set.
#[test]
fn deletions_are_reported_and_removed_from_given() {
    let mut fx = fixture();
    let keep = local_fmid(1);
    let doomed = local_fmid(2);
    fx.store
        .add_message(FOLDER, keep, Fmid(0x0003_0001), &[])
        .unwrap();
    fx.store
        .add_message(FOLDER, doomed, Fmid(0x0004_0001), &[])
        .unwrap();

    // First download hands both messages to the client.
    let ctx = fx.configure_contents(normal_flags());
    let stream = fx.read_stream(ctx, 4096);
    let state: Vec<_> = decode_stream(&stream)
        .into_iter()
        .filter_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } => Some((tag, set)),
            _ => None,
        })
        .collect();

    // The message disappears server-side.
    fx.store
        .delete_message(FOLDER, doomed, fxics::store::DeleteMode::Hard)
        .unwrap();

    let ctx = fx.configure(SyncType::Contents, normal_flags(), vec![]);
    for (tag, set) in &state {
        fx.upload_state(ctx, *tag, &set.to_bytes());
    }
    let stream = fx.read_stream(ctx, 4096);
    let items = decode_stream(&stream);

    let del_pos = items
        .iter()
        .position(|item| *item == StreamItem::Marker(metatag::INCR_SYNC_DEL))
        .expect("deletion marker present");
    let StreamItem::IdSetProperty { tag, set } = &items[del_pos + 1] else {
        panic!("expected the deleted set after the marker");
    };
    assert_eq!(*tag, metatag::IDSET_DELETED);
    let ranges = set
        .ranges_for(&IdSetReplica::Id(fxics_dtyp::ReplId::LOCAL))
        .expect("id-framed deleted set");
    assert_eq!((ranges[0].low, ranges[0].high), (2, 2));

    let given = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::IDSET_GIVEN => Some(set),
            _ => None,
        })
        .expect("given set present");
    assert!(given.includes(&replica_guid(), GlobCnt::new(1)));
    assert!(!given.includes(&replica_guid(), GlobCnt::new(2)));
}

/// FAI messages travel in their own pass with their own seen set.
#[test]
fn fai_stream_has_its_own_seen_set() {
    let mut fx = fixture();
    fx.store
        .add_message(FOLDER, local_fmid(1), Fmid(0x0002_0001), &[])
        .unwrap();
    fx.store
        .add_fai_message(FOLDER, local_fmid(3), Fmid(0x0005_0001), &[])
        .unwrap();

    let ctx = fx.configure_contents(normal_flags().with_fai(true));
    let stream = fx.read_stream(ctx, 4096);
    let items = decode_stream(&stream);

    let change_count = items
        .iter()
        .filter(|item| **item == StreamItem::Marker(metatag::INCR_SYNC_CHG))
        .count();
    assert_eq!(change_count, 2);

    let local = IdSetReplica::Guid(replica_guid());
    let seen_fai = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::CNSET_SEEN_FAI => {
                Some(set)
            }
            _ => None,
        })
        .expect("FAI seen set present");
    let ranges = seen_fai.ranges_for(&local).expect("local replica");
    assert_eq!((ranges[0].low, ranges[0].high), (5, 5));

    let seen = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::CNSET_SEEN => Some(set),
            _ => None,
        })
        .expect("seen set present");
    let ranges = seen.ranges_for(&local).expect("local replica");
    assert_eq!((ranges[0].low, ranges[0].high), (2, 2));
}

/// Recipients and attachments ride inside the message change block.
#[test]
fn message_children_are_emitted() {
    let mut fx = fixture();
    let mid = local_fmid(1);
    fx.store
        .add_message(FOLDER, mid, Fmid(0x0002_0001), &[])
        .unwrap();
    fx.store
        .add_recipient(
            FOLDER,
            mid,
            1,
            &[
                (
                    pidtag::EMAIL_ADDRESS,
                    PropertyValue::Unicode("bob@example.com".into()),
                ),
                (pidtag::DISPLAY_NAME, PropertyValue::Unicode("Bob".into())),
            ],
        )
        .unwrap();
    fx.store
        .add_attachment(
            FOLDER,
            mid,
            &[
                (pidtag::ATTACH_METHOD, PropertyValue::Long(1)),
                (pidtag::ATTACH_DATA_BIN, PropertyValue::Binary(vec![1, 2, 3])),
            ],
        )
        .unwrap();

    let ctx = fx.configure_contents(normal_flags());
    let stream = fx.read_stream(ctx, 4096);
    let items = decode_stream(&stream);

    let recip_start = items
        .iter()
        .position(|item| *item == StreamItem::Marker(metatag::START_RECIP))
        .expect("recipient block present");
    // RowId, then the SMTP address pair, display name, recipient type.
    let tags: Vec<_> = items[recip_start + 1..recip_start + 6]
        .iter()
        .map(|item| match item {
            StreamItem::Property { tag, .. } => *tag,
            other => panic!("unexpected recipient item {other:?}"),
        })
        .collect();
    assert_eq!(
        tags,
        vec![
            pidtag::ROW_ID,
            pidtag::ADDRESS_TYPE,
            pidtag::EMAIL_ADDRESS,
            pidtag::DISPLAY_NAME,
            pidtag::RECIPIENT_TYPE,
        ]
    );
    assert!(items.contains(&StreamItem::Marker(metatag::END_TO_RECIP)));

    let attach_start = items
        .iter()
        .position(|item| *item == StreamItem::Marker(metatag::NEW_ATTACH))
        .expect("attachment block present");
    let StreamItem::Property { tag, value, .. } = &items[attach_start + 1] else {
        panic!("expected the attachment number");
    };
    assert_eq!(*tag, pidtag::ATTACH_NUM);
    assert_eq!(*value, PropertyValue::Long(0));
    assert!(items.contains(&StreamItem::Marker(metatag::END_ATTACH)));
}

/// Hierarchy mode walks the subtree depth-first, emitting parents
/// before children with an empty parent key at the top level.
#[test]
fn hierarchy_download_emits_parents_first() {
    let mut fx = fixture();
    let child = local_fmid(0x200);
    let grandchild = local_fmid(0x300);
    fx.store
        .add_folder(Some(FOLDER), child, "Projects", Fmid(0x0021_0001))
        .unwrap();
    fx.store
        .add_folder(Some(child), grandchild, "Archive", Fmid(0x0031_0001))
        .unwrap();

    let ctx = fx.configure(
        SyncType::Hierarchy,
        SyncFlags::new().with_unicode(true),
        vec![],
    );
    let stream = fx.read_stream(ctx, 4096);
    let items = decode_stream(&stream);

    let names: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            StreamItem::Property {
                tag,
                value: PropertyValue::Unicode(name),
                ..
            } if *tag == pidtag::DISPLAY_NAME => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["Projects".to_string(), "Archive".to_string()]);

    let parent_keys: Vec<Vec<u8>> = items
        .iter()
        .filter_map(|item| match item {
            StreamItem::Property {
                tag,
                value: PropertyValue::Binary(key),
                ..
            } if *tag == pidtag::PARENT_SOURCE_KEY => Some(key.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(parent_keys.len(), 2);
    assert!(parent_keys[0].is_empty(), "top level has an empty parent key");
    let mut expected = replica_guid().to_bytes().to_vec();
    expected.extend_from_slice(&[0x00, 0x02, 0, 0, 0, 0]);
    assert_eq!(parent_keys[1], expected);

    let local = IdSetReplica::Guid(replica_guid());
    let given = items
        .iter()
        .find_map(|item| match item {
            StreamItem::IdSetProperty { tag, set } if *tag == metatag::IDSET_GIVEN => Some(set),
            _ => None,
        })
        .expect("given set present");
    assert!(given.includes(&replica_guid(), GlobCnt::new(0x200)));
    assert!(given.includes(&replica_guid(), GlobCnt::new(0x300)));
    let _ = local;
}

/// Small transport windows still deliver the whole stream, each chunk
/// ending on a record boundary.
#[test]
fn chunked_reads_reassemble_identically() {
    let mut fx = fixture();
    for glob in 1..6u64 {
        fx.store
            .add_message(
                FOLDER,
                local_fmid(glob),
                Fmid(((0x10 + glob) << 16) | 1),
                &[(
                    pidtag::DISPLAY_NAME,
                    PropertyValue::Unicode(format!("message {glob}")),
                )],
            )
            .unwrap();
    }

    let ctx = fx.configure_contents(normal_flags());
    let whole = fx.read_stream(ctx, u16::MAX);

    let ctx = fx.configure(SyncType::Contents, normal_flags(), vec![]);
    let chunked = fx.read_stream(ctx, 96);
    assert_eq!(whole, chunked);
    // Both decode to the same items.
    assert_eq!(decode_stream(&whole), decode_stream(&chunked));
}
