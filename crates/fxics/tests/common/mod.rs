//! Shared fixture: an in-memory mailbox served by one session.

#![allow(dead_code)]

use std::sync::Arc;

use fxics::namedprops::MemoryNamedProps;
use fxics::store::StoreBackend;
use fxics::{MemoryStore, NamedPropsRegistry, Session};
use fxics_dtyp::{Fmid, GlobCnt, Guid, ReplId};
use fxics_msg::fxtransfer::{
    FastTransferSourceGetBufferRequest, FastTransferSourceGetBufferResponse, SendOptions,
};
use fxics_msg::sync::{
    SyncConfigureRequest, SyncExtraFlags, SyncFlags, SyncType,
    SyncUploadStateStreamBeginRequest, SyncUploadStateStreamContinueRequest,
    SyncUploadStateStreamEndRequest,
};
use fxics_msg::{MapiStatus, RequestContent, RopReply, RopRequest};
use fxics_props::{PropertyReader, PropertyTag, StreamItem};

pub const FOLDER: Fmid = Fmid::new(ReplId::LOCAL, GlobCnt::new(0x100));

pub fn replica_guid() -> Guid {
    "6ba7b810-9dad-11d1-80b4-00c04fd430c8".parse().unwrap()
}

pub fn local_fmid(glob: u64) -> Fmid {
    Fmid::new(ReplId::LOCAL, GlobCnt::new(glob))
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub session: Session,
    /// The call handle array; slot 0 is the folder handle.
    pub handles: Vec<u32>,
}

pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new(replica_guid()));
    store
        .add_folder(None, FOLDER, "Inbox", Fmid(0x0111_0001))
        .unwrap();
    let registry = Arc::new(NamedPropsRegistry::new(Box::new(MemoryNamedProps::new())));
    let mut session = Session::new(
        "alice",
        replica_guid(),
        Arc::clone(&store) as Arc<dyn StoreBackend>,
        registry,
    );
    let folder_cookie = session.open_folder(FOLDER).unwrap();
    Fixture {
        store,
        session,
        handles: vec![folder_cookie],
    }
}

impl Fixture {
    pub fn exec(&mut self, handle_idx: u8, content: impl Into<RequestContent>) -> RopReply {
        let request = RopRequest::new(handle_idx, content);
        self.session.execute(&request, &mut self.handles)
    }

    pub fn exec_ok(&mut self, handle_idx: u8, content: impl Into<RequestContent>) -> RopReply {
        let reply = self.exec(handle_idx, content);
        assert_eq!(
            reply.error_code,
            MapiStatus::U32_SUCCESS,
            "{} failed: {}",
            reply.opnum,
            MapiStatus::try_display_as_status(reply.error_code),
        );
        reply
    }

    /// Configures a contents synccontext at handle slot 1 and returns
    /// its slot.
    pub fn configure_contents(&mut self, sync_flags: SyncFlags) -> u8 {
        self.configure(SyncType::Contents, sync_flags, vec![])
    }

    pub fn configure(
        &mut self,
        sync_type: SyncType,
        sync_flags: SyncFlags,
        property_tags: Vec<PropertyTag>,
    ) -> u8 {
        let request = SyncConfigureRequest {
            output_handle_idx: 1,
            sync_type,
            send_options: SendOptions::new(),
            sync_flags,
            restriction_data: vec![],
            extra_flags: SyncExtraFlags::new(),
            property_tags,
        };
        self.exec_ok(0, request);
        1
    }

    /// Uploads one state property in a Begin/Continue/End exchange.
    pub fn upload_state(&mut self, ctx_idx: u8, tag: PropertyTag, bytes: &[u8]) {
        self.exec_ok(
            ctx_idx,
            SyncUploadStateStreamBeginRequest {
                state_property: tag,
                transfer_buffer_size: bytes.len() as u32,
            },
        );
        if !bytes.is_empty() {
            self.exec_ok(
                ctx_idx,
                SyncUploadStateStreamContinueRequest {
                    stream_data: bytes.to_vec(),
                },
            );
        }
        self.exec_ok(ctx_idx, SyncUploadStateStreamEndRequest {});
    }

    pub fn get_buffer(
        &mut self,
        ctx_idx: u8,
        size: u16,
    ) -> FastTransferSourceGetBufferResponse {
        let reply = self.exec_ok(ctx_idx, FastTransferSourceGetBufferRequest::new(size));
        reply
            .content
            .to_fasttransfersourcegetbuffer()
            .expect("get-buffer reply body")
    }

    /// Reads the whole stream in `size`-byte requests, returning the
    /// reassembled bytes.
    pub fn read_stream(&mut self, ctx_idx: u8, size: u16) -> Vec<u8> {
        let mut assembled = Vec::new();
        loop {
            let response = self.get_buffer(ctx_idx, size);
            assembled.extend_from_slice(&response.transfer_buffer);
            if response.transfer_status == fxics_msg::fxtransfer::TransferStatus::Done {
                return assembled;
            }
        }
    }
}

pub fn decode_stream(stream: &[u8]) -> Vec<StreamItem> {
    PropertyReader::new(stream)
        .read_all()
        .expect("produced stream decodes")
}
