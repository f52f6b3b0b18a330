//! Full ROP request/reply envelopes.

use binrw::prelude::*;

use super::opnum::RopOpnum;
use super::status::MapiStatus;
use super::*;

/// Makes the [`RequestContent`] & [`ResponseContent`] methods.
macro_rules! make_content_impl {
    (
        $struct_name:ident,
        $({$variant:ident, $struct_type:ty},)+
    ) => {
        pastey::paste! {

impl $struct_name {
    /// Returns the name of the content value.
    pub fn content_name(&self) -> &'static str {
        use $struct_name::*;
        match self {
            $(
                [<$variant>](_) => stringify!([<$variant>]),
            )+
        }
    }

    $(
        #[doc = concat!("Attempts to cast the current content type to [", stringify!($struct_type),"].")]
        pub fn [<to_ $variant:lower>](self) -> crate::Result<$struct_type> {
            match self {
                $struct_name::[<$variant>](inner) => Ok(inner),
                _ => Err(crate::MsgError::UnexpectedContent{
                    expected: stringify!([<$variant>]),
                    actual: self.content_name(),
                }),
            }
        }

        #[doc = concat!("Attempts to cast the current content type to [", stringify!($struct_type),"].")]
        pub fn [<as_ $variant:lower>](&self) -> crate::Result<&$struct_type> {
            match self {
                $struct_name::[<$variant>](inner) => Ok(inner),
                _ => Err(crate::MsgError::UnexpectedContent{
                    expected: stringify!([<$variant>]),
                    actual: self.content_name(),
                }),
            }
        }
    )+
}
        }
    };
}

/// Internal, one-use macro to generate the request-response pairs for
/// the [`RequestContent`] & [`ResponseContent`] enums.
macro_rules! make_content {
    (
        $({$cmd:ident, $struct_pfx:ident},)+
    ) => {
        pastey::paste!{

/// Contains all the variants for a ROP request.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(import(opnum: &RopOpnum))]
#[brw(little)]
pub enum RequestContent {
    $(
        #[br(pre_assert(matches!(opnum, RopOpnum::$cmd)))]
        $cmd($struct_pfx::[<$cmd Request>]),
    )*
}

/// Contains all the variants for a ROP reply.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(import(opnum: &RopOpnum))]
#[brw(little)]
pub enum ResponseContent {
    $(
        #[br(pre_assert(matches!(opnum, RopOpnum::$cmd)))]
        $cmd($struct_pfx::[<$cmd Response>]),
    )*
}

impl RequestContent {
    /// Get the opnum associated with this content.
    pub fn associated_opnum(&self) -> RopOpnum {
        use RequestContent::*;
        match self {
            $(
                $cmd(_) => RopOpnum::$cmd,
            )*
        }
    }
}

impl ResponseContent {
    /// Get the opnum associated with this content.
    pub fn associated_opnum(&self) -> RopOpnum {
        use ResponseContent::*;
        match self {
            $(
                $cmd(_) => RopOpnum::$cmd,
            )*
        }
    }

    /// The all-defaults reply body for an opnum, used when a handler
    /// fails before producing one.
    pub fn empty_for(opnum: RopOpnum) -> ResponseContent {
        match opnum {
            $(
                RopOpnum::$cmd => ResponseContent::$cmd(Default::default()),
            )*
        }
    }
}

// Into<RequestContent> / Into<ResponseContent> implementations for all
// the request/response pairs.
$(
    impl From<$struct_pfx::[<$cmd Request>]>
        for RequestContent
    {
        fn from(req: $struct_pfx::[<$cmd Request>]) -> Self {
            RequestContent::$cmd(req)
        }
    }
    impl From<$struct_pfx::[<$cmd Response>]>
        for ResponseContent
    {
        fn from(resp: $struct_pfx::[<$cmd Response>]) -> Self {
            ResponseContent::$cmd(resp)
        }
    }
)+

make_content_impl!{
    RequestContent,
    $(
        {$cmd, $struct_pfx::[<$cmd Request>]},
    )+
}

make_content_impl!{
    ResponseContent,
    $(
        {$cmd, $struct_pfx::[<$cmd Response>]},
    )+
}
        }
    };
}

make_content!(
    {FastTransferSourceCopyTo, fxtransfer},
    {FastTransferSourceGetBuffer, fxtransfer},
    {SyncConfigure, sync},
    {SyncImportMessageChange, import},
    {SyncImportHierarchyChange, import},
    {SyncImportDeletes, import},
    {SyncUploadStateStreamBegin, sync},
    {SyncUploadStateStreamContinue, sync},
    {SyncUploadStateStreamEnd, sync},
    {SyncImportMessageMove, import},
    {SyncOpenCollector, sync},
    {GetLocalReplicaIds, import},
    {SyncImportReadStateChanges, import},
    {SyncGetTransferState, sync},
    {SetLocalReplicaMidsetDeleted, sync},
);

/// A single ROP request: opnum, acting handle index, typed body.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct RopRequest {
    pub opnum: RopOpnum,
    /// Index into the call's handle array naming the object acted on.
    pub handle_idx: u8,
    #[br(args(&opnum))]
    #[bw(args(opnum))]
    pub content: RequestContent,
}

impl RopRequest {
    pub fn new(handle_idx: u8, content: impl Into<RequestContent>) -> Self {
        let content = content.into();
        RopRequest {
            opnum: content.associated_opnum(),
            handle_idx,
            content,
        }
    }
}

/// A single ROP reply. ROP-level failures travel in `error_code`; the
/// call itself always succeeds at the transport layer.
#[binrw::binrw]
#[derive(Debug, PartialEq, Clone)]
#[brw(little)]
pub struct RopReply {
    pub opnum: RopOpnum,
    pub handle_idx: u8,
    pub error_code: u32,
    #[br(args(&opnum))]
    #[bw(args(opnum))]
    pub content: ResponseContent,
}

impl RopReply {
    pub fn new(handle_idx: u8, status: MapiStatus, content: impl Into<ResponseContent>) -> Self {
        let content = content.into();
        RopReply {
            opnum: content.associated_opnum(),
            handle_idx,
            error_code: status as u32,
            content,
        }
    }

    /// The reply's status, when it has a definition.
    pub fn status(&self) -> crate::Result<MapiStatus> {
        self.error_code.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_roundtrip() {
        let req = RopRequest::new(
            0,
            sync::SyncUploadStateStreamContinueRequest {
                stream_data: vec![0xde, 0xad],
            },
        );
        assert_eq!(req.opnum, RopOpnum::SyncUploadStateStreamContinue);

        let mut cursor = std::io::Cursor::new(Vec::new());
        req.write_le(&mut cursor).unwrap();
        let parsed = RopRequest::read_le(&mut std::io::Cursor::new(cursor.get_ref())).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn reply_envelope_roundtrip() {
        let reply = RopReply::new(
            1,
            MapiStatus::Success,
            fxtransfer::FastTransferSourceGetBufferResponse {
                transfer_status: fxtransfer::TransferStatus::Done,
                in_progress_count: 1,
                total_step_count: 1,
                transfer_buffer: vec![1, 2, 3],
            },
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        reply.write_le(&mut cursor).unwrap();
        let parsed = RopReply::read_le(&mut std::io::Cursor::new(cursor.get_ref())).unwrap();
        assert_eq!(parsed, reply);
        assert_eq!(parsed.status().unwrap(), MapiStatus::Success);
    }

    #[test]
    fn content_cast_helpers() {
        let content: RequestContent = import::GetLocalReplicaIdsRequest { id_count: 2 }.into();
        assert_eq!(content.content_name(), "GetLocalReplicaIds");
        assert!(content.as_getlocalreplicaids().is_ok());
        assert!(content.as_syncconfigure().is_err());
    }

    #[test]
    fn empty_reply_bodies_exist_for_every_opnum() {
        for opnum in [
            RopOpnum::FastTransferSourceCopyTo,
            RopOpnum::SyncConfigure,
            RopOpnum::SyncImportMessageMove,
            RopOpnum::SetLocalReplicaMidsetDeleted,
        ] {
            assert_eq!(ResponseContent::empty_for(opnum).associated_opnum(), opnum);
        }
    }
}
