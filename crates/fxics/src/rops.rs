//! ROP dispatch: resolves handles, runs the operation, and shapes the
//! reply.
//!
//! Every handler reports failure through the reply's `error_code`
//! while the dispatch itself always produces a reply; only transport
//! marshalling can fail a call outright, and that happens outside this
//! crate.

use fxics_dtyp::Fmid;
use fxics_msg::fxtransfer::{
    FastTransferSourceCopyToRequest, FastTransferSourceGetBufferRequest,
    FastTransferSourceGetBufferResponse,
};
use fxics_msg::sync::{
    SetLocalReplicaMidsetDeletedResponse, SyncConfigureRequest, SyncConfigureResponse,
    SyncGetTransferStateRequest, SyncGetTransferStateResponse, SyncOpenCollectorRequest,
    SyncOpenCollectorResponse, SyncUploadStateStreamBeginRequest,
    SyncUploadStateStreamBeginResponse, SyncUploadStateStreamContinueRequest,
    SyncUploadStateStreamContinueResponse, SyncUploadStateStreamEndResponse,
};
use fxics_msg::import::{
    SyncImportDeletesResponse, SyncImportHierarchyChangeResponse,
    SyncImportMessageChangeResponse, SyncImportMessageMoveResponse,
    SyncImportReadStateChangesResponse,
};
use fxics_msg::{MapiStatus, RequestContent, ResponseContent, RopReply, RopRequest};

use crate::download;
use crate::ftstream::FtChunk;
use crate::handles::{INVALID_HANDLE, ServerObject};
use crate::import;
use crate::session::Session;
use crate::store::ObjectRef;
use crate::synccontext::SyncContext;
use crate::{Error, Result};

/// Serves one ROP against the session, using `handles` as the call's
/// handle-cookie array.
pub(crate) fn execute(
    session: &mut Session,
    request: &RopRequest,
    handles: &mut Vec<u32>,
) -> RopReply {
    log::debug!("serving {}", request.opnum);
    match dispatch(session, request, handles) {
        Ok((handle_idx, content)) => RopReply {
            opnum: request.opnum,
            handle_idx,
            error_code: MapiStatus::U32_SUCCESS,
            content,
        },
        Err(err) => {
            log::debug!(
                "{} reported {}",
                request.opnum,
                MapiStatus::try_display_as_status(err.mapi_code())
            );
            RopReply {
                opnum: request.opnum,
                handle_idx: request.handle_idx,
                error_code: err.mapi_code(),
                content: ResponseContent::empty_for(request.opnum),
            }
        }
    }
}

fn dispatch(
    session: &mut Session,
    request: &RopRequest,
    handles: &mut Vec<u32>,
) -> Result<(u8, ResponseContent)> {
    let idx = request.handle_idx;
    match &request.content {
        RequestContent::FastTransferSourceCopyTo(req) => copy_to(session, idx, req, handles),
        RequestContent::FastTransferSourceGetBuffer(req) => get_buffer(session, idx, req, handles),
        RequestContent::SyncConfigure(req) => sync_configure(session, idx, req, handles),
        RequestContent::SyncImportMessageChange(req) => {
            let folder = synccontext_folder(session, handles, idx)?;
            let mid = import::message_change(session, folder, req)?;
            let cookie = session
                .handles
                .add(ServerObject::Message { folder, mid });
            place_handle(handles, req.output_handle_idx, cookie);
            Ok((
                req.output_handle_idx,
                SyncImportMessageChangeResponse {
                    message_id: Fmid(0),
                }
                .into(),
            ))
        }
        RequestContent::SyncImportHierarchyChange(req) => {
            let folder = synccontext_folder(session, handles, idx)?;
            import::hierarchy_change(session, folder, req)?;
            Ok((
                idx,
                SyncImportHierarchyChangeResponse {
                    folder_id: Fmid(0),
                }
                .into(),
            ))
        }
        RequestContent::SyncImportDeletes(req) => {
            let folder = synccontext_folder(session, handles, idx)?;
            import::import_deletes(session, folder, req)?;
            Ok((idx, SyncImportDeletesResponse::default().into()))
        }
        RequestContent::SyncUploadStateStreamBegin(req) => {
            upload_begin(session, idx, req, handles)
        }
        RequestContent::SyncUploadStateStreamContinue(req) => {
            upload_continue(session, idx, req, handles)
        }
        RequestContent::SyncUploadStateStreamEnd(_) => {
            with_synccontext(session, handles, idx, |ctx| ctx.upload_end())?;
            Ok((idx, SyncUploadStateStreamEndResponse::default().into()))
        }
        RequestContent::SyncImportMessageMove(req) => {
            let folder = synccontext_folder(session, handles, idx)?;
            import::message_move(session, folder, req)?;
            Ok((
                idx,
                SyncImportMessageMoveResponse {
                    message_id: Fmid(0),
                }
                .into(),
            ))
        }
        RequestContent::SyncOpenCollector(req) => open_collector(session, idx, req, handles),
        RequestContent::GetLocalReplicaIds(req) => {
            let cookie = cookie_at(handles, idx)?;
            if !matches!(session.handles.get(cookie)?, ServerObject::Mailbox) {
                return Err(Error::InvalidObject);
            }
            let response = import::local_replica_ids(session, req)?;
            Ok((idx, response.into()))
        }
        RequestContent::SyncImportReadStateChanges(req) => {
            let folder = synccontext_folder(session, handles, idx)?;
            import::read_state_changes(session, folder, req)?;
            Ok((idx, SyncImportReadStateChangesResponse::default().into()))
        }
        RequestContent::SyncGetTransferState(req) => {
            get_transfer_state(session, idx, req, handles)
        }
        RequestContent::SetLocalReplicaMidsetDeleted(_) => {
            // Accepted; the reference backends do not track foreign
            // tombstone declarations.
            log::debug!("midset-deleted declaration accepted as a no-op");
            let _ = synccontext_folder(session, handles, idx)
                .or_else(|_| folder_of(session, handles, idx))?;
            Ok((idx, SetLocalReplicaMidsetDeletedResponse::default().into()))
        }
    }
}

fn cookie_at(handles: &[u32], idx: u8) -> Result<u32> {
    handles
        .get(idx as usize)
        .copied()
        .filter(|cookie| *cookie != INVALID_HANDLE)
        .ok_or(Error::InvalidObject)
}

fn place_handle(handles: &mut Vec<u32>, idx: u8, cookie: u32) {
    let idx = idx as usize;
    if handles.len() <= idx {
        handles.resize(idx + 1, INVALID_HANDLE);
    }
    handles[idx] = cookie;
}

fn folder_of(session: &Session, handles: &[u32], idx: u8) -> Result<Fmid> {
    let cookie = cookie_at(handles, idx)?;
    match session.handles.get(cookie)? {
        ServerObject::Folder(fid) => Ok(*fid),
        _ => Err(Error::InvalidObject),
    }
}

fn synccontext_folder(session: &Session, handles: &[u32], idx: u8) -> Result<Fmid> {
    let cookie = cookie_at(handles, idx)?;
    match session.handles.get(cookie)? {
        ServerObject::SyncContext(ctx) => Ok(ctx.folder),
        _ => Err(Error::InvalidObject),
    }
}

fn with_synccontext<T>(
    session: &mut Session,
    handles: &[u32],
    idx: u8,
    f: impl FnOnce(&mut SyncContext) -> Result<T>,
) -> Result<T> {
    let cookie = cookie_at(handles, idx)?;
    match session.handles.get_mut(cookie)? {
        ServerObject::SyncContext(ctx) => f(ctx),
        _ => Err(Error::InvalidObject),
    }
}

fn sync_configure(
    session: &mut Session,
    idx: u8,
    request: &SyncConfigureRequest,
    handles: &mut Vec<u32>,
) -> Result<(u8, ResponseContent)> {
    let folder = folder_of(session, handles, idx)?;
    let ctx = SyncContext::configure(session.store(), folder, request)?;
    let cookie = session
        .handles
        .add(ServerObject::SyncContext(Box::new(ctx)));
    place_handle(handles, request.output_handle_idx, cookie);
    Ok((
        request.output_handle_idx,
        SyncConfigureResponse::default().into(),
    ))
}

fn open_collector(
    session: &mut Session,
    idx: u8,
    request: &SyncOpenCollectorRequest,
    handles: &mut Vec<u32>,
) -> Result<(u8, ResponseContent)> {
    let folder = folder_of(session, handles, idx)?;
    let ctx = SyncContext::collector(folder, request.is_contents_collector);
    let cookie = session
        .handles
        .add(ServerObject::SyncContext(Box::new(ctx)));
    place_handle(handles, request.output_handle_idx, cookie);
    Ok((
        request.output_handle_idx,
        SyncOpenCollectorResponse::default().into(),
    ))
}

fn upload_begin(
    session: &mut Session,
    idx: u8,
    request: &SyncUploadStateStreamBeginRequest,
    handles: &[u32],
) -> Result<(u8, ResponseContent)> {
    with_synccontext(session, handles, idx, |ctx| {
        ctx.upload_begin(request.state_property)
    })?;
    Ok((idx, SyncUploadStateStreamBeginResponse::default().into()))
}

fn upload_continue(
    session: &mut Session,
    idx: u8,
    request: &SyncUploadStateStreamContinueRequest,
    handles: &[u32],
) -> Result<(u8, ResponseContent)> {
    with_synccontext(session, handles, idx, |ctx| {
        ctx.upload_continue(&request.stream_data)
    })?;
    Ok((idx, SyncUploadStateStreamContinueResponse::default().into()))
}

fn get_buffer(
    session: &mut Session,
    idx: u8,
    request: &FastTransferSourceGetBufferRequest,
    handles: &[u32],
) -> Result<(u8, ResponseContent)> {
    let cookie = cookie_at(handles, idx)?;
    let max = usize::from(request.effective_size());

    let mut object = session.handles.take(cookie)?;
    let result = read_object_chunk(session, &mut object, max);
    session.handles.put_back(cookie, object);
    let chunk = result?;

    Ok((
        idx,
        FastTransferSourceGetBufferResponse {
            transfer_status: chunk.status,
            in_progress_count: chunk.steps,
            total_step_count: chunk.total_steps,
            transfer_buffer: chunk.data,
        }
        .into(),
    ))
}

fn read_object_chunk(
    session: &Session,
    object: &mut ServerObject,
    max: usize,
) -> Result<FtChunk> {
    match object {
        ServerObject::FtContext(ftx) => Ok(ftx.read(max)),
        ServerObject::SyncContext(ctx) => {
            if ctx.stream.is_none() {
                let stream = download::materialize_stream(session, ctx)?;
                log::debug!("synccontext stream is {} bytes long", stream.len());
                ctx.stream = Some(stream);
            }
            match ctx.stream.as_mut() {
                Some(stream) => Ok(stream.read(max)),
                None => Err(Error::CallFailed("stream did not materialize".into())),
            }
        }
        _ => Err(Error::InvalidObject),
    }
}

fn get_transfer_state(
    session: &mut Session,
    idx: u8,
    request: &SyncGetTransferStateRequest,
    handles: &mut Vec<u32>,
) -> Result<(u8, ResponseContent)> {
    let cookie = cookie_at(handles, idx)?;
    let mut object = session.handles.take(cookie)?;
    let result = match &mut object {
        ServerObject::SyncContext(ctx) => download::transfer_state_stream(session, ctx),
        _ => Err(Error::InvalidObject),
    };
    session.handles.put_back(cookie, object);
    let stream = result?;

    let ft_cookie = session
        .handles
        .add(ServerObject::FtContext(Box::new(stream)));
    place_handle(handles, request.output_handle_idx, ft_cookie);
    Ok((
        request.output_handle_idx,
        SyncGetTransferStateResponse::default().into(),
    ))
}

fn copy_to(
    session: &mut Session,
    idx: u8,
    request: &FastTransferSourceCopyToRequest,
    handles: &mut Vec<u32>,
) -> Result<(u8, ResponseContent)> {
    let cookie = cookie_at(handles, idx)?;
    if request.level > 0 {
        log::debug!("no support for copy levels > 0");
        return Err(Error::InvalidObject);
    }
    let object = match session.handles.get(cookie)? {
        ServerObject::Folder(fid) => ObjectRef::Folder(*fid),
        ServerObject::Message { folder, mid } => ObjectRef::Message {
            folder: *folder,
            message: *mid,
        },
        _ => return Err(Error::InvalidObject),
    };
    let stream = download::copy_to_stream(session, &object, &request.excluded_tags)?;
    let ft_cookie = session
        .handles
        .add(ServerObject::FtContext(Box::new(stream)));
    place_handle(handles, request.output_handle_idx, ft_cookie);
    Ok((
        request.output_handle_idx,
        fxics_msg::fxtransfer::FastTransferSourceCopyToResponse::default().into(),
    ))
}
