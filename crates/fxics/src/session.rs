//! Per-session engine state and the ROP entry point.
//!
//! One `Session` serves one authenticated mailbox connection. Requests
//! within a session are strictly serialized by the caller; distinct
//! sessions run on their own threads and share only the store backend
//! and the named-property registry, which synchronize internally.

use std::sync::Arc;

use fxics_dtyp::{Fmid, Guid, ReplicaMap};
use fxics_msg::{RopReply, RopRequest};

use crate::handles::{HandleTable, ServerObject};
use crate::namedprops::NamedPropsRegistry;
use crate::rops;
use crate::store::StoreBackend;
use crate::Result;

pub struct Session {
    owner: String,
    store: Arc<dyn StoreBackend>,
    registry: Arc<NamedPropsRegistry>,
    replicas: ReplicaMap,
    pub(crate) handles: HandleTable,
}

impl Session {
    /// Creates a session for a mailbox owner whose local replica is
    /// identified by `replica_guid`.
    pub fn new(
        owner: impl Into<String>,
        replica_guid: Guid,
        store: Arc<dyn StoreBackend>,
        registry: Arc<NamedPropsRegistry>,
    ) -> Self {
        Session {
            owner: owner.into(),
            store,
            registry,
            replicas: ReplicaMap::new(replica_guid),
            handles: HandleTable::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn store(&self) -> &dyn StoreBackend {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &NamedPropsRegistry {
        self.registry.as_ref()
    }

    pub fn replicas(&self) -> &ReplicaMap {
        &self.replicas
    }

    /// Registers a foreign replica for this owner; rare, and only on
    /// provisioning paths.
    pub fn replicas_mut(&mut self) -> &mut ReplicaMap {
        &mut self.replicas
    }

    /// Binds the mailbox root to a fresh handle.
    pub fn open_mailbox(&mut self) -> u32 {
        self.handles.add(ServerObject::Mailbox)
    }

    /// Opens a folder and binds it to a fresh handle.
    pub fn open_folder(&mut self, fid: Fmid) -> Result<u32> {
        self.store.open_folder(fid)?;
        Ok(self.handles.add(ServerObject::Folder(fid)))
    }

    /// Releases a handle, dropping the context it owned (including any
    /// partially read stream).
    pub fn close_handle(&mut self, cookie: u32) -> Result<()> {
        self.handles.close(cookie)
    }

    /// Serves one ROP. `handles` is the call's handle-cookie array;
    /// handlers resolve their input through it and place created
    /// handles into it.
    pub fn execute(&mut self, request: &RopRequest, handles: &mut Vec<u32>) -> RopReply {
        rops::execute(self, request, handles)
    }
}
