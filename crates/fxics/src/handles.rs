//! The per-session handle table.
//!
//! Handle slots are 32-bit cookies handed to the client; each resolves
//! to one typed server object. Contexts are owned by their handle and
//! dropped with it, which frees any produced stream buffers.

use std::collections::HashMap;

use fxics_dtyp::Fmid;

use crate::ftstream::FtContext;
use crate::synccontext::SyncContext;
use crate::{Error, Result};

/// Value marking an unused slot in a call's handle array.
pub const INVALID_HANDLE: u32 = 0xFFFF_FFFF;

/// A server-side object reachable through a handle.
#[derive(Debug)]
pub enum ServerObject {
    /// The mailbox root; required by the replica-id reservation ROP.
    Mailbox,
    Folder(Fmid),
    Message { folder: Fmid, mid: Fmid },
    SyncContext(Box<SyncContext>),
    FtContext(Box<FtContext>),
}

/// Cookie-to-object map for one session.
#[derive(Debug, Default)]
pub struct HandleTable {
    next: u32,
    objects: HashMap<u32, ServerObject>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object, returning its cookie.
    pub fn add(&mut self, object: ServerObject) -> u32 {
        self.next += 1;
        let cookie = self.next;
        self.objects.insert(cookie, object);
        cookie
    }

    pub fn get(&self, cookie: u32) -> Result<&ServerObject> {
        self.objects.get(&cookie).ok_or(Error::InvalidObject)
    }

    pub fn get_mut(&mut self, cookie: u32) -> Result<&mut ServerObject> {
        self.objects.get_mut(&cookie).ok_or(Error::InvalidObject)
    }

    /// Detaches an object from its cookie; pair with [`Self::put_back`]
    /// for operations that need the object and the table at once.
    pub fn take(&mut self, cookie: u32) -> Result<ServerObject> {
        self.objects.remove(&cookie).ok_or(Error::InvalidObject)
    }

    pub fn put_back(&mut self, cookie: u32, object: ServerObject) {
        self.objects.insert(cookie, object);
    }

    /// Releases a handle, dropping the object it owned.
    pub fn close(&mut self, cookie: u32) -> Result<()> {
        self.objects.remove(&cookie).map(|_| ()).ok_or(Error::InvalidObject)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_dtyp::{GlobCnt, ReplId};

    #[test]
    fn cookies_are_distinct_and_closable() {
        let mut table = HandleTable::new();
        let a = table.add(ServerObject::Mailbox);
        let b = table.add(ServerObject::Folder(Fmid::new(
            ReplId::LOCAL,
            GlobCnt::new(7),
        )));
        assert_ne!(a, b);
        assert!(matches!(table.get(a), Ok(ServerObject::Mailbox)));
        table.close(a).unwrap();
        assert!(matches!(table.get(a), Err(Error::InvalidObject)));
        assert!(table.get(b).is_ok());
    }

    #[test]
    fn take_and_put_back() {
        let mut table = HandleTable::new();
        let cookie = table.add(ServerObject::Mailbox);
        let object = table.take(cookie).unwrap();
        assert!(table.get(cookie).is_err());
        table.put_back(cookie, object);
        assert!(table.get(cookie).is_ok());
    }
}
