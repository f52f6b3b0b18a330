//! Folder/message identifier primitives.
//!
//! Durable object identities are pairs of a 128-bit replica GUID and a
//! 48-bit per-replica counter. Inside the server they travel packed
//! into 64 bits as `(globcnt << 16) | replid`; on the wire they travel
//! as 22-byte source keys (`GUID ‖ globcnt LE`).

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek, Write};

use binrw::{Endian, prelude::*};

use crate::guid::Guid;

/// A 16-bit replica id, valid within one mailbox owner's replica map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplId(pub u16);

impl ReplId {
    /// The mailbox owner's own replica.
    pub const LOCAL: ReplId = ReplId(0x0001);
}

/// A 48-bit per-replica global counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GlobCnt(u64);

impl GlobCnt {
    pub const MAX: u64 = (1 << 48) - 1;

    /// Wraps a counter value; values beyond 48 bits are truncated.
    pub const fn new(value: u64) -> Self {
        GlobCnt(value & Self::MAX)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The six-byte little-endian form used in source keys and
    /// GetLocalReplicaIds replies.
    pub fn to_le_bytes(self) -> [u8; 6] {
        let b = self.0.to_le_bytes();
        [b[0], b[1], b[2], b[3], b[4], b[5]]
    }

    pub fn from_le_bytes(b: [u8; 6]) -> Self {
        GlobCnt(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], 0, 0]))
    }
}

/// A 64-bit folder or message id: `(globcnt << 16) | replid`.
///
/// Change numbers use the same packing but are drawn from a separate
/// per-replica sequence; the [`Cn`] alias marks those call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fmid(pub u64);

/// A change number. Same packing as [`Fmid`], separate sequence.
pub type Cn = Fmid;

impl Fmid {
    /// Placeholder id reported by backends for rows without a durable
    /// identity; such rows are skipped by the sync producers.
    pub const INVALID: Fmid = Fmid(0x7fff_ffff_ffff_ffff);

    pub const fn new(replid: ReplId, glob: GlobCnt) -> Self {
        Fmid((glob.value() << 16) | replid.0 as u64)
    }

    pub const fn replid(self) -> ReplId {
        ReplId((self.0 & 0xffff) as u16)
    }

    pub const fn globcnt(self) -> GlobCnt {
        GlobCnt(self.0 >> 16)
    }
}

impl fmt::Display for Fmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl BinRead for Fmid {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        Ok(Fmid(u64::read_options(reader, Endian::Little, ())?))
    }
}

impl BinWrite for Fmid {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.0.write_options(writer, Endian::Little, ())
    }
}

/// The 22-byte on-wire identity of a folder or message:
/// replica GUID followed by the six-byte little-endian globcnt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub replica_guid: Guid,
    pub glob_cnt: GlobCnt,
}

impl SourceKey {
    pub const SIZE: usize = 22;

    pub fn new(replica_guid: Guid, glob_cnt: GlobCnt) -> Self {
        SourceKey {
            replica_guid,
            glob_cnt,
        }
    }

    pub fn to_bytes(self) -> [u8; 22] {
        let mut out = [0u8; 22];
        out[..16].copy_from_slice(&self.replica_guid.to_bytes());
        out[16..].copy_from_slice(&self.glob_cnt.to_le_bytes());
        out
    }

    /// Parses a source-key blob. Blobs longer than 22 bytes keep only
    /// the first six counter bytes, matching the tolerant reader used
    /// by the import path.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&bytes[..16]);
        let mut cnt = [0u8; 6];
        cnt.copy_from_slice(&bytes[16..22]);
        Some(SourceKey {
            replica_guid: Guid::from_bytes(guid),
            glob_cnt: GlobCnt::from_le_bytes(cnt),
        })
    }
}

impl BinRead for SourceKey {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let replica_guid = Guid::read_options(reader, endian, ())?;
        let cnt = <[u8; 6]>::read_options(reader, endian, ())?;
        Ok(SourceKey {
            replica_guid,
            glob_cnt: GlobCnt::from_le_bytes(cnt),
        })
    }
}

impl BinWrite for SourceKey {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.replica_guid.write_options(writer, endian, ())?;
        self.glob_cnt.to_le_bytes().write_options(writer, endian, ())
    }
}

/// A predecessor-change-list blob: a concatenation of
/// `(cb: u8) ‖ change-key` entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PredecessorChangeList(Vec<u8>);

impl PredecessorChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        PredecessorChangeList(bytes)
    }

    /// Builds a single-entry list from one change key.
    pub fn from_change_key(change_key: &[u8]) -> Self {
        let mut list = Self::new();
        list.push_front(change_key);
        list
    }

    /// Prepends a new entry; called once per modification.
    pub fn push_front(&mut self, change_key: &[u8]) {
        let mut entry = Vec::with_capacity(1 + change_key.len() + self.0.len());
        entry.push(change_key.len() as u8);
        entry.extend_from_slice(change_key);
        entry.extend_from_slice(&self.0);
        self.0 = entry;
    }

    /// Iterates the change-key entries in stored (newest-first) order.
    /// Stops at the first truncated entry.
    pub fn entries(&self) -> impl Iterator<Item = &[u8]> {
        let mut rest = self.0.as_slice();
        std::iter::from_fn(move || {
            let (&cb, tail) = rest.split_first()?;
            if tail.len() < cb as usize {
                return None;
            }
            let (entry, remaining) = tail.split_at(cb as usize);
            rest = remaining;
            Some(entry)
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Builds an XID blob (`GUID ‖ id bytes LE`) of the given id width.
/// Change keys use the six-byte form.
pub fn xid_bytes(replica_guid: &Guid, id: u64, id_length: usize) -> Vec<u8> {
    debug_assert!(id_length <= 8);
    let mut out = Vec::with_capacity(16 + id_length);
    out.extend_from_slice(&replica_guid.to_bytes());
    out.extend_from_slice(&id.to_le_bytes()[..id_length]);
    out
}

/// Six-byte XID form used for change keys.
pub fn gid_bytes(replica_guid: &Guid, id: u64) -> Vec<u8> {
    xid_bytes(replica_guid, id, 6)
}

/// The per-owner bijection between replica GUIDs and 16-bit replids.
///
/// The owner's own replica is always id `0x0001`; foreign replicas get
/// ids assigned on first sight and keep them for the map's lifetime.
#[derive(Debug, Clone)]
pub struct ReplicaMap {
    by_guid: HashMap<Guid, ReplId>,
    by_id: HashMap<ReplId, Guid>,
    next_id: u16,
}

impl ReplicaMap {
    pub fn new(local_guid: Guid) -> Self {
        let mut map = ReplicaMap {
            by_guid: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 2,
        };
        map.by_guid.insert(local_guid, ReplId::LOCAL);
        map.by_id.insert(ReplId::LOCAL, local_guid);
        map
    }

    pub fn local_guid(&self) -> Guid {
        self.by_id[&ReplId::LOCAL]
    }

    /// Registers a foreign replica, returning its (possibly existing)
    /// replid.
    pub fn register(&mut self, guid: Guid) -> ReplId {
        if let Some(&id) = self.by_guid.get(&guid) {
            return id;
        }
        let id = ReplId(self.next_id);
        self.next_id += 1;
        self.by_guid.insert(guid, id);
        self.by_id.insert(id, guid);
        id
    }

    pub fn replid_of(&self, guid: &Guid) -> Option<ReplId> {
        self.by_guid.get(guid).copied()
    }

    pub fn guid_of(&self, id: ReplId) -> Option<Guid> {
        self.by_id.get(&id).copied()
    }

    /// Resolves a source-key blob to an fmid, verifying the replica
    /// GUID belongs to this owner.
    pub fn fmid_from_source_key(&self, bytes: &[u8]) -> Option<Fmid> {
        let key = SourceKey::from_bytes(bytes)?;
        let replid = self.replid_of(&key.replica_guid)?;
        Some(Fmid::new(replid, key.glob_cnt))
    }

    /// Produces the 22-byte source key of an fmid, or `None` when the
    /// replid is unknown to this owner.
    pub fn source_key_from_fmid(&self, fmid: Fmid) -> Option<SourceKey> {
        let guid = self.guid_of(fmid.replid())?;
        Some(SourceKey::new(guid, fmid.globcnt()))
    }
}
