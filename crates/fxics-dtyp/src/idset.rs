//! Sets of `(replica, globcnt)` pairs and their wire codec.
//!
//! Two representations exist side by side. [`RawIdSet`] is the
//! append-only form used while scanning tables; [`IdSet`] is the
//! canonical ranged form used on the wire and for persisted sync
//! state. Canonical means: per replica, ranges sorted ascending,
//! non-overlapping, and separated by at least one unused globcnt
//! (`low[i + 1] > high[i] + 1`).
//!
//! The serialized form is a sequence of replica groups, each framed by
//! a two-byte replid or a full GUID (selected per set), followed by a
//! *globset*: a command stream over six-byte big-endian counter values
//! where shared leading bytes are pushed once and each range or
//! singleton is emitted against the pushed prefix.

use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use binrw::{Endian, prelude::*};

use crate::eid::{GlobCnt, ReplId};
use crate::guid::Guid;

/// Globset command bytes. Values 0x01..=0x06 push that many prefix
/// bytes; a six-byte prefix stack encodes a singleton.
const CMD_POP: u8 = 0x50;
const CMD_RANGE: u8 = 0x52;
const CMD_END: u8 = 0x00;

/// Upper bound on replica groups in one serialized set.
const MAX_REPLICA_GROUPS: usize = 4096;

/// An inclusive range of 48-bit globcnt values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobRange {
    pub low: u64,
    pub high: u64,
}

impl GlobRange {
    pub const fn new(low: u64, high: u64) -> Self {
        GlobRange { low, high }
    }

    pub const fn single(value: u64) -> Self {
        GlobRange {
            low: value,
            high: value,
        }
    }

    pub const fn contains(&self, value: u64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// The replica framing of one serialized group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdSetReplica {
    Id(ReplId),
    Guid(Guid),
}

/// One replica's ranges within an [`IdSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSetGroup {
    pub replica: IdSetReplica,
    pub ranges: Vec<GlobRange>,
}

impl IdSetGroup {
    /// Reads a single replica group (frame plus globset) from a
    /// stream. Used by stream readers that must stop between groups;
    /// [`IdSet`]'s own `BinRead` consumes the whole remaining buffer.
    pub fn read_one<R: Read + Seek>(reader: &mut R, id_based: bool) -> BinResult<IdSetGroup> {
        let replica = if id_based {
            IdSetReplica::Id(ReplId(u16::read_options(reader, Endian::Little, ())?))
        } else {
            IdSetReplica::Guid(Guid::read_options(reader, Endian::Little, ())?)
        };
        let ranges = read_globset(reader)?;
        Ok(IdSetGroup { replica, ranges })
    }
}

/// A canonical ranged set of `(replica, globcnt)` pairs.
///
/// The `single` flag marks sets that logically represent one
/// contiguous seen-range per replica (the cn watermark sets); merges
/// of two such sets collapse each replica's ranges accordingly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdSet {
    pub single: bool,
    groups: Vec<IdSetGroup>,
}

/// Error detail carried inside `binrw::Error::Custom` for malformed
/// set encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSetFormatError(pub &'static str);

impl fmt::Display for IdSetFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed idset: {}", self.0)
    }
}

impl std::error::Error for IdSetFormatError {}

fn malformed<S: Seek>(stream: &mut S, msg: &'static str) -> binrw::Error {
    binrw::Error::Custom {
        pos: stream.stream_position().unwrap_or(0),
        err: Box::new(IdSetFormatError(msg)),
    }
}

fn to_be6(value: u64) -> [u8; 6] {
    let b = value.to_be_bytes();
    [b[2], b[3], b[4], b[5], b[6], b[7]]
}

fn from_be6(bytes: &[u8]) -> u64 {
    debug_assert_eq!(bytes.len(), 6);
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Sorts and coalesces ranges into canonical form: ascending,
/// non-overlapping, non-adjacent.
fn coalesce(ranges: &mut Vec<GlobRange>) {
    ranges.sort_unstable_by_key(|r| r.low);
    let mut out: Vec<GlobRange> = Vec::with_capacity(ranges.len());
    for r in ranges.drain(..) {
        match out.last_mut() {
            Some(last) if r.low <= last.high.saturating_add(1) => {
                last.high = last.high.max(r.high);
            }
            _ => out.push(r),
        }
    }
    *ranges = out;
}

fn remove_value(ranges: &mut Vec<GlobRange>, value: u64) {
    let idx = ranges.partition_point(|r| r.high < value);
    if idx >= ranges.len() || ranges[idx].low > value {
        return;
    }
    let r = ranges[idx];
    match (r.low == value, r.high == value) {
        (true, true) => {
            ranges.remove(idx);
        }
        (true, false) => ranges[idx].low = value + 1,
        (false, true) => ranges[idx].high = value - 1,
        (false, false) => {
            ranges[idx].high = value - 1;
            ranges.insert(idx + 1, GlobRange::new(value + 1, r.high));
        }
    }
}

fn write_globset(ranges: &[GlobRange], out: &mut Vec<u8>) {
    for range in ranges {
        let low = to_be6(range.low);
        let high = to_be6(range.high);
        if range.low == range.high {
            out.push(6);
            out.extend_from_slice(&low);
            out.push(CMD_POP);
        } else {
            let prefix = low
                .iter()
                .zip(high.iter())
                .take_while(|(a, b)| a == b)
                .count()
                .min(5);
            if prefix > 0 {
                out.push(prefix as u8);
                out.extend_from_slice(&low[..prefix]);
            }
            out.push(CMD_RANGE);
            out.extend_from_slice(&low[prefix..]);
            out.extend_from_slice(&high[prefix..]);
            if prefix > 0 {
                out.push(CMD_POP);
            }
        }
    }
    out.push(CMD_END);
}

fn read_globset<R: Read + Seek>(reader: &mut R) -> BinResult<Vec<GlobRange>> {
    let mut prefix: Vec<u8> = Vec::with_capacity(6);
    let mut pushes: Vec<usize> = Vec::new();
    let mut ranges = Vec::new();
    loop {
        let cmd = u8::read_options(reader, Endian::Little, ())?;
        match cmd {
            CMD_END => break,
            n @ 1..=6 => {
                let n = n as usize;
                if prefix.len() + n > 6 {
                    return Err(malformed(reader, "prefix deeper than six bytes"));
                }
                let mut bytes = [0u8; 6];
                reader.read_exact(&mut bytes[..n])?;
                prefix.extend_from_slice(&bytes[..n]);
                pushes.push(n);
                if prefix.len() == 6 {
                    let value = from_be6(&prefix);
                    ranges.push(GlobRange::single(value));
                }
            }
            CMD_POP => {
                let Some(n) = pushes.pop() else {
                    return Err(malformed(reader, "pop on empty prefix stack"));
                };
                let keep = prefix.len() - n;
                prefix.truncate(keep);
            }
            CMD_RANGE => {
                let rem = 6 - prefix.len();
                if rem == 0 {
                    return Err(malformed(reader, "range against a full prefix"));
                }
                let mut low = [0u8; 6];
                let mut high = [0u8; 6];
                low[..prefix.len()].copy_from_slice(&prefix);
                high[..prefix.len()].copy_from_slice(&prefix);
                reader.read_exact(&mut low[prefix.len()..])?;
                reader.read_exact(&mut high[prefix.len()..])?;
                let low = from_be6(&low);
                let high = from_be6(&high);
                if low > high {
                    return Err(malformed(reader, "descending range"));
                }
                ranges.push(GlobRange::new(low, high));
            }
            _ => return Err(malformed(reader, "unknown globset command")),
        }
    }
    coalesce(&mut ranges);
    Ok(ranges)
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[IdSetGroup] {
        &self.groups
    }

    /// The ranges recorded for a replica, if any.
    pub fn ranges_for(&self, replica: &IdSetReplica) -> Option<&[GlobRange]> {
        self.groups
            .iter()
            .find(|g| g.replica == *replica)
            .map(|g| g.ranges.as_slice())
    }

    /// Membership test against a GUID-framed replica group.
    pub fn includes(&self, replica: &Guid, glob: GlobCnt) -> bool {
        let Some(ranges) = self.ranges_for(&IdSetReplica::Guid(*replica)) else {
            return false;
        };
        let value = glob.value();
        let idx = ranges.partition_point(|r| r.high < value);
        idx < ranges.len() && ranges[idx].low <= value
    }

    /// Per-replica set union. The result is canonical; merging with an
    /// empty set returns the other operand unchanged, and two
    /// watermark (`single`) sets collapse each replica to its covering
    /// range.
    pub fn merge(&self, other: &IdSet) -> IdSet {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut groups = self.groups.clone();
        for group in &other.groups {
            match groups.iter_mut().find(|g| g.replica == group.replica) {
                Some(existing) => {
                    existing.ranges.extend_from_slice(&group.ranges);
                    coalesce(&mut existing.ranges);
                }
                None => groups.push(group.clone()),
            }
        }
        groups.sort_by(|a, b| a.replica.cmp(&b.replica));
        let single = self.single && other.single;
        if single {
            for group in &mut groups {
                if let (Some(first), Some(last)) = (group.ranges.first(), group.ranges.last()) {
                    group.ranges = vec![GlobRange::new(first.low, last.high)];
                }
            }
        }
        IdSet { single, groups }
    }

    /// Subtracts every value of a raw set, splitting ranges as needed.
    pub fn remove_raw(&mut self, raw: &RawIdSet) {
        for (guid, values) in raw.entries() {
            if let Some(group) = self
                .groups
                .iter_mut()
                .find(|g| g.replica == IdSetReplica::Guid(*guid))
            {
                for &value in values {
                    remove_value(&mut group.ranges, value);
                }
            }
        }
        self.groups.retain(|g| !g.ranges.is_empty());
    }

    /// Parses the wire form. An empty buffer is an empty set.
    pub fn parse(bytes: &[u8], id_based: bool) -> BinResult<IdSet> {
        let mut cursor = Cursor::new(bytes);
        IdSet::read_le_args(&mut cursor, (id_based,))
    }

    /// Serializes to the wire form, each group framed per its replica
    /// variant.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for group in &self.groups {
            match &group.replica {
                IdSetReplica::Id(id) => out.extend_from_slice(&id.0.to_le_bytes()),
                IdSetReplica::Guid(guid) => out.extend_from_slice(&guid.to_bytes()),
            }
            write_globset(&group.ranges, &mut out);
        }
        out
    }

    /// Builds a set from groups, dropping empty ones and ordering by
    /// replica.
    pub fn from_groups(single: bool, mut groups: Vec<IdSetGroup>) -> IdSet {
        groups.retain(|g| !g.ranges.is_empty());
        groups.sort_by(|a, b| a.replica.cmp(&b.replica));
        IdSet { single, groups }
    }
}

impl BinRead for IdSet {
    type Args<'a> = (bool,);

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        (id_based,): Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(pos))?;

        let mut groups = Vec::new();
        while reader.stream_position()? < end {
            if groups.len() >= MAX_REPLICA_GROUPS {
                return Err(malformed(reader, "replica count overflow"));
            }
            let group = IdSetGroup::read_one(reader, id_based)?;
            if !group.ranges.is_empty() {
                groups.push(group);
            }
        }
        Ok(IdSet::from_groups(false, groups))
    }
}

impl BinWrite for IdSet {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.to_bytes().write_options(writer, endian, ())
    }
}

/// The unordered append-only set used while scanning rows.
#[derive(Debug, Clone, Default)]
pub struct RawIdSet {
    pub single: bool,
    entries: Vec<(Guid, Vec<u64>)>,
}

impl RawIdSet {
    pub fn new(single: bool) -> Self {
        RawIdSet {
            single,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, replica: Guid, glob: GlobCnt) {
        match self.entries.iter_mut().find(|(g, _)| *g == replica) {
            Some((_, values)) => values.push(glob.value()),
            None => self.entries.push((replica, vec![glob.value()])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_empty())
    }

    /// Total number of recorded values, duplicates included.
    pub fn count(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Guid, &[u64])> {
        self.entries.iter().map(|(g, v)| (g, v.as_slice()))
    }

    /// Converts to the canonical ranged form with GUID framing.
    /// Watermark sets collapse each replica to its covering range.
    pub fn to_idset(&self) -> IdSet {
        let groups = self
            .entries
            .iter()
            .map(|(guid, values)| {
                let ranges = Self::ranges_of(values, self.single);
                IdSetGroup {
                    replica: IdSetReplica::Guid(*guid),
                    ranges,
                }
            })
            .collect();
        IdSet::from_groups(self.single, groups)
    }

    /// Converts to an id-framed set under one replid, folding every
    /// entry together. Used for the deletions section, which is always
    /// framed by the local replica id.
    pub fn to_idset_with_replid(&self, replid: ReplId) -> IdSet {
        let mut values: Vec<u64> = Vec::with_capacity(self.count());
        for (_, v) in &self.entries {
            values.extend_from_slice(v);
        }
        let ranges = Self::ranges_of(&values, self.single);
        IdSet::from_groups(
            self.single,
            vec![IdSetGroup {
                replica: IdSetReplica::Id(replid),
                ranges,
            }],
        )
    }

    fn ranges_of(values: &[u64], single: bool) -> Vec<GlobRange> {
        let mut values = values.to_vec();
        values.sort_unstable();
        values.dedup();
        let mut ranges: Vec<GlobRange> = values.into_iter().map(GlobRange::single).collect();
        coalesce(&mut ranges);
        if single {
            if let (Some(first), Some(last)) = (ranges.first(), ranges.last()) {
                ranges = vec![GlobRange::new(first.low, last.high)];
            }
        }
        ranges
    }
}
