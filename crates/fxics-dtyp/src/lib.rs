//! Common data types for `fxics-rs`.
//!
//! This crate holds the building blocks every other workspace member
//! relies on: the [`Guid`] and [`FileTime`] wire types, replica
//! identifiers and the `(globcnt << 16) | replid` id packing of
//! [`Fmid`], the 22-byte [`SourceKey`] blob, and the [`IdSet`] algebra
//! with its compact globset serialization.

#![forbid(unsafe_code)]

pub mod binrw_util;
pub mod eid;
pub mod filetime;
pub mod guid;
pub mod idset;

pub use eid::{Cn, Fmid, GlobCnt, PredecessorChangeList, ReplId, ReplicaMap, SourceKey};
pub use filetime::FileTime;
pub use guid::Guid;
pub use idset::{GlobRange, IdSet, IdSetGroup, IdSetReplica, RawIdSet};
