//! ROP messages and structures for `fxics-rs`.
//!
//! Every synchronization and FastTransfer request/reply pair is a
//! fixed little-endian structure; the dynamic parts (property-value
//! arrays, transfer buffers, state streams) are length-prefixed blobs.
//! [`RopRequest`] and [`RopReply`] carry the opnum-dispatched content
//! enums.

#![forbid(unsafe_code)]

mod error;
pub mod fxtransfer;
pub mod import;
mod opnum;
mod plain;
mod status;
pub mod sync;
pub mod values;

pub use error::MsgError;
pub use opnum::RopOpnum;
pub use plain::{RequestContent, ResponseContent, RopReply, RopRequest};
pub use status::MapiStatus;
pub use values::{MessageReadState, PropertyValueArray, SizedBlob, TaggedPropertyValue};

/// fxics-msg result type.
pub type Result<T> = std::result::Result<T, MsgError>;
