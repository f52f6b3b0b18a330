//! MAPI property tags, typed values, and the FastTransfer tagged-stream
//! codec for `fxics-rs`.
//!
//! A property tag is 32 bits: `(id << 16) | type`. Ids at or above
//! 0x8000 are *named* and resolve through a registry to a
//! `(kind, guid, key)` triple which travels inline in the stream,
//! between the tag and its value.

#![forbid(unsafe_code)]

pub mod codec;
pub mod pidtag;
pub mod tag;
pub mod value;

pub use codec::{
    NamedPropKey, NamedPropName, NamedPropResolver, NoNamedProps, PropertyReader, PropertyWriter,
    StreamItem,
};
pub use tag::{PropertyTag, PropertyType};
pub use value::{CodecError, PropertyValue};
