//! Server-side Incremental Change Synchronization (ICS) and
//! FastTransfer engine for an EMSMDB mailbox store.
//!
//! The engine sits between a ROP transport (not provided here) and a
//! persistent [`store::StoreBackend`]. Each authenticated connection
//! owns a [`Session`]; ROP requests decoded by `fxics-msg` go through
//! [`Session::execute`], which resolves handles, runs the operation
//! and shapes the reply.
//!
//! Downloads produce a self-describing FastTransfer byte stream plus a
//! cutmark index ([`ftstream`]); uploads apply client changes through
//! the import operations. Named properties resolve through the
//! [`namedprops::NamedPropsRegistry`].

#![forbid(unsafe_code)]

mod download;
mod error;
mod import;
mod rops;

pub mod ftstream;
pub mod handles;
pub mod namedprops;
pub mod session;
pub mod store;
pub mod synccontext;

pub use error::{Error, Result};
pub use ftstream::{FtChunk, FtContext};
pub use namedprops::{MemoryNamedProps, NamedPropsBackend, NamedPropsRegistry};
pub use session::Session;
pub use store::{MemoryStore, StoreBackend};
pub use synccontext::SyncContext;

pub use fxics_dtyp::*;
pub use fxics_msg::*;
pub use fxics_props::*;
