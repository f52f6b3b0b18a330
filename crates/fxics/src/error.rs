//! Engine error type.

use fxics_msg::MapiStatus;
use fxics_props::CodecError;
use thiserror::Error;

/// fxics result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors. Every ROP handler reports these through the reply's
/// `error_code`; the transport-level call itself still succeeds.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation requires a context state that has not been set up.
    #[error("context not initialized")]
    NotInitialized,

    /// A request field is out of range or inconsistent.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Unknown handle, or a handle of the wrong object type.
    #[error("invalid object handle or object type")]
    InvalidObject,

    /// The referenced record does not exist.
    #[error("object not found")]
    NotFound,

    /// The caller is not permitted to touch the object.
    #[error("access denied")]
    NoAccess,

    /// The backend cannot provide the requested feature.
    #[error("operation not supported")]
    NoSupport,

    #[error("not enough memory")]
    NotEnoughMemory,

    #[error("call failed: {0}")]
    CallFailed(String),

    /// An uploaded or stored idset did not decode.
    #[error("malformed idset encoding")]
    IdSetMalformed,

    /// A property tag carries a type the codec does not speak.
    #[error("unsupported property type {0:#06x}")]
    UnsupportedType(u16),

    /// The store backend failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Concurrent registry writers collided.
    #[error("registry transaction conflict")]
    TransactionConflict,
}

impl Error {
    /// The on-wire status code reported for this error.
    pub fn mapi_code(&self) -> u32 {
        match self {
            Error::NotInitialized => MapiStatus::U32_NOT_INITIALIZED,
            Error::InvalidParameter(_) => MapiStatus::U32_INVALID_PARAMETER,
            Error::InvalidObject => MapiStatus::U32_INVALID_OBJECT,
            Error::NotFound => MapiStatus::U32_NOT_FOUND,
            Error::NoAccess => MapiStatus::U32_NO_ACCESS,
            Error::NoSupport | Error::UnsupportedType(_) => MapiStatus::U32_NO_SUPPORT,
            Error::NotEnoughMemory => MapiStatus::U32_NOT_ENOUGH_MEMORY,
            Error::CallFailed(_) | Error::Backend(_) => MapiStatus::U32_GENERAL_FAILURE,
            Error::IdSetMalformed => MapiStatus::U32_CORRUPT_DATA,
            Error::TransactionConflict => MapiStatus::U32_COLLISION,
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        if let Some(&CodecError::UnsupportedType(t)) = err.custom_err::<CodecError>() {
            Error::UnsupportedType(t)
        } else {
            Error::CallFailed(err.to_string())
        }
    }
}
