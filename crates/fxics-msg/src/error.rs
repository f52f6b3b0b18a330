//! Message-level error type.

use thiserror::Error;

/// Errors raised while building or decoding ROP messages.
#[derive(Debug, Error)]
pub enum MsgError {
    /// A content enum held a different variant than the caller asked
    /// to cast it to.
    #[error("unexpected content type: expected {expected}, got {actual}")]
    UnexpectedContent {
        expected: &'static str,
        actual: &'static str,
    },

    /// Structurally valid but semantically impossible message data.
    #[error("invalid message data: {0}")]
    InvalidData(String),

    /// A status code with no [`crate::MapiStatus`] definition.
    #[error("no status code definition for {0:#010x}")]
    MissingStatusDefinition(u32),

    /// Wire-level decode/encode failure.
    #[error(transparent)]
    Codec(#[from] binrw::Error),
}
