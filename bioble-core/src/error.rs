//! Error types for bioble-core

/// Result type alias for bioble-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// A received link frame did not have the expected shape
///
/// Local to decoding: a malformed notification is logged and ignored by the
/// session layer, never surfaced as a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame ({len} bytes): {reason}")]
    Malformed {
        len: usize,
        reason: &'static str,
    },
}

impl DecodeError {
    pub(crate) fn malformed(bytes: &[u8], reason: &'static str) -> Self {
        Self::Malformed {
            len: bytes.len(),
            reason,
        }
    }
}

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Chunk size of zero, or a write budget that leaves no room for payload
    #[error("Invalid max chunk size: {0} (must be at least 1)")]
    InvalidMaxChunk(usize),

    /// Payload needs more chunks than a Start frame can announce
    #[error("Payload too large: {size} bytes needs {chunks} chunks (max: {max})")]
    PayloadTooLarge {
        size: usize,
        chunks: usize,
        max: usize,
    },

    /// Unknown command code
    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Invalid session state transition
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Another session already holds the connection
    #[error("A session is already in progress")]
    SessionInProgress,
}
