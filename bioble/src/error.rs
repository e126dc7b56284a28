//! High-level error types

use std::time::Duration;

use bioble_core::Channel;
use bioble_transport::{ConnectError, TransportError};

pub type Result<T> = std::result::Result<T, Error>;

/// Discovery failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The scan window elapsed without a matching advertisement
    #[error("No peripheral named {name:?} found within {window:?}")]
    NotFound {
        name: String,
        window: Duration,
    },

    /// The scan could not be started
    #[error("Scan failed: {0}")]
    Scan(#[from] TransportError),
}

impl DiscoveryError {
    /// Check if scanning again might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Why a session did not produce a result
///
/// Device-reported failures (`ENROLL_FAIL`, `AUTH_FAIL`) are results, not
/// session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Not connected, or the RESULT subscription is not open
    #[error("Device not ready")]
    NotReady,

    /// Another session holds the connection
    #[error("A session is already in progress")]
    AlreadyInProgress,

    /// No result notification before the deadline
    #[error("Timed out waiting for result")]
    Timeout,

    /// The connection dropped or was closed during the session
    #[error("Disconnected during session")]
    Disconnected,

    /// A frame write failed without dropping the connection
    #[error("Write failed: {0}")]
    Write(TransportError),

    /// A payload could not be framed
    #[error("Framing failed: {0}")]
    Frame(bioble_core::Error),

    /// Only FACE, VOICE and GESTURE carry payloads
    #[error("{0} is not a data channel")]
    InvalidChannel(Channel),
}

impl SessionError {
    /// Check if starting a new session later might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInProgress | Self::Timeout | Self::Write(TransportError::WriteRejected)
        )
    }
}

/// Umbrella error for the facade
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] bioble_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Session failed: {0}")]
    Session(#[from] SessionError),

    #[error("Type error: {0}")]
    Types(#[from] bioble_types::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_recoverable() {
        assert!(SessionError::Timeout.is_recoverable());
        assert!(SessionError::Write(TransportError::WriteRejected).is_recoverable());
        assert!(!SessionError::Disconnected.is_recoverable());
        assert!(!SessionError::NotReady.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = SessionError::Timeout.into();
        assert_eq!(err, Error::Session(SessionError::Timeout));

        let err: Error = DiscoveryError::Scan(TransportError::LinkLost).into();
        assert!(err.to_string().contains("Link lost"));
    }

    #[test]
    fn test_not_found_message() {
        let err = DiscoveryError::NotFound {
            name: "BiometricAuthDevice".into(),
            window: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "No peripheral named \"BiometricAuthDevice\" found within 10s"
        );
        assert!(err.is_recoverable());
    }
}
