//! Transport errors

use bioble_core::Channel;

pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures while establishing a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Peripheral unreachable: {0}")]
    Unreachable(String),

    #[error("Connection rejected by peripheral")]
    Rejected,

    #[error("Connection timeout")]
    Timeout,

    #[error("Peripheral does not expose the {0} endpoint")]
    MissingEndpoint(Channel),

    #[error("Already connected")]
    AlreadyConnected,
}

/// Failures on an established link
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection is gone; every later operation on it fails the same way
    #[error("Link lost")]
    LinkLost,

    /// The local stack refused to queue the write
    #[error("Write rejected by the link")]
    WriteRejected,

    /// Radio off or scanning not permitted
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// A notification subscription for this channel is already open
    #[error("Already subscribed to {0}")]
    AlreadySubscribed(Channel),
}

impl TransportError {
    /// Check if the connection survives this error
    pub fn keeps_connection(&self) -> bool {
        !matches!(self, Self::LinkLost)
    }
}
