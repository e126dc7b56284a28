//! Transport layer for the BLE biometric peripheral
//!
//! The [`Link`] trait is the seam to the platform BLE stack. [`Transport`]
//! sits on top of it and owns the single connection, its status and its
//! RESULT-channel subscription, so the session layer never touches
//! link-specific types.

pub mod error;
pub mod layout;
pub mod scan;
pub mod sim;
pub mod subscription;
pub mod transport;

pub use error::{ConnectError, Result, TransportError};
pub use layout::ChannelLayout;
pub use scan::{Scan, ScanFilter};
pub use sim::{Reply, SimulatedAdapter, SimulatedPeripheral};
pub use subscription::{notification_channel, NotificationSink, Subscription, SubscriptionHandle};
pub use transport::{Connection, ConnectionStatus, Transport, TransportBuilder};

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use bioble_types::{Advertisement, PeripheralId};

/// Opaque handle of a link-level connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u32);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capabilities required of the platform BLE stack
#[async_trait]
pub trait Link: Send + Sync {
    /// Start scanning
    ///
    /// Advertisements arrive on the returned receiver until it is dropped or
    /// closed; the implementation stops its scanner when that happens.
    async fn scan(&self, filter: &ScanFilter) -> Result<mpsc::Receiver<Advertisement>>;

    /// Connect to a peripheral
    async fn connect(&self, peripheral: &PeripheralId) -> std::result::Result<ConnectionHandle, ConnectError>;

    /// Characteristics exposed under `service`
    async fn characteristics(
        &self,
        handle: ConnectionHandle,
        service: Uuid,
    ) -> std::result::Result<Vec<Uuid>, ConnectError>;

    /// Queue one frame for writing (write without response)
    ///
    /// Resolves once the local stack accepted the frame. Writes to the same
    /// characteristic must not be issued concurrently.
    async fn write(&self, handle: ConnectionHandle, characteristic: Uuid, frame: &[u8]) -> Result<()>;

    /// Enable notifications on a characteristic
    async fn subscribe(&self, handle: ConnectionHandle, characteristic: Uuid) -> Result<Subscription>;

    /// Tear the connection down; never fails locally
    async fn disconnect(&self, handle: ConnectionHandle);

    /// Human-readable name of the adapter, for logs
    fn name(&self) -> String;
}
