//! # bioble
//!
//! Transport and session layer for a BLE biometric peripheral that performs
//! on-device face, voice and gesture capture and reports enroll/authenticate
//! results.
//!
//! ## Features
//!
//! - Bounded-time discovery by advertised name and service
//! - Chunked Start/Data/End framing sized to the link's write budget
//! - One enroll-or-authenticate session at a time, with typed outcomes
//! - Hard cancellation of a waiting session on disconnect
//! - Structured log events and a bounded event log for observers
//! - An in-memory simulated peripheral for tests and demos
//!
//! ## Quick Start
//!
//! ```no_run
//! use bioble::{BiometricDevice, BiometricPayloads, DeviceConfig};
//! use bioble::transport::{SimulatedAdapter, SimulatedPeripheral};
//! use bioble::types::PeripheralId;
//!
//! #[tokio::main]
//! async fn main() -> bioble::Result<()> {
//!     let peripheral = SimulatedPeripheral::new(PeripheralId::new("sim-1")?, "BiometricAuthDevice");
//!     let device = BiometricDevice::new(SimulatedAdapter::new([peripheral]), DeviceConfig::from_env())?;
//!
//!     // Discover and connect
//!     device.connect().await?;
//!
//!     // Authenticate with already-captured samples
//!     let payloads = BiometricPayloads::new("face", "voice", "gesture");
//!     match device.authenticate(payloads).await {
//!         Ok(code) if code.is_success() => println!("Authenticated"),
//!         Ok(code) => println!("Rejected by device: {}", code),
//!         Err(e) => println!("Session failed: {}", e),
//!     }
//!
//!     device.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod directory;
pub mod error;
pub mod events;
pub mod session;

// Re-exports
pub use config::DeviceConfig;
pub use device::{BiometricDevice, BiometricPayloads};
pub use directory::DeviceDirectory;
pub use error::{DiscoveryError, Error, Result, SessionError};
pub use events::{EventFanout, EventLog, EventSink, SessionOutcome};
pub use session::SessionStateMachine;

// Re-export types
pub use bioble_core::{Channel, Command, ResultCode, SessionPhase};
pub use bioble_transport::{ChannelLayout, ConnectError, ConnectionStatus, TransportError};
pub use bioble_types::{LogEvent, LogLevel, PeripheralId};

pub use bioble_core as core;
pub use bioble_transport as transport;
pub use bioble_types as types;
