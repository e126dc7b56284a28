//! High-level device interface

use std::sync::Arc;

use bytes::Bytes;

use bioble_core::{Channel, Command, SessionPhase};
use bioble_transport::{ConnectError, ConnectionStatus, Link, Transport};
use bioble_types::PeripheralId;

use crate::config::DeviceConfig;
use crate::directory::DeviceDirectory;
use crate::error::Result;
use crate::events::{Emitter, EventFanout, EventLog, EventSink, SessionOutcome};
use crate::session::SessionStateMachine;

/// Captured biometric samples for one session
///
/// Opaque to this crate; empty buffers are legal and send a zero-chunk
/// transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BiometricPayloads {
    pub face: Bytes,
    pub voice: Bytes,
    pub gesture: Bytes,
}

impl BiometricPayloads {
    pub fn new(face: impl Into<Bytes>, voice: impl Into<Bytes>, gesture: impl Into<Bytes>) -> Self {
        Self {
            face: face.into(),
            voice: voice.into(),
            gesture: gesture.into(),
        }
    }

    /// Channel/payload pairs in transmission order (face, voice, gesture)
    pub fn into_channels(self) -> Vec<(Channel, Bytes)> {
        vec![
            (Channel::Face, self.face),
            (Channel::Voice, self.voice),
            (Channel::Gesture, self.gesture),
        ]
    }
}

/// BLE biometric peripheral
///
/// Discovers the peripheral, owns the connection and runs enroll and
/// authenticate sessions over it.
///
/// # Examples
///
/// ```no_run
/// use bioble::{BiometricDevice, BiometricPayloads, DeviceConfig};
/// use bioble::transport::{SimulatedAdapter, SimulatedPeripheral};
/// use bioble::types::PeripheralId;
///
/// #[tokio::main]
/// async fn main() -> bioble::Result<()> {
///     let peripheral = SimulatedPeripheral::new(PeripheralId::new("sim-1")?, "BiometricAuthDevice");
///     let device = BiometricDevice::new(SimulatedAdapter::new([peripheral]), DeviceConfig::default())?;
///
///     device.connect().await?;
///
///     let outcome = device.enroll(BiometricPayloads::new("face", "voice", "gesture")).await;
///     println!("Enrollment: {:?}", outcome);
///
///     device.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct BiometricDevice {
    config: DeviceConfig,
    transport: Transport,
    directory: DeviceDirectory,
    sessions: SessionStateMachine,
    log: EventLog,
    events: Emitter,
}

impl BiometricDevice {
    /// Create a device whose events go to its own [`EventLog`]
    ///
    /// # Errors
    ///
    /// Returns `Error::Core(InvalidMaxChunk)` if the write budget leaves no
    /// room for payload.
    pub fn new(link: impl Link + 'static, config: DeviceConfig) -> Result<Self> {
        let log = EventLog::new(config.event_log_capacity);
        Self::build(link, config, log.clone(), Arc::new(log))
    }

    /// Create a device that also forwards every event to `sink`
    pub fn with_event_sink(
        link: impl Link + 'static,
        config: DeviceConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let log = EventLog::new(config.event_log_capacity);
        let fanout = EventFanout::new()
            .with_sink(Arc::new(log.clone()))
            .with_sink(sink);
        Self::build(link, config, log, Arc::new(fanout))
    }

    fn build(
        link: impl Link + 'static,
        config: DeviceConfig,
        log: EventLog,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let codec = config.codec()?;

        let mut builder = Transport::builder(link)
            .with_layout(config.layout)
            .with_connect_timeout(config.connect_timeout);
        if let Some(service) = config.service_filter {
            builder = builder.with_service(service);
        }
        let transport = builder.build();

        let sessions = SessionStateMachine::new(transport.clone(), codec, sink.clone())
            .with_result_timeout(config.result_timeout)
            .with_min_log_level(config.min_log_level);

        Ok(Self {
            directory: DeviceDirectory::new(transport.clone()),
            events: Emitter::new(sink, config.min_log_level),
            config,
            transport,
            sessions,
            log,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The underlying transport
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    /// Check if connected and ready for a session
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected() && self.transport.is_listening()
    }

    /// The connected peripheral, if any
    pub fn peripheral(&self) -> Option<PeripheralId> {
        self.transport.connection().map(|c| c.peripheral)
    }

    /// Phase of the current session (`Idle` when none)
    pub fn session_phase(&self) -> SessionPhase {
        self.sessions.phase()
    }

    /// Recent log events and session outcomes
    pub fn events(&self) -> &EventLog {
        &self.log
    }

    /// Discover the configured peripheral and connect to it
    ///
    /// Discovery, connection, endpoint discovery and the RESULT subscription
    /// all complete before this returns; a failure in a later step
    /// disconnects again.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Already connected
    /// - No matching peripheral advertises within the scan window
    /// - The connection fails or times out
    /// - The peripheral lacks a required endpoint
    pub async fn connect(&self) -> Result<PeripheralId> {
        if self.transport.status() != ConnectionStatus::Disconnected {
            return Err(ConnectError::AlreadyConnected.into());
        }

        self.events.info(format!(
            "Scanning for {:?} ({:?})",
            self.config.device_name, self.config.scan_window
        ));
        let peripheral = self
            .directory
            .discover(
                &self.config.device_name,
                self.config.service_filter,
                self.config.scan_window,
            )
            .await
            .inspect_err(|e| self.events.error(e.to_string()))?;

        self.events.info(format!("Connecting to {}...", peripheral));
        self.transport
            .connect(&peripheral)
            .await
            .inspect_err(|e| self.events.error(e.to_string()))?;

        if let Err(e) = self.establish().await {
            self.events.error(format!("Setup failed: {}", e));
            self.transport.disconnect().await;
            return Err(e);
        }

        self.events.info(format!("Connected to {}", peripheral));
        Ok(peripheral)
    }

    async fn establish(&self) -> Result<()> {
        let endpoints = self.transport.discover_endpoints().await?;
        self.events.debug(format!("Endpoints: {:?}", endpoints));

        self.transport.listen_for_results().await?;
        self.events.debug("Listening for results");

        Ok(())
    }

    /// Run an enroll session
    pub async fn enroll(&self, payloads: BiometricPayloads) -> SessionOutcome {
        self.sessions.start(Command::Enroll, payloads.into_channels()).await
    }

    /// Run an authenticate session
    pub async fn authenticate(&self, payloads: BiometricPayloads) -> SessionOutcome {
        self.sessions
            .start(Command::Authenticate, payloads.into_channels())
            .await
    }

    /// Disconnect; always succeeds locally
    ///
    /// A session waiting for its result ends with `SessionError::Disconnected`.
    pub async fn disconnect(&self) {
        if self.transport.status() == ConnectionStatus::Disconnected {
            return;
        }

        self.events.info("Disconnecting...");
        self.transport.disconnect().await;
        self.events.info("Disconnected");
    }
}

impl std::fmt::Debug for BiometricDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiometricDevice")
            .field("device_name", &self.config.device_name)
            .field("transport", &self.transport)
            .field("session", &self.sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioble_transport::{SimulatedAdapter, SimulatedPeripheral};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_create() {
        let link = SimulatedAdapter::new(Vec::<SimulatedPeripheral>::new());
        let device = BiometricDevice::new(link, DeviceConfig::default()).unwrap();

        assert!(!device.is_connected());
        assert_eq!(device.status(), ConnectionStatus::Disconnected);
        assert_eq!(device.session_phase(), SessionPhase::Idle);
        assert!(device.peripheral().is_none());
        assert_eq!(device.events().capacity(), 256);
    }

    #[test]
    fn test_device_invalid_write_budget() {
        let config = DeviceConfig::default().with_write_budget(1);
        let link = SimulatedAdapter::new(Vec::<SimulatedPeripheral>::new());
        let result = BiometricDevice::new(link, config);

        assert!(matches!(
            result,
            Err(crate::Error::Core(bioble_core::Error::InvalidMaxChunk(0)))
        ));
    }

    #[test]
    fn test_payload_order() {
        let payloads = BiometricPayloads::new("f", "v", Bytes::new());

        let channels: Vec<Channel> = payloads.into_channels().into_iter().map(|(c, _)| c).collect();
        assert_eq!(channels, vec![Channel::Face, Channel::Voice, Channel::Gesture]);
    }
}
