//! Connection ownership on top of a [`Link`]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use bioble_core::constants::{gatt::BIOMETRIC_SERVICE_UUID, DEFAULT_CONNECT_TIMEOUT};
use bioble_core::{Channel, ChannelSet, Frame};
use bioble_types::PeripheralId;

use crate::{
    error::*, ChannelLayout, ConnectionHandle, Link, Scan, ScanFilter, Subscription,
    SubscriptionHandle,
};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The currently bound peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub peripheral: PeripheralId,
    pub handle: ConnectionHandle,

    /// Channels found by [`Transport::discover_endpoints`] (empty before)
    pub endpoints: ChannelSet,
}

/// Owner of the single peripheral connection
///
/// Thread-safe and can be cloned cheaply (Arc internally); every clone sees
/// the same connection. The session layer only observes the status and never
/// opens or closes the connection except through [`Transport::disconnect`].
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    link: Box<dyn Link>,
    layout: ChannelLayout,
    service: Uuid,
    connect_timeout: Duration,
    state: parking_lot::Mutex<LinkState>,
    status: watch::Sender<ConnectionStatus>,

    /// The one RESULT-channel subscription, opened at connection time
    results: tokio::sync::Mutex<Option<Subscription>>,
}

#[derive(Default)]
struct LinkState {
    connection: Option<Connection>,
    subscriptions: HashMap<Channel, SubscriptionHandle>,
}

/// Builder for [`Transport`]
pub struct TransportBuilder {
    link: Box<dyn Link>,
    layout: ChannelLayout,
    service: Uuid,
    connect_timeout: Duration,
}

impl TransportBuilder {
    /// Set channel layout
    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the GATT service holding the channels
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Transport {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        Transport {
            inner: Arc::new(Inner {
                link: self.link,
                layout: self.layout,
                service: self.service,
                connect_timeout: self.connect_timeout,
                state: parking_lot::Mutex::new(LinkState::default()),
                status,
                results: tokio::sync::Mutex::new(None),
            }),
        }
    }
}

impl Transport {
    /// Create a transport with default settings
    pub fn new(link: impl Link + 'static) -> Self {
        Self::builder(link).build()
    }

    pub fn builder(link: impl Link + 'static) -> TransportBuilder {
        TransportBuilder {
            link: Box::new(link),
            layout: ChannelLayout::default(),
            service: BIOMETRIC_SERVICE_UUID,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.inner.layout
    }

    pub fn link_name(&self) -> String {
        self.inner.link.name()
    }

    /// Get current status
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified on every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// The current connection, if any
    pub fn connection(&self) -> Option<Connection> {
        self.inner.state.lock().connection.clone()
    }

    /// Check if the RESULT channel is being listened to
    pub fn is_listening(&self) -> bool {
        self.inner
            .state
            .lock()
            .subscriptions
            .get(&Channel::Result)
            .is_some_and(|h| !h.is_cancelled())
    }

    /// Start a scan bounded by `window`
    pub async fn scan(&self, filter: &ScanFilter, window: Duration) -> Result<Scan> {
        debug!("Scanning for {:?} via {}", window, self.link_name());

        let rx = self.inner.link.scan(filter).await?;
        Ok(Scan::new(rx, window))
    }

    /// Connect to a peripheral
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A connection already exists (`AlreadyConnected`)
    /// - The link fails (`Unreachable`, `Rejected`)
    /// - The link does not answer within the connect timeout (`Timeout`)
    pub async fn connect(&self, peripheral: &PeripheralId) -> std::result::Result<Connection, ConnectError> {
        {
            let state = self.inner.state.lock();
            if state.connection.is_some() || self.status() != ConnectionStatus::Disconnected {
                return Err(ConnectError::AlreadyConnected);
            }
            self.inner.status.send_replace(ConnectionStatus::Connecting);
        }
        let connecting = ConnectingGuard {
            status: &self.inner.status,
        };

        info!("Connecting to {}...", peripheral);

        let handle = match timeout(self.inner.connect_timeout, self.inner.link.connect(peripheral)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", peripheral, e);
                return Err(e);
            }
            Err(_) => {
                warn!("Connection to {} timed out", peripheral);
                return Err(ConnectError::Timeout);
            }
        };

        let connection = Connection {
            peripheral: peripheral.clone(),
            handle,
            endpoints: ChannelSet::empty(),
        };

        let cancelled = {
            let mut state = self.inner.state.lock();
            if self.status() == ConnectionStatus::Connecting {
                state.connection = Some(connection.clone());
                self.inner.status.send_replace(ConnectionStatus::Connected);
                false
            } else {
                true
            }
        };
        drop(connecting);

        if cancelled {
            // disconnect() ran while the link was still connecting
            self.inner.link.disconnect(handle).await;
            return Err(ConnectError::Unreachable("connect cancelled by disconnect".into()));
        }

        info!("Connected to {} ({})", peripheral, handle);
        Ok(connection)
    }

    /// Discover the channels the connected peripheral exposes
    ///
    /// # Errors
    ///
    /// Returns `MissingEndpoint` naming the first channel the layout needs but
    /// the peripheral does not expose.
    pub async fn discover_endpoints(&self) -> std::result::Result<ChannelSet, ConnectError> {
        let handle = self
            .current_handle()
            .ok_or_else(|| ConnectError::Unreachable("not connected".into()))?;

        let characteristics = self
            .inner
            .link
            .characteristics(handle, self.inner.service)
            .await?;
        let endpoints = self.inner.layout.resolve(&characteristics);

        if let Some(missing) = endpoints.first_missing(self.inner.layout.required()) {
            warn!("Peripheral lacks the {} endpoint", missing);
            return Err(ConnectError::MissingEndpoint(missing));
        }

        if let Some(connection) = self.inner.state.lock().connection.as_mut() {
            connection.endpoints = endpoints;
        }

        debug!("Discovered endpoints {:?}", endpoints);
        Ok(endpoints)
    }

    /// Open a notification subscription on `channel`
    ///
    /// Only one subscription per channel may be open at a time.
    pub async fn subscribe(&self, channel: Channel) -> Result<Subscription> {
        let handle = {
            let state = self.inner.state.lock();
            let connection = state.connection.as_ref().ok_or(TransportError::LinkLost)?;

            if state
                .subscriptions
                .get(&channel)
                .is_some_and(|h| !h.is_cancelled())
            {
                return Err(TransportError::AlreadySubscribed(channel));
            }
            connection.handle
        };

        let characteristic = self.inner.layout.characteristic(channel);
        let subscription = self.inner.link.subscribe(handle, characteristic).await?;

        self.inner
            .state
            .lock()
            .subscriptions
            .insert(channel, subscription.handle());

        debug!("Subscribed to {} ({})", channel, characteristic);
        Ok(subscription)
    }

    /// Open the RESULT subscription the session layer reads from
    pub async fn listen_for_results(&self) -> Result<()> {
        let subscription = self.subscribe(Channel::Result).await?;
        *self.inner.results.lock().await = Some(subscription);
        Ok(())
    }

    /// Next RESULT notification
    ///
    /// Returns `None` when no subscription is open, or once it is cancelled or
    /// the link drops it.
    pub async fn next_result(&self) -> Option<Bytes> {
        let mut results = self.inner.results.lock().await;
        match results.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// Take every RESULT notification already queued
    pub async fn drain_results(&self) -> Vec<Bytes> {
        let mut results = self.inner.results.lock().await;
        let mut drained = Vec::new();

        if let Some(subscription) = results.as_mut() {
            while let Some(notification) = subscription.try_recv() {
                drained.push(notification);
            }
        }
        drained
    }

    /// Write one frame to `channel` and wait for the local ack
    ///
    /// A `LinkLost` failure also tears the connection down.
    pub async fn write_frame(&self, channel: Channel, frame: &Frame) -> Result<()> {
        let handle = self.current_handle().ok_or(TransportError::LinkLost)?;
        let characteristic = self.inner.layout.characteristic(channel);

        trace!("Writing {} bytes to {}: {}", frame.len(), channel, hex::encode(frame));

        match self.inner.link.write(handle, characteristic, frame.as_bytes()).await {
            Err(TransportError::LinkLost) => {
                self.mark_link_lost();
                Err(TransportError::LinkLost)
            }
            other => other,
        }
    }

    /// Record that the link dropped underneath us
    pub fn mark_link_lost(&self) {
        if self.teardown().is_some() {
            warn!("Link lost");
        }
    }

    /// Disconnect; always succeeds locally
    ///
    /// Cancels every subscription first, so anything waiting on one wakes up
    /// immediately.
    pub async fn disconnect(&self) {
        if let Some(connection) = self.teardown() {
            info!("Disconnecting from {}...", connection.peripheral);
            self.inner.link.disconnect(connection.handle).await;
            info!("Disconnected");
        }
    }

    fn current_handle(&self) -> Option<ConnectionHandle> {
        self.inner
            .state
            .lock()
            .connection
            .as_ref()
            .map(|c| c.handle)
    }

    fn teardown(&self) -> Option<Connection> {
        let mut state = self.inner.state.lock();

        for (_, handle) in state.subscriptions.drain() {
            handle.cancel();
        }
        let connection = state.connection.take();
        self.inner.status.send_replace(ConnectionStatus::Disconnected);

        connection
    }
}

/// Returns a `Connecting` status to `Disconnected` when dropped
///
/// Covers every early return from `connect` as well as the caller dropping
/// the connect future mid-flight. A status that moved on is left alone.
struct ConnectingGuard<'a> {
    status: &'a watch::Sender<ConnectionStatus>,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Connecting {
                *status = ConnectionStatus::Disconnected;
                true
            } else {
                false
            }
        });
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("link", &self.link_name())
            .field("layout", &self.inner.layout)
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.state.get_mut().connection.is_some() {
            warn!("Transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimulatedAdapter, SimulatedPeripheral};
    use bioble_core::constants::gatt::{COMMAND_CHAR_UUID, VOICE_CHAR_UUID};
    use bioble_core::{Command, ResultCode};
    use pretty_assertions::assert_eq;

    fn peripheral() -> SimulatedPeripheral {
        SimulatedPeripheral::new(PeripheralId::new("C0:FF:EE:00:00:01").unwrap(), "BiometricAuthDevice")
    }

    async fn connected(sim: &SimulatedAdapter) -> Transport {
        let transport = Transport::new(sim.clone());
        transport
            .connect(&PeripheralId::new("C0:FF:EE:00:00:01").unwrap())
            .await
            .unwrap();
        transport.discover_endpoints().await.unwrap();
        transport.listen_for_results().await.unwrap();
        transport
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_create() {
        let transport = Transport::new(SimulatedAdapter::new([peripheral()]));
        assert!(!transport.is_connected());
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
        assert!(transport.connection().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_listen() {
        let sim = SimulatedAdapter::new([peripheral()]);
        let transport = connected(&sim).await;

        assert!(transport.is_connected());
        assert!(transport.is_listening());
        assert_eq!(transport.connection().unwrap().endpoints, ChannelSet::all());

        let again = transport
            .connect(&PeripheralId::new("C0:FF:EE:00:00:01").unwrap())
            .await;
        assert_eq!(again, Err(ConnectError::AlreadyConnected));
        assert_eq!(sim.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_unknown_peripheral() {
        let transport = Transport::new(SimulatedAdapter::new([peripheral()]));
        let result = transport.connect(&PeripheralId::new("nobody").unwrap()).await;

        assert!(matches!(result, Err(ConnectError::Unreachable(_))));
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_rejected() {
        let sim = SimulatedAdapter::new([peripheral().rejecting_connections(ConnectError::Rejected)]);
        let transport = Transport::new(sim);

        let result = transport.connect(&PeripheralId::new("C0:FF:EE:00:00:01").unwrap()).await;
        assert_eq!(result, Err(ConnectError::Rejected));
        assert!(!transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let sim = SimulatedAdapter::new([peripheral().with_connect_delay(Duration::from_secs(30))]);
        let transport = Transport::builder(sim)
            .with_connect_timeout(Duration::from_secs(1))
            .build();

        let result = transport.connect(&PeripheralId::new("C0:FF:EE:00:00:01").unwrap()).await;
        assert_eq!(result, Err(ConnectError::Timeout));
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_connect_resets_status() {
        let sim = SimulatedAdapter::new([peripheral().with_connect_delay(Duration::from_secs(30))]);
        let transport = Transport::new(sim);
        let id = PeripheralId::new("C0:FF:EE:00:00:01").unwrap();

        let abandoned = tokio::time::timeout(Duration::from_secs(1), transport.connect(&id)).await;
        assert!(abandoned.is_err());
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);

        // A fresh attempt reaches the link instead of failing as AlreadyConnected
        assert_eq!(transport.connect(&id).await, Err(ConnectError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_endpoint() {
        let sim = SimulatedAdapter::new([peripheral()
            .with_multi_channel()
            .without_characteristic(VOICE_CHAR_UUID)]);
        let transport = Transport::builder(sim)
            .with_layout(ChannelLayout::Multi)
            .build();

        transport
            .connect(&PeripheralId::new("C0:FF:EE:00:00:01").unwrap())
            .await
            .unwrap();

        assert_eq!(
            transport.discover_endpoints().await,
            Err(ConnectError::MissingEndpoint(Channel::Voice))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_after_disconnect_fail_with_link_lost() {
        let sim = SimulatedAdapter::new([peripheral()]);
        let transport = connected(&sim).await;

        transport.disconnect().await;
        transport.disconnect().await;

        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
        assert!(!sim.is_connected());
        assert_eq!(
            transport.write_frame(Channel::Face, &Frame::end()).await,
            Err(TransportError::LinkLost)
        );
        assert!(matches!(
            transport.subscribe(Channel::Result).await,
            Err(TransportError::LinkLost)
        ));
        assert_eq!(transport.next_result().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_drop_on_write_disconnects() {
        let sim = SimulatedAdapter::new([peripheral().dropping_link_at_write(2)]);
        let transport = connected(&sim).await;
        let mut status = transport.watch_status();

        transport.write_frame(Channel::Face, &Frame::start(Command::Enroll, 0)).await.unwrap();
        let result = transport.write_frame(Channel::Face, &Frame::end()).await;

        assert_eq!(result, Err(TransportError::LinkLost));
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);
        assert!(!transport.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_write_keeps_connection() {
        let sim = SimulatedAdapter::new([peripheral().rejecting_write(1)]);
        let transport = connected(&sim).await;

        let result = transport.write_frame(Channel::Face, &Frame::end()).await;

        assert_eq!(result, Err(TransportError::WriteRejected));
        assert!(result.unwrap_err().keeps_connection());
        assert!(transport.is_connected());
        assert!(sim.written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_subscription_per_channel() {
        let sim = SimulatedAdapter::new([peripheral()]);
        let transport = connected(&sim).await;

        assert!(matches!(
            transport.subscribe(Channel::Result).await,
            Err(TransportError::AlreadySubscribed(Channel::Result))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_produces_result_notification() {
        let sim = SimulatedAdapter::new([peripheral()]);
        let transport = connected(&sim).await;

        transport
            .write_frame(Channel::Trigger, &Frame::trigger(Command::Authenticate))
            .await
            .unwrap();

        let notification = transport.next_result().await.unwrap();
        assert_eq!(notification.as_ref(), Frame::result(ResultCode::AuthOk).as_bytes());
        assert_eq!(sim.written_to(COMMAND_CHAR_UUID).len(), 1);
        assert_eq!(sim.triggers(), vec![0x02]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_results() {
        let sim = SimulatedAdapter::new([peripheral()]);
        let transport = connected(&sim).await;

        assert!(sim.notify(bioble_core::constants::gatt::RESULT_CHAR_UUID, vec![0xAA, 0x01, 0xBB]));
        assert!(sim.notify(bioble_core::constants::gatt::RESULT_CHAR_UUID, vec![0x00]));

        assert_eq!(transport.drain_results().await.len(), 2);
        assert!(transport.drain_results().await.is_empty());
    }
}
