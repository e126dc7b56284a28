//! In-memory peripheral implementing [`Link`]
//!
//! Behaves like the biometric firmware: it reassembles every transfer it is
//! sent, and answers a trigger frame with a result notification. Scripted
//! faults (rejected connections, rejected writes, link drops, silence,
//! malformed replies) make every session path reachable without a radio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use bioble_core::constants::gatt::{
    BIOMETRIC_SERVICE_UUID, COMMAND_CHAR_UUID, FACE_CHAR_UUID, GESTURE_CHAR_UUID,
    RESULT_CHAR_UUID, VOICE_CHAR_UUID,
};
use bioble_core::{Assembled, Command, Frame, FrameAssembler, ResultCode};
use bioble_types::{Advertisement, PeripheralId};

use crate::{
    error::*, notification_channel, ConnectionHandle, Link, NotificationSink, ScanFilter,
    Subscription,
};

/// How a simulated peripheral answers a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `ENROLL_OK` / `AUTH_OK` for the triggered command
    Accept,

    /// `ENROLL_FAIL` / `AUTH_FAIL` for the triggered command
    Reject,

    /// A fixed raw code
    Code(ResultCode),

    /// Never answer
    Silent,
}

/// Script for one simulated peripheral
#[derive(Debug, Clone)]
pub struct SimulatedPeripheral {
    advertisement: Advertisement,
    appears_after: Duration,
    service: Uuid,
    characteristics: Vec<Uuid>,
    connect_error: Option<ConnectError>,
    connect_delay: Duration,
    reply: Reply,
    reply_delay: Duration,
    noise: Vec<Bytes>,
    reject_write_at: Option<usize>,
    drop_link_at_write: Option<usize>,
    drop_link_after_trigger: Option<Duration>,
}

impl SimulatedPeripheral {
    /// A shared-channel peripheral advertising the biometric service
    pub fn new(id: PeripheralId, name: impl Into<String>) -> Self {
        Self {
            advertisement: Advertisement::new(id, name).with_service(BIOMETRIC_SERVICE_UUID),
            appears_after: Duration::from_millis(100),
            service: BIOMETRIC_SERVICE_UUID,
            characteristics: vec![COMMAND_CHAR_UUID, RESULT_CHAR_UUID],
            connect_error: None,
            connect_delay: Duration::from_millis(20),
            reply: Reply::Accept,
            reply_delay: Duration::from_millis(200),
            noise: Vec::new(),
            reject_write_at: None,
            drop_link_at_write: None,
            drop_link_after_trigger: None,
        }
    }

    pub fn id(&self) -> &PeripheralId {
        &self.advertisement.id
    }

    /// Replace the advertisement (e.g. to drop the service UUID)
    pub fn with_advertisement(mut self, advertisement: Advertisement) -> Self {
        self.advertisement = advertisement;
        self
    }

    /// Delay from scan start until the first advertisement
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// Expose separate face, voice and gesture characteristics
    pub fn with_multi_channel(mut self) -> Self {
        for c in [FACE_CHAR_UUID, VOICE_CHAR_UUID, GESTURE_CHAR_UUID] {
            if !self.characteristics.contains(&c) {
                self.characteristics.push(c);
            }
        }
        self
    }

    pub fn without_characteristic(mut self, characteristic: Uuid) -> Self {
        self.characteristics.retain(|c| *c != characteristic);
        self
    }

    pub fn rejecting_connections(mut self, error: ConnectError) -> Self {
        self.connect_error = Some(error);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn replying(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Notifications sent on RESULT just before the real reply
    pub fn with_noise(mut self, notification: impl Into<Bytes>) -> Self {
        self.noise.push(notification.into());
        self
    }

    /// Refuse the n-th write (1-based) with `WriteRejected`
    pub fn rejecting_write(mut self, n: usize) -> Self {
        self.reject_write_at = Some(n);
        self
    }

    /// Drop the link on the n-th write (1-based)
    pub fn dropping_link_at_write(mut self, n: usize) -> Self {
        self.drop_link_at_write = Some(n);
        self
    }

    /// Drop the link `delay` after receiving a trigger
    pub fn dropping_link_after_trigger(mut self, delay: Duration) -> Self {
        self.drop_link_after_trigger = Some(delay);
        self
    }

    fn reply_code(&self, command: u8) -> Option<ResultCode> {
        let command = Command::try_from(command).ok();

        match (self.reply, command) {
            (Reply::Silent, _) => None,
            (Reply::Code(code), _) => Some(code),
            (Reply::Accept, Some(cmd)) => Some(ResultCode::success_for(cmd)),
            (Reply::Reject, Some(cmd)) => Some(ResultCode::failure_for(cmd)),
            (_, None) => Some(ResultCode::Unknown(0)),
        }
    }
}

/// A frame the simulated peripheral accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFrame {
    pub characteristic: Uuid,
    pub bytes: Bytes,
}

/// A complete Start/Data/End transfer the simulated peripheral reassembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedTransfer {
    pub characteristic: Uuid,
    pub command: u8,
    pub payload: Bytes,
}

/// Simulated BLE adapter with scripted peripherals in range
///
/// Cloning shares the simulation, so a test can keep a clone for
/// inspection after handing one to a [`Transport`](crate::Transport).
#[derive(Debug, Clone)]
pub struct SimulatedAdapter {
    inner: Arc<SimInner>,
}

#[derive(Debug)]
struct SimInner {
    peripherals: Vec<SimulatedPeripheral>,
    powered: AtomicBool,
    state: parking_lot::Mutex<SimState>,
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: u32,
    live: Option<Live>,
    written: Vec<WrittenFrame>,
    transfers: Vec<ReceivedTransfer>,
    triggers: Vec<u8>,
    connects: usize,
}

#[derive(Debug)]
struct Live {
    handle: ConnectionHandle,
    peripheral: usize,
    writes: usize,
    assemblers: HashMap<Uuid, FrameAssembler>,
    sinks: HashMap<Uuid, NotificationSink>,
}

impl SimulatedAdapter {
    pub fn new(peripherals: impl IntoIterator<Item = SimulatedPeripheral>) -> Self {
        Self {
            inner: Arc::new(SimInner {
                peripherals: peripherals.into_iter().collect(),
                powered: AtomicBool::new(true),
                state: parking_lot::Mutex::new(SimState::default()),
            }),
        }
    }

    /// Turn the simulated radio on or off
    pub fn set_powered(&self, powered: bool) {
        self.inner.powered.store(powered, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().live.is_some()
    }

    /// Number of successful connections so far
    pub fn connect_count(&self) -> usize {
        self.inner.state.lock().connects
    }

    /// Every frame accepted so far, in write order
    pub fn written(&self) -> Vec<WrittenFrame> {
        self.inner.state.lock().written.clone()
    }

    /// Frames accepted on one characteristic, in write order
    pub fn written_to(&self, characteristic: Uuid) -> Vec<Bytes> {
        self.inner
            .state
            .lock()
            .written
            .iter()
            .filter(|w| w.characteristic == characteristic)
            .map(|w| w.bytes.clone())
            .collect()
    }

    /// Transfers reassembled so far
    pub fn transfers(&self) -> Vec<ReceivedTransfer> {
        self.inner.state.lock().transfers.clone()
    }

    /// Command bytes of every trigger received
    pub fn triggers(&self) -> Vec<u8> {
        self.inner.state.lock().triggers.clone()
    }

    /// Push a notification on a characteristic of the live connection
    ///
    /// Returns false if nobody is subscribed.
    pub fn notify(&self, characteristic: Uuid, notification: impl Into<Bytes>) -> bool {
        self.inner
            .state
            .lock()
            .live
            .as_ref()
            .and_then(|live| live.sinks.get(&characteristic))
            .is_some_and(|sink| sink.deliver(notification))
    }

    /// The peripheral walks out of range
    pub fn drop_link(&self) {
        if let Some(live) = self.inner.state.lock().live.take() {
            debug!("Simulated link {} dropped", live.handle);
        }
    }

    fn peripheral_for(&self, handle: ConnectionHandle) -> Option<SimulatedPeripheral> {
        let state = self.inner.state.lock();
        state
            .live
            .as_ref()
            .filter(|live| live.handle == handle)
            .map(|live| self.inner.peripherals[live.peripheral].clone())
    }

    fn schedule_reply(&self, handle: ConnectionHandle, peripheral: &SimulatedPeripheral, command: u8) {
        if let Some(code) = peripheral.reply_code(command) {
            let sim = self.clone();
            let delay = peripheral.reply_delay;
            let noise = peripheral.noise.clone();

            tokio::spawn(async move {
                sleep(delay).await;

                let state = sim.inner.state.lock();
                let Some(sink) = state
                    .live
                    .as_ref()
                    .filter(|live| live.handle == handle)
                    .and_then(|live| live.sinks.get(&RESULT_CHAR_UUID))
                else {
                    trace!("Reply for {} dropped: link gone or not subscribed", handle);
                    return;
                };

                for n in noise {
                    sink.deliver(n);
                }
                sink.deliver(Frame::result(code).into_bytes());
            });
        }

        if let Some(delay) = peripheral.drop_link_after_trigger {
            let sim = self.clone();

            tokio::spawn(async move {
                sleep(delay).await;

                let mut state = sim.inner.state.lock();
                if state.live.as_ref().is_some_and(|live| live.handle == handle) {
                    debug!("Simulated link {} dropped after trigger", handle);
                    state.live = None;
                }
            });
        }
    }
}

#[async_trait]
impl Link for SimulatedAdapter {
    async fn scan(&self, filter: &ScanFilter) -> Result<mpsc::Receiver<Advertisement>> {
        if !self.inner.powered.load(Ordering::Acquire) {
            return Err(TransportError::AdapterUnavailable("simulated radio is off".into()));
        }

        let (tx, rx) = mpsc::channel(16);
        let started = Instant::now();

        let mut schedule: Vec<(Duration, Advertisement)> = self
            .inner
            .peripherals
            .iter()
            .filter(|p| filter.accepts(&p.advertisement))
            .map(|p| (p.appears_after, p.advertisement.clone()))
            .collect();
        schedule.sort_by_key(|(at, _)| *at);

        tokio::spawn(async move {
            for (at, advertisement) in schedule {
                sleep_until(started + at).await;
                if tx.send(advertisement).await.is_err() {
                    return;
                }
            }
            // A real scanner keeps listening until stopped
            tx.closed().await;
        });

        Ok(rx)
    }

    async fn connect(&self, peripheral: &PeripheralId) -> std::result::Result<ConnectionHandle, ConnectError> {
        let index = self
            .inner
            .peripherals
            .iter()
            .position(|p| p.id() == peripheral)
            .ok_or_else(|| ConnectError::Unreachable(format!("{} not in range", peripheral)))?;
        let script = &self.inner.peripherals[index];

        sleep(script.connect_delay).await;

        if let Some(error) = &script.connect_error {
            return Err(error.clone());
        }

        let mut state = self.inner.state.lock();
        if state.live.is_some() {
            return Err(ConnectError::Rejected);
        }

        state.next_handle += 1;
        state.connects += 1;
        let handle = ConnectionHandle(state.next_handle);
        state.live = Some(Live {
            handle,
            peripheral: index,
            writes: 0,
            assemblers: HashMap::new(),
            sinks: HashMap::new(),
        });

        Ok(handle)
    }

    async fn characteristics(
        &self,
        handle: ConnectionHandle,
        service: Uuid,
    ) -> std::result::Result<Vec<Uuid>, ConnectError> {
        let peripheral = self
            .peripheral_for(handle)
            .ok_or_else(|| ConnectError::Unreachable("link gone".into()))?;

        if peripheral.service == service {
            Ok(peripheral.characteristics)
        } else {
            Ok(Vec::new())
        }
    }

    async fn write(&self, handle: ConnectionHandle, characteristic: Uuid, frame: &[u8]) -> Result<()> {
        // Queuing a write yields, like a real stack would
        tokio::task::yield_now().await;

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let Some(live) = state.live.as_mut().filter(|live| live.handle == handle) else {
            return Err(TransportError::LinkLost);
        };
        let script = &self.inner.peripherals[live.peripheral];

        live.writes += 1;
        if script.drop_link_at_write == Some(live.writes) {
            debug!("Simulated link {} dropped at write {}", handle, live.writes);
            state.live = None;
            return Err(TransportError::LinkLost);
        }
        if script.reject_write_at == Some(live.writes) || !script.characteristics.contains(&characteristic) {
            return Err(TransportError::WriteRejected);
        }

        let bytes = Bytes::copy_from_slice(frame);
        state.written.push(WrittenFrame {
            characteristic,
            bytes: bytes.clone(),
        });

        let assembled = live
            .assemblers
            .entry(characteristic)
            .or_default()
            .push(&bytes);

        let mut triggered = None;
        match assembled {
            Ok(Some(Assembled::Transfer { command, payload })) => {
                trace!("Simulated peripheral received {} bytes on {}", payload.len(), characteristic);
                state.transfers.push(ReceivedTransfer {
                    characteristic,
                    command,
                    payload,
                });
            }
            Ok(Some(Assembled::Trigger { command })) => {
                state.triggers.push(command);
                triggered = Some((script.clone(), command));
            }
            Ok(None) => {}
            Err(e) => warn!("Simulated peripheral discarded frame: {}", e),
        }
        drop(guard);

        if let Some((script, command)) = triggered {
            self.schedule_reply(handle, &script, command);
        }

        Ok(())
    }

    async fn subscribe(&self, handle: ConnectionHandle, characteristic: Uuid) -> Result<Subscription> {
        let mut state = self.inner.state.lock();

        let Some(live) = state.live.as_mut().filter(|live| live.handle == handle) else {
            return Err(TransportError::LinkLost);
        };
        if !self.inner.peripherals[live.peripheral]
            .characteristics
            .contains(&characteristic)
        {
            return Err(TransportError::WriteRejected);
        }

        let (sink, subscription) = notification_channel(characteristic);
        live.sinks.insert(characteristic, sink);

        Ok(subscription)
    }

    async fn disconnect(&self, handle: ConnectionHandle) {
        let mut state = self.inner.state.lock();
        if state.live.as_ref().is_some_and(|live| live.handle == handle) {
            state.live = None;
        }
    }

    fn name(&self) -> String {
        format!("simulated adapter ({} peripherals)", self.inner.peripherals.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioble_core::FrameCodec;
    use pretty_assertions::assert_eq;

    fn peripheral(id: &str, name: &str) -> SimulatedPeripheral {
        SimulatedPeripheral::new(PeripheralId::new(id).unwrap(), name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_powered_off() {
        let sim = SimulatedAdapter::new([peripheral("a", "x")]);
        sim.set_powered(false);

        let result = sim.scan(&ScanFilter::any()).await;
        assert!(matches!(result, Err(TransportError::AdapterUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_orders_by_appearance() {
        let sim = SimulatedAdapter::new([
            peripheral("late", "late").appears_after(Duration::from_secs(3)),
            peripheral("early", "early").appears_after(Duration::from_secs(1)),
        ]);

        let mut rx = sim.scan(&ScanFilter::any()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id.as_str(), "early");
        assert_eq!(rx.recv().await.unwrap().id.as_str(), "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_peripheral_reassembles_transfers() {
        let sim = SimulatedAdapter::new([peripheral("a", "x")]);
        let handle = sim.connect(&PeripheralId::new("a").unwrap()).await.unwrap();
        let codec = FrameCodec::new(18).unwrap();

        for frame in codec.encode(b"ABCDEFGHIJKLMNOPQRS", Command::Enroll).unwrap() {
            sim.write(handle, COMMAND_CHAR_UUID, frame.as_bytes()).await.unwrap();
        }

        assert_eq!(
            sim.transfers(),
            vec![ReceivedTransfer {
                characteristic: COMMAND_CHAR_UUID,
                command: 0x01,
                payload: Bytes::from_static(b"ABCDEFGHIJKLMNOPQRS"),
            }]
        );
        assert_eq!(sim.written().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_sends_noise_first() {
        let sim = SimulatedAdapter::new([peripheral("a", "x")
            .replying(Reply::Reject)
            .with_noise(vec![0x01, 0x02])]);
        let handle = sim.connect(&PeripheralId::new("a").unwrap()).await.unwrap();
        let mut results = sim.subscribe(handle, RESULT_CHAR_UUID).await.unwrap();

        sim.write(handle, COMMAND_CHAR_UUID, Frame::trigger(Command::Enroll).as_bytes())
            .await
            .unwrap();

        assert_eq!(results.recv().await, Some(Bytes::from_static(&[0x01, 0x02])));
        assert_eq!(results.recv().await, Some(Bytes::from_static(&[0xAA, 0xF1, 0xBB])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_link_ends_subscription() {
        let sim = SimulatedAdapter::new([peripheral("a", "x")]);
        let handle = sim.connect(&PeripheralId::new("a").unwrap()).await.unwrap();
        let mut results = sim.subscribe(handle, RESULT_CHAR_UUID).await.unwrap();

        sim.drop_link();

        assert_eq!(results.recv().await, None);
        assert_eq!(
            sim.write(handle, COMMAND_CHAR_UUID, &[0xBB, 0, 0]).await,
            Err(TransportError::LinkLost)
        );
    }

    #[test]
    fn test_reply_codes() {
        let p = peripheral("a", "x");
        assert_eq!(p.reply_code(0x01), Some(ResultCode::EnrollOk));
        assert_eq!(p.clone().replying(Reply::Reject).reply_code(0x02), Some(ResultCode::AuthFail));
        assert_eq!(p.clone().replying(Reply::Silent).reply_code(0x01), None);
        assert_eq!(
            p.replying(Reply::Code(ResultCode::Unknown(0x33))).reply_code(0x01),
            Some(ResultCode::Unknown(0x33))
        );
    }
}
