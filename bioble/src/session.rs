//! Enroll/authenticate session orchestration
//!
//! One session runs end to end inside [`SessionStateMachine::start`]:
//!
//! ```text
//! Idle ─► Transmitting ─► TriggerSent ─► AwaitingResult ─┬─► Completed(code)
//!              │               │               │          ├─► TimedOut
//!              └───────────────┴───────────────┴─────────►└─► Aborted
//! ```
//!
//! A connection drop preempts every phase. Terminal phases release the
//! one-session lock, returning the machine to `Idle`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};

use bioble_core::constants::DEFAULT_RESULT_TIMEOUT;
use bioble_core::{
    decode_notification, ActiveSession, Channel, Command, Frame, FrameCodec, ResultCode,
    SessionPhase, SessionTracker,
};
use bioble_transport::{ConnectionStatus, Transport, TransportError};
use bioble_types::LogLevel;

use crate::error::SessionError;
use crate::events::{Emitter, EventSink, SessionOutcome};

/// Drives enroll and authenticate exchanges over a [`Transport`]
///
/// Cheap to clone; clones share the one-session lock, so a second `start`
/// on any clone is rejected while a session is active.
#[derive(Clone)]
pub struct SessionStateMachine {
    transport: Transport,
    codec: FrameCodec,
    tracker: SessionTracker,
    events: Emitter,
    result_timeout: Duration,
}

impl SessionStateMachine {
    pub fn new(transport: Transport, codec: FrameCodec, sink: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            codec,
            tracker: SessionTracker::new(),
            events: Emitter::new(sink, LogLevel::Debug),
            result_timeout: DEFAULT_RESULT_TIMEOUT,
        }
    }

    /// Set the bounded wait for the result notification
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    /// Drop events below `level` before they reach the sink
    pub fn with_min_log_level(mut self, level: LogLevel) -> Self {
        self.events = self.events.with_min_level(level);
        self
    }

    pub fn result_timeout(&self) -> Duration {
        self.result_timeout
    }

    pub fn phase(&self) -> SessionPhase {
        self.tracker.phase()
    }

    /// Check if a session holds the lock
    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Run one session to completion
    ///
    /// `payloads` are sent in order, each channel's frames strictly one after
    /// the other, followed by the trigger. Device-reported failures come back
    /// as `Ok(ResultCode::EnrollFail)` / `Ok(ResultCode::AuthFail)`.
    ///
    /// The outcome is also reported to the sink's `on_session_complete`,
    /// exactly once per call. Dropping the returned future abandons the
    /// session and releases the lock without reporting an outcome.
    ///
    /// # Errors
    ///
    /// - `NotReady` if not connected or not listening for results
    /// - `AlreadyInProgress` if another session is active (never queued)
    /// - `InvalidChannel` for a payload on a non-data channel
    /// - `Frame` if a payload cannot be framed
    /// - `Write` if a write is rejected; the connection stays open
    /// - `Timeout` if no valid result arrives in time
    /// - `Disconnected` if the connection drops at any point
    pub async fn start(&self, command: Command, payloads: Vec<(Channel, Bytes)>) -> SessionOutcome {
        let outcome = self.run(command, payloads).await;

        match &outcome {
            Ok(code) => self.events.info(format!("{} finished: {}", command, code)),
            Err(e) => self.events.error(format!("{} failed: {}", command, e)),
        }
        self.events.complete(&outcome);

        outcome
    }

    async fn run(&self, command: Command, payloads: Vec<(Channel, Bytes)>) -> SessionOutcome {
        if !self.transport.is_connected() || !self.transport.is_listening() {
            return Err(SessionError::NotReady);
        }
        let session = self
            .tracker
            .begin(command)
            .map_err(|_| SessionError::AlreadyInProgress)?;

        self.events.info(format!("Session {} started: {}", session.id(), command));

        let mut status = self.transport.watch_status();
        let result = self.exchange(&session, command, payloads, &mut status).await;

        let terminal = match &result {
            Ok(code) => SessionPhase::Completed(*code),
            Err(SessionError::Timeout) => SessionPhase::TimedOut,
            Err(_) => SessionPhase::Aborted,
        };
        self.enter(&session, terminal);

        result
    }

    async fn exchange(
        &self,
        session: &ActiveSession,
        command: Command,
        payloads: Vec<(Channel, Bytes)>,
        status: &mut watch::Receiver<ConnectionStatus>,
    ) -> SessionOutcome {
        // Frame everything before the first write
        let mut encoded = Vec::with_capacity(payloads.len());
        for (channel, payload) in &payloads {
            if !channel.is_data() {
                return Err(SessionError::InvalidChannel(*channel));
            }
            let frames = self
                .codec
                .encode(payload, command)
                .map_err(SessionError::Frame)?;
            encoded.push((*channel, frames));
        }

        self.discard_stale().await;

        for (channel_index, (channel, frames)) in encoded.iter().enumerate() {
            self.events.debug(format!(
                "Sending {} frames on {}",
                frames.len(),
                channel
            ));

            for (frame_index, frame) in frames.iter().enumerate() {
                let phase = SessionPhase::Transmitting {
                    channel_index,
                    frame_index,
                };
                if let Err(e) = session.advance(phase) {
                    self.events.warn(e.to_string());
                }
                self.write(status, *channel, frame).await?;
            }
        }

        // Nothing received before the trigger can answer it
        self.discard_stale().await;
        self.write(status, Channel::Trigger, &self.codec.trigger(command))
            .await?;
        self.enter(session, SessionPhase::TriggerSent);

        self.enter(session, SessionPhase::AwaitingResult);
        self.await_result(status).await
    }

    async fn discard_stale(&self) {
        for stale in self.transport.drain_results().await {
            self.events.warn(format!(
                "Discarding stale notification {}",
                hex::encode(&stale)
            ));
        }
    }

    async fn write(
        &self,
        status: &mut watch::Receiver<ConnectionStatus>,
        channel: Channel,
        frame: &Frame,
    ) -> Result<(), SessionError> {
        tokio::select! {
            biased;

            _ = disconnected(status) => Err(SessionError::Disconnected),
            written = self.transport.write_frame(channel, frame) => match written {
                Ok(()) => Ok(()),
                Err(TransportError::LinkLost) => Err(SessionError::Disconnected),
                Err(e) => Err(SessionError::Write(e)),
            },
        }
    }

    async fn await_result(
        &self,
        status: &mut watch::Receiver<ConnectionStatus>,
    ) -> Result<ResultCode, SessionError> {
        let deadline = Instant::now() + self.result_timeout;

        loop {
            let notification = tokio::select! {
                biased;

                _ = disconnected(status) => return Err(SessionError::Disconnected),
                next = timeout_at(deadline, self.transport.next_result()) => next,
            };

            match notification {
                Err(_) => return Err(SessionError::Timeout),
                Ok(None) => {
                    // The link ended the subscription underneath us
                    self.transport.mark_link_lost();
                    return Err(SessionError::Disconnected);
                }
                Ok(Some(bytes)) => match decode_notification(&bytes) {
                    Ok(code) => return Ok(code),
                    Err(e) => self.events.warn(format!(
                        "Ignoring notification {}: {}",
                        hex::encode(&bytes),
                        e
                    )),
                },
            }
        }
    }

    fn enter(&self, session: &ActiveSession, phase: SessionPhase) {
        match session.advance(phase) {
            Ok(()) => self.events.debug(format!("Session {} -> {}", session.id(), phase)),
            Err(e) => self.events.warn(e.to_string()),
        }
    }
}

impl std::fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("phase", &self.phase())
            .field("max_chunk", &self.codec.max_chunk())
            .field("result_timeout", &self.result_timeout)
            .finish()
    }
}

/// Resolves once the connection is (or becomes) Disconnected
async fn disconnected(status: &mut watch::Receiver<ConnectionStatus>) {
    let _ = status
        .wait_for(|s| *s == ConnectionStatus::Disconnected)
        .await;
}
