//! Session phase tracking
//!
//! A session is one enroll or authenticate exchange. The tracker enforces:
//! - at most one active session per connection
//! - the phase transition table
//! - release of the session lock when the session ends, however it ends

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::command::{Command, ResultCode};
use crate::error::{Error, Result};

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session; a new one may start
    Idle,

    /// Writing data frames
    Transmitting {
        channel_index: usize,
        frame_index: usize,
    },

    /// Trigger frame written
    TriggerSent,

    /// Waiting for the RESULT notification
    AwaitingResult,

    /// Peripheral reported a result
    Completed(ResultCode),

    /// No result before the deadline
    TimedOut,

    /// Write failure or connection drop
    Aborted,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed(_) | Self::TimedOut | Self::Aborted)
    }

    fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;

        match (self, next) {
            (Transmitting { .. }, Transmitting { .. } | TriggerSent | Aborted) => true,
            (TriggerSent, AwaitingResult | Aborted) => true,
            (AwaitingResult, Completed(_) | TimedOut | Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Transmitting { channel_index, frame_index } => {
                write!(f, "Transmitting(channel={}, frame={})", channel_index, frame_index)
            }
            Self::TriggerSent => f.write_str("TriggerSent"),
            Self::AwaitingResult => f.write_str("AwaitingResult"),
            Self::Completed(code) => write!(f, "Completed({})", code),
            Self::TimedOut => f.write_str("TimedOut"),
            Self::Aborted => f.write_str("Aborted"),
        }
    }
}

/// Shared session tracker
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct SessionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    /// Identifier handed to the next session (starts at 1)
    next_id: AtomicU64,

    state: parking_lot::RwLock<TrackerState>,
}

#[derive(Debug)]
struct TrackerState {
    phase: SessionPhase,
    command: Option<Command>,
    id: u64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                next_id: AtomicU64::new(1),
                state: parking_lot::RwLock::new(TrackerState {
                    phase: SessionPhase::Idle,
                    command: None,
                    id: 0,
                }),
            }),
        }
    }

    /// Get current phase
    pub fn phase(&self) -> SessionPhase {
        self.inner.state.read().phase
    }

    /// Command of the active session, if any
    pub fn command(&self) -> Option<Command> {
        self.inner.state.read().command
    }

    /// Check if a session holds the lock
    pub fn is_active(&self) -> bool {
        self.phase() != SessionPhase::Idle
    }

    /// Claim the session lock and enter `Transmitting`
    ///
    /// Fails immediately with `Error::SessionInProgress` when another session
    /// is active; requests are never queued.
    pub fn begin(&self, command: Command) -> Result<ActiveSession> {
        let mut state = self.inner.state.write();

        if state.phase != SessionPhase::Idle {
            return Err(Error::SessionInProgress);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        state.phase = SessionPhase::Transmitting {
            channel_index: 0,
            frame_index: 0,
        };
        state.command = Some(command);
        state.id = id;

        Ok(ActiveSession {
            tracker: self.clone(),
            id,
        })
    }

    fn advance(&self, id: u64, next: SessionPhase) -> Result<()> {
        let mut state = self.inner.state.write();

        if state.id != id || !state.phase.can_advance_to(next) {
            return Err(Error::InvalidSessionState(format!(
                "Cannot move session {} from {} to {}",
                id, state.phase, next
            )));
        }

        state.phase = next;
        Ok(())
    }

    fn release(&self, id: u64) {
        let mut state = self.inner.state.write();

        if state.id == id {
            state.phase = SessionPhase::Idle;
            state.command = None;
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The session lock, held for the lifetime of one session
///
/// Dropping it returns the tracker to `Idle`, including when the owning
/// future is cancelled mid-flight.
#[derive(Debug)]
pub struct ActiveSession {
    tracker: SessionTracker,
    id: u64,
}

impl ActiveSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.tracker.phase()
    }

    /// Move to `next`, enforcing the transition table
    pub fn advance(&self, next: SessionPhase) -> Result<()> {
        self.tracker.advance(self.id, next)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}
