//! Observer interface for log events and session outcomes

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use bioble_core::ResultCode;
use bioble_types::{LogEvent, LogLevel};

use crate::error::SessionError;

/// What a session reports when it ends
pub type SessionOutcome = std::result::Result<ResultCode, SessionError>;

/// Receives observability events from the session layer
///
/// `on_session_complete` fires exactly once per session start, including
/// starts that are rejected up front.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Called on every state transition and error
    fn on_log_event(&self, event: &LogEvent);

    /// Called once when a session ends, however it ends
    fn on_session_complete(&self, outcome: &SessionOutcome);
}

/// Bounded in-memory [`EventSink`]
///
/// Keeps the most recent `capacity` events and outcomes, evicting the oldest.
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    capacity: usize,
    events: parking_lot::Mutex<VecDeque<LogEvent>>,
    outcomes: parking_lot::Mutex<VecDeque<SessionOutcome>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                capacity,
                events: parking_lot::Mutex::new(VecDeque::with_capacity(capacity)),
                outcomes: parking_lot::Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Snapshot of the retained events, oldest first
    pub fn events(&self) -> Vec<LogEvent> {
        self.inner.events.lock().iter().cloned().collect()
    }

    /// Snapshot of the retained session outcomes, oldest first
    pub fn outcomes(&self) -> Vec<SessionOutcome> {
        self.inner.outcomes.lock().iter().cloned().collect()
    }

    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.inner.outcomes.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.events.lock().clear();
        self.inner.outcomes.lock().clear();
    }

    fn push_bounded<T>(&self, queue: &mut VecDeque<T>, item: T) {
        if self.inner.capacity == 0 {
            return;
        }
        if queue.len() == self.inner.capacity {
            queue.pop_front();
        }
        queue.push_back(item);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventSink for EventLog {
    fn on_log_event(&self, event: &LogEvent) {
        let mut events = self.inner.events.lock();
        self.push_bounded(&mut events, event.clone());
    }

    fn on_session_complete(&self, outcome: &SessionOutcome) {
        let mut outcomes = self.inner.outcomes.lock();
        self.push_bounded(&mut outcomes, outcome.clone());
    }
}

/// Forwards every event to several sinks in order
#[derive(Clone, Default)]
pub struct EventFanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for EventFanout {
    fn on_log_event(&self, event: &LogEvent) {
        for sink in &self.sinks {
            sink.on_log_event(event);
        }
    }

    fn on_session_complete(&self, outcome: &SessionOutcome) {
        for sink in &self.sinks {
            sink.on_session_complete(outcome);
        }
    }
}

/// Mirrors events to `tracing` and hands them to the sink
#[derive(Clone)]
pub(crate) struct Emitter {
    sink: Arc<dyn EventSink>,
    min_level: LogLevel,
}

impl Emitter {
    pub(crate) fn new(sink: Arc<dyn EventSink>, min_level: LogLevel) -> Self {
        Self { sink, min_level }
    }

    pub(crate) fn with_min_level(self, min_level: LogLevel) -> Self {
        Self { min_level, ..self }
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        let event = LogEvent::new(level, message);

        match level {
            LogLevel::Debug => debug!("{}", event.message),
            LogLevel::Info => info!("{}", event.message),
            LogLevel::Warn => warn!("{}", event.message),
            LogLevel::Error => error!("{}", event.message),
        }

        if level >= self.min_level {
            self.sink.on_log_event(&event);
        }
    }

    pub(crate) fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub(crate) fn complete(&self, outcome: &SessionOutcome) {
        self.sink.on_session_complete(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_log_evicts_oldest() {
        let log = EventLog::new(2);

        log.on_log_event(&LogEvent::info("one"));
        log.on_log_event(&LogEvent::info("two"));
        log.on_log_event(&LogEvent::info("three"));

        let messages: Vec<String> = log.events().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_event_log_outcomes() {
        let log = EventLog::default();
        assert_eq!(log.capacity(), 256);
        assert!(log.last_outcome().is_none());

        log.on_session_complete(&Ok(ResultCode::AuthOk));
        log.on_session_complete(&Err(SessionError::Timeout));

        assert_eq!(log.outcomes().len(), 2);
        assert_eq!(log.last_outcome(), Some(Err(SessionError::Timeout)));

        log.clear();
        assert!(log.is_empty());
        assert!(log.outcomes().is_empty());
    }

    #[test]
    fn test_event_log_zero_capacity() {
        let log = EventLog::new(0);
        log.on_log_event(&LogEvent::info("dropped"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_emitter_filters_by_level() {
        let mut sink = MockEventSink::new();
        sink.expect_on_log_event()
            .withf(|e| e.level == LogLevel::Warn && e.message == "kept")
            .times(1)
            .return_const(());

        let emitter = Emitter::new(Arc::new(sink), LogLevel::Warn);
        emitter.debug("dropped");
        emitter.info("dropped");
        emitter.warn("kept");
    }

    #[test]
    fn test_emitter_complete() {
        let mut sink = MockEventSink::new();
        sink.expect_on_session_complete()
            .with(eq(Ok(ResultCode::EnrollOk)))
            .times(1)
            .return_const(());

        Emitter::new(Arc::new(sink), LogLevel::Debug).complete(&Ok(ResultCode::EnrollOk));
    }

    #[test]
    fn test_fanout() {
        let first = EventLog::new(4);
        let second = EventLog::new(4);
        let fanout = EventFanout::new()
            .with_sink(Arc::new(first.clone()))
            .with_sink(Arc::new(second.clone()));

        fanout.on_log_event(&LogEvent::warn("both"));
        fanout.on_session_complete(&Err(SessionError::Disconnected));

        assert_eq!(first.len(), 1);
        assert_eq!(second.outcomes(), vec![Err(SessionError::Disconnected)]);
    }
}
