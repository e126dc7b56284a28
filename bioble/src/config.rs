//! Device configuration

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use bioble_core::constants::{
    gatt::BIOMETRIC_SERVICE_UUID, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DEVICE_NAME,
    DEFAULT_RESULT_TIMEOUT, DEFAULT_SCAN_WINDOW, DEFAULT_WRITE_BUDGET,
};
use bioble_core::FrameCodec;
use bioble_transport::ChannelLayout;
use bioble_types::LogLevel;

/// Default capacity of the [`EventLog`](crate::EventLog)
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 256;

/// Settings for a [`BiometricDevice`](crate::BiometricDevice)
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bioble::DeviceConfig;
///
/// let config = DeviceConfig::default()
///     .with_device_name("Bench rig")
///     .with_result_timeout(Duration::from_secs(3));
///
/// assert_eq!(config.device_name, "Bench rig");
/// assert_eq!(config.codec().unwrap().max_chunk(), 18);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Advertised name to match exactly
    pub device_name: String,

    /// Service the peripheral must advertise, if any
    pub service_filter: Option<Uuid>,

    pub scan_window: Duration,
    pub connect_timeout: Duration,

    /// Bounded wait for the RESULT notification
    pub result_timeout: Duration,

    /// Link write size; two bytes go to framing
    pub write_budget: usize,

    pub layout: ChannelLayout,
    pub event_log_capacity: usize,

    /// Events below this level are not delivered to the event sink
    pub min_log_level: LogLevel,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            service_filter: Some(BIOMETRIC_SERVICE_UUID),
            scan_window: DEFAULT_SCAN_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            result_timeout: DEFAULT_RESULT_TIMEOUT,
            write_budget: DEFAULT_WRITE_BUDGET,
            layout: ChannelLayout::default(),
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            min_log_level: LogLevel::Debug,
        }
    }
}

impl DeviceConfig {
    /// Defaults overridden from `BIOBLE_*` environment variables
    ///
    /// Reads `BIOBLE_DEVICE_NAME`, `BIOBLE_SCAN_WINDOW_SECS`,
    /// `BIOBLE_RESULT_TIMEOUT_SECS` and `BIOBLE_LOG_LEVEL`. Unparseable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("BIOBLE_DEVICE_NAME").filter(|n| !n.is_empty()) {
            config.device_name = name;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "BIOBLE_SCAN_WINDOW_SECS") {
            config.scan_window = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "BIOBLE_RESULT_TIMEOUT_SECS") {
            config.result_timeout = Duration::from_secs(secs);
        }
        if let Some(level) = parse_var::<LogLevel>(&lookup, "BIOBLE_LOG_LEVEL") {
            config.min_log_level = level;
        }

        config
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the required service, or `None` to match on name only
    pub fn with_service_filter(mut self, service: Option<Uuid>) -> Self {
        self.service_filter = service;
        self
    }

    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn with_write_budget(mut self, budget: usize) -> Self {
        self.write_budget = budget;
        self
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }

    pub fn with_min_log_level(mut self, level: LogLevel) -> Self {
        self.min_log_level = level;
        self
    }

    /// Codec sized to the write budget
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMaxChunk` if the budget leaves no room for payload.
    pub fn codec(&self) -> bioble_core::Result<FrameCodec> {
        FrameCodec::from_write_budget(self.write_budget)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;

    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();

        assert_eq!(config.device_name, "BiometricAuthDevice");
        assert_eq!(config.service_filter, Some(BIOMETRIC_SERVICE_UUID));
        assert_eq!(config.scan_window, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.result_timeout, Duration::from_secs(10));
        assert_eq!(config.layout, ChannelLayout::Shared);
        assert_eq!(config.event_log_capacity, 256);
        assert_eq!(config.codec().unwrap().max_chunk(), 18);
    }

    #[test]
    fn test_from_lookup() {
        let config = DeviceConfig::from_lookup(lookup(&[
            ("BIOBLE_DEVICE_NAME", "Lab Unit"),
            ("BIOBLE_SCAN_WINDOW_SECS", "3"),
            ("BIOBLE_RESULT_TIMEOUT_SECS", " 20 "),
            ("BIOBLE_LOG_LEVEL", "warn"),
        ]));

        assert_eq!(config.device_name, "Lab Unit");
        assert_eq!(config.scan_window, Duration::from_secs(3));
        assert_eq!(config.result_timeout, Duration::from_secs(20));
        assert_eq!(config.min_log_level, LogLevel::Warn);
    }

    #[test]
    fn test_from_lookup_ignores_bad_values() {
        let config = DeviceConfig::from_lookup(lookup(&[
            ("BIOBLE_DEVICE_NAME", ""),
            ("BIOBLE_SCAN_WINDOW_SECS", "soon"),
            ("BIOBLE_LOG_LEVEL", "loud"),
        ]));

        assert_eq!(config, DeviceConfig::default());
    }

    #[test]
    fn test_write_budget_too_small() {
        let config = DeviceConfig::default().with_write_budget(2);
        assert_eq!(config.codec(), Err(bioble_core::Error::InvalidMaxChunk(0)));
    }
}
