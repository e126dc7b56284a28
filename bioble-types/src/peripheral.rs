//! Peripheral identity and advertisement data

use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Platform identifier of a BLE peripheral
///
/// On Android this is the MAC address, on iOS an opaque UUID string. The
/// transport layer never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create a peripheral id, rejecting empty or whitespace-only values
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Validation("peripheral id must not be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One advertisement seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Who sent it
    pub id: PeripheralId,

    /// Advertised local name, if any
    pub name: Option<String>,

    /// Advertised service UUIDs
    pub services: Vec<Uuid>,

    /// Received signal strength (dBm)
    pub rssi: i16,
}

impl Advertisement {
    pub fn new(id: PeripheralId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            services: Vec::new(),
            rssi: -60,
        }
    }

    /// Add an advertised service
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    /// Set the signal strength
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Whether `service` is among the advertised services
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.services.contains(service)
    }

    /// Exact, case-sensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] rssi={}dBm",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.id,
            self.rssi
        )
    }
}
