//! Bounded-time peripheral scans

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

use bioble_types::Advertisement;

/// Hint passed to the platform scanner
///
/// Platforms use it to filter in the radio stack. Callers must still check
/// every advertisement themselves; not every stack honours the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub services: Vec<Uuid>,
}

impl ScanFilter {
    /// Accept every advertisement
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    pub fn accepts(&self, advertisement: &Advertisement) -> bool {
        self.services.is_empty() || self.services.iter().any(|s| advertisement.advertises(s))
    }
}

/// A running scan
///
/// Yields advertisements until the deadline passes. Once expired it stays
/// expired; start a new scan for a fresh window. Dropping the scan stops the
/// platform scanner.
#[derive(Debug)]
pub struct Scan {
    rx: mpsc::Receiver<Advertisement>,
    deadline: Instant,
    expired: bool,
    seen: usize,
}

impl Scan {
    pub fn new(rx: mpsc::Receiver<Advertisement>, window: Duration) -> Self {
        Self {
            rx,
            deadline: Instant::now() + window,
            expired: false,
            seen: 0,
        }
    }

    /// Next advertisement, or `None` once the window has elapsed
    pub async fn next(&mut self) -> Option<Advertisement> {
        if self.expired {
            return None;
        }

        match timeout_at(self.deadline, self.rx.recv()).await {
            Ok(Some(advertisement)) => {
                self.seen += 1;
                trace!("Scan saw {}", advertisement);
                Some(advertisement)
            }
            Ok(None) | Err(_) => {
                debug!("Scan finished after {} advertisements", self.seen);
                self.expire();
                None
            }
        }
    }

    /// Stop scanning now
    pub fn stop(&mut self) {
        if !self.expired {
            debug!("Scan stopped after {} advertisements", self.seen);
            self.expire();
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    fn expire(&mut self) {
        self.expired = true;
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioble_types::PeripheralId;

    fn ad(name: &str) -> Advertisement {
        Advertisement::new(PeripheralId::new(name).unwrap(), name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_expires_and_stays_expired() {
        let (tx, rx) = mpsc::channel(4);
        let mut scan = Scan::new(rx, Duration::from_secs(10));

        tx.send(ad("first")).await.unwrap();
        assert_eq!(scan.next().await.unwrap().name.as_deref(), Some("first"));

        // Nothing else arrives; the window runs out
        assert!(scan.next().await.is_none());
        assert!(scan.is_expired());

        // Not restartable, and the platform side sees the stop
        assert!(tx.send(ad("late")).await.is_err());
        assert!(scan.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_stop_closes_channel() {
        let (tx, rx) = mpsc::channel(4);
        let mut scan = Scan::new(rx, Duration::from_secs(10));

        scan.stop();

        assert!(tx.is_closed());
        assert!(scan.next().await.is_none());
    }

    #[test]
    fn test_filter_accepts() {
        let service = Uuid::from_u128(7);
        let plain = ad("x");
        let tagged = ad("y").with_service(service);

        assert!(ScanFilter::any().accepts(&plain));
        assert!(!ScanFilter::any().with_service(service).accepts(&plain));
        assert!(ScanFilter::any().with_service(service).accepts(&tagged));
    }
}
