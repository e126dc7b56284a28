//! Peripheral discovery

use std::time::Duration;

use tracing::{debug, info, trace};
use uuid::Uuid;

use bioble_transport::{ScanFilter, Transport};
use bioble_types::PeripheralId;

use crate::error::DiscoveryError;

/// Finds the peripheral to connect to
///
/// Matching rule: the first advertisement whose name equals the wanted name
/// exactly (case-sensitive) and, when a service filter is given, that
/// advertises the service. There is no ranking between simultaneous matches.
#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    transport: Transport,
}

impl DeviceDirectory {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Scan for up to `window` and return the first match
    ///
    /// The scan stops as soon as a match is seen. Every call starts a fresh
    /// scan window.
    ///
    /// # Errors
    ///
    /// - `DiscoveryError::NotFound` if the window elapses with no match
    /// - `DiscoveryError::Scan` if the adapter cannot scan
    pub async fn discover(
        &self,
        name: &str,
        service: Option<Uuid>,
        window: Duration,
    ) -> Result<PeripheralId, DiscoveryError> {
        let filter = match service {
            Some(service) => ScanFilter::any().with_service(service),
            None => ScanFilter::any(),
        };

        info!("Discovering {:?} for up to {:?}...", name, window);

        let mut scan = self.transport.scan(&filter, window).await?;

        while let Some(advertisement) = scan.next().await {
            let wanted = advertisement.is_named(name)
                && service.is_none_or(|s| advertisement.advertises(&s));

            if wanted {
                scan.stop();
                info!("Found {}", advertisement);
                return Ok(advertisement.id);
            }
            trace!("Skipping {}", advertisement);
        }

        debug!("No {:?} within {:?}", name, window);
        Err(DiscoveryError::NotFound {
            name: name.to_string(),
            window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioble_core::constants::gatt::BIOMETRIC_SERVICE_UUID;
    use bioble_transport::{SimulatedAdapter, SimulatedPeripheral, TransportError};
    use bioble_types::Advertisement;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    const NAME: &str = "BiometricAuthDevice";

    fn peripheral(id: &str, name: &str, after_ms: u64) -> SimulatedPeripheral {
        SimulatedPeripheral::new(PeripheralId::new(id).unwrap(), name)
            .appears_after(Duration::from_millis(after_ms))
    }

    fn directory(peripherals: Vec<SimulatedPeripheral>) -> (SimulatedAdapter, DeviceDirectory) {
        let sim = SimulatedAdapter::new(peripherals);
        let directory = DeviceDirectory::new(Transport::new(sim.clone()));
        (sim, directory)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_match_returns_before_window() {
        let (_, directory) = directory(vec![
            peripheral("other", "Headphones", 100),
            peripheral("first", NAME, 2_000),
            peripheral("second", NAME, 3_000),
        ]);
        let started = Instant::now();

        let found = directory
            .discover(NAME, Some(BIOMETRIC_SERVICE_UUID), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(found.as_str(), "first");
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_after_window() {
        let (_, directory) = directory(vec![
            peripheral("other", "Headphones", 100),
            peripheral("late", NAME, 15_000),
        ]);
        let started = Instant::now();

        let result = directory.discover(NAME, None, Duration::from_secs(10)).await;

        assert_eq!(
            result,
            Err(DiscoveryError::NotFound {
                name: NAME.into(),
                window: Duration::from_secs(10),
            })
        );
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_match_is_case_sensitive() {
        let (_, directory) = directory(vec![peripheral("lower", "biometricauthdevice", 100)]);

        let result = directory.discover(NAME, None, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DiscoveryError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_filter() {
        let bare = Advertisement::new(PeripheralId::new("bare").unwrap(), NAME);
        let (_, directory) = directory(vec![
            peripheral("bare", NAME, 100).with_advertisement(bare),
            peripheral("full", NAME, 500),
        ]);

        let found = directory
            .discover(NAME, Some(BIOMETRIC_SERVICE_UUID), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found.as_str(), "full");

        let found = directory.discover(NAME, None, Duration::from_secs(5)).await.unwrap();
        assert_eq!(found.as_str(), "bare");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_is_reinvocable() {
        let (sim, directory) = directory(vec![peripheral("dev", NAME, 100)]);

        sim.set_powered(false);
        let result = directory.discover(NAME, None, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(DiscoveryError::Scan(TransportError::AdapterUnavailable(_)))
        ));

        sim.set_powered(true);
        let found = directory.discover(NAME, None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(found.as_str(), "dev");
    }
    #[tokio::test(start_paused = true)]
    async fn test_discover_after_not_found_gets_fresh_window() {
        let (_, directory) = directory(vec![peripheral("late", NAME, 1_500)]);

        let started = Instant::now();
        let result = directory.discover(NAME, None, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DiscoveryError::NotFound { .. })));
        assert!(started.elapsed() >= Duration::from_secs(1));

        let retried = Instant::now();
        let found = directory.discover(NAME, None, Duration::from_secs(2)).await.unwrap();
        assert_eq!(found.as_str(), "late");

        let elapsed = retried.elapsed();
        assert!(elapsed >= Duration::from_millis(1_500));
        assert!(elapsed < Duration::from_secs(2));
    }
}
