//! Enroll then authenticate against a simulated peripheral

use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use bioble::transport::{SimulatedAdapter, SimulatedPeripheral};
use bioble::{BiometricDevice, BiometricPayloads, DeviceConfig, PeripheralId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (RUST_LOG=bioble=trace shows every frame)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DeviceConfig::from_env();

    let peripheral = SimulatedPeripheral::new(PeripheralId::new("C0:FF:EE:00:00:01")?, &config.device_name)
        .appears_after(Duration::from_millis(600))
        .with_reply_delay(Duration::from_millis(800));
    let device = BiometricDevice::new(SimulatedAdapter::new([peripheral]), config)?;

    // Discover and connect
    let peripheral = device.connect().await.context("connecting to peripheral")?;
    println!("✓ Connected to {}", peripheral);

    let payloads = BiometricPayloads::new(
        vec![0x5A; 64],
        b"voice sample".to_vec(),
        b"swipe-left".to_vec(),
    );

    let enrolled = device.enroll(payloads.clone()).await?;
    println!("✓ Enroll: {}", enrolled);

    let authenticated = device.authenticate(payloads).await?;
    println!("✓ Authenticate: {}", authenticated);

    device.disconnect().await;
    println!("✓ Disconnected");

    for event in device.events().events() {
        println!("  {}", event);
    }

    Ok(())
}
