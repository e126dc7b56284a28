//! Disconnecting cancels a session that is waiting for its result

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use bioble::transport::{SimulatedAdapter, SimulatedPeripheral};
use bioble::{BiometricDevice, BiometricPayloads, DeviceConfig, PeripheralId, SessionPhase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    // The peripheral takes far longer to answer than we are willing to wait
    let peripheral = SimulatedPeripheral::new(PeripheralId::new("C0:FF:EE:00:00:02")?, "BiometricAuthDevice")
        .with_reply_delay(Duration::from_secs(30));
    let device = Arc::new(BiometricDevice::new(
        SimulatedAdapter::new([peripheral]),
        DeviceConfig::default(),
    )?);

    device.connect().await?;

    let session = tokio::spawn({
        let device = device.clone();
        async move { device.authenticate(BiometricPayloads::new("face", "voice", "gesture")).await }
    });

    while device.session_phase() != SessionPhase::AwaitingResult {
        sleep(Duration::from_millis(10)).await;
    }
    println!("Session is waiting for a result; disconnecting...");

    device.disconnect().await;

    match session.await? {
        Ok(code) => println!("Unexpected result: {}", code),
        Err(e) => println!("✓ Session ended: {}", e),
    }

    Ok(())
}
