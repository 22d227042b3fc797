//! Example: Arm and disarm every partition through the panel worker.

use isec_bridge::{IsecPanel, PanelConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PanelConfig::builder()
        .host("192.168.1.100")
        .password("123456")
        .build();

    let panel = IsecPanel::start(config)?;
    let snapshot = panel.refresh().await?;
    println!("Current state: {}", snapshot.armed_state);

    // Partition 0 addresses all partitions
    println!("\nArming all partitions...");
    match panel.arm_and_verify(0).await {
        Ok(outcome) if outcome.accepted => println!("Armed ({})", outcome.token),
        Ok(outcome) => println!("Arm command not accepted ({})", outcome.token),
        Err(e) => println!("Error arming: {}", e),
    }
    if let Some(snapshot) = panel.snapshot() {
        println!("Panel now reports: {}", snapshot.armed_state);
    }

    // Wait a bit then disarm
    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

    println!("\nDisarming all partitions...");
    match panel.disarm_and_verify(0).await {
        Ok(outcome) if outcome.accepted => println!("Disarmed ({})", outcome.token),
        Ok(outcome) => println!("Disarm command not accepted ({})", outcome.token),
        Err(e) => println!("Error disarming: {}", e),
    }

    panel.shutdown().await;
    Ok(())
}
