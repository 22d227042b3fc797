//! Example: Connect to an AMT-8000, run one poll and print the snapshot.

use isec_bridge::{AlarmState, Coordinator, IsecClient, PanelConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PanelConfig::builder()
        .host("192.168.1.100")
        .port(9009)
        .password("123456")
        .build();
    config.validate()?;

    println!("Connecting to panel at {}...", config.address());
    let mut coordinator = Coordinator::new(IsecClient::new(&config), config.password.clone());
    let snapshot = coordinator.poll().await?;

    println!("Model:    {} (firmware {})", snapshot.model, snapshot.version);
    println!("State:    {}", AlarmState::from_snapshot(&snapshot));
    println!("Siren:    {}", snapshot.siren);
    println!("Tamper:   {}", snapshot.tamper);
    println!("Battery:  {}", snapshot.battery_status);

    println!("\n--- Zones ({}) ---", snapshot.zones.len());
    for (zone, state) in &snapshot.zones {
        println!("  Zone {:2}: {}", zone, state.as_str());
    }

    println!("\nJSON: {}", serde_json::to_string_pretty(&snapshot)?);

    coordinator.close().await;
    Ok(())
}
