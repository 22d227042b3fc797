//! Example: Poll the panel in the background and print sensor changes.

use std::collections::HashMap;
use std::time::Duration;

use isec_bridge::{IsecPanel, PanelConfig, PanelEvent, Sensor, SensorValue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PanelConfig::builder()
        .host("192.168.1.100")
        .password("123456")
        .poll_interval(Duration::from_secs(5))
        .build();

    let panel = IsecPanel::start(config)?;
    let mut events = panel.subscribe();
    let mut last: HashMap<Sensor, SensorValue> = HashMap::new();

    println!("Watching sensors (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(PanelEvent::SnapshotUpdated) => {
                        let Some(snapshot) = panel.snapshot() else { continue };
                        for sensor in Sensor::catalogue(&snapshot) {
                            let value = sensor.project(&snapshot);
                            if last.get(&sensor) != Some(&value) {
                                println!("{} = {:?}", sensor, value);
                                last.insert(sensor, value);
                            }
                        }
                    }
                    Ok(PanelEvent::UpdateFailed { message }) => {
                        println!("Update failed: {}", message);
                    }
                    Ok(PanelEvent::Shutdown) => break,
                    Ok(event) => {
                        println!("Event: {:?}", event);
                    }
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
        }
    }

    panel.shutdown().await;
    Ok(())
}
