// MIT License - Copyright (c) 2021 TJForc
// ISEC alarm panel client and polling coordinator
//
//! # isec-bridge
//!
//! Direct TCP/IP communication with Intelbras AMT-8000 alarm panels over
//! the binary ISEC protocol.
//!
//! A single worker task owns the connection, polls the panel on a fixed
//! interval and serializes on-demand commands against those polls. State is
//! published as an immutable [`CoordinatorSnapshot`]; failures are reported
//! as [`PanelEvent::UpdateFailed`] while the last good snapshot stays
//! readable.
//!
//! ## Quick Start
//!
//! ```no_run
//! use isec_bridge::{IsecPanel, PanelConfig, Sensor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PanelConfig::builder()
//!         .host("192.168.1.100")
//!         .password("123456")
//!         .build();
//!
//!     let panel = IsecPanel::start(config)?;
//!     let snapshot = panel.refresh().await?;
//!
//!     for sensor in Sensor::catalogue(&snapshot) {
//!         println!("{}: {:?}", sensor, sensor.project(&snapshot));
//!     }
//!
//!     panel.disarm(0).await?;
//!     panel.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod devices;
pub mod error;
pub mod event;
pub mod frame;
pub mod panel;
pub mod protocol;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use client::{IsecClient, PanelClient};
pub use config::{PanelConfig, PanelConfigBuilder};
pub use coordinator::{Coordinator, CoordinatorSnapshot, PairedCache};
pub use devices::system::{ArmedState, BatteryStatus, GeneralFlags, PanelStatus};
pub use devices::zone::{PairedSensors, ZoneBitmap, ZoneState};
pub use error::{AuthRejection, ErrorKind, IsecError, Result, UpdateFailed};
pub use event::{EventReceiver, PanelEvent};
pub use frame::Frame;
pub use panel::{CommandOutcome, IsecPanel};
pub use protocol::{Command, PairedReply, PanicKind, StateToken};
pub use sensors::{AlarmState, Sensor, SensorValue, StatusSource};
