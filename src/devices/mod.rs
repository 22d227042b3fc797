// MIT License - Copyright (c) 2021 TJForc
// Decoded panel state

pub mod system;
pub mod zone;

pub use system::{ArmedState, BatteryStatus, GeneralFlags, PanelStatus};
pub use zone::{PairedSensors, ZoneBitmap, ZoneState};
