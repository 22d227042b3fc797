// MIT License - Copyright (c) 2021 TJForc
// Panel status decoding

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{MODEL_AMT_8000, status_layout};
use crate::devices::zone::{ZoneBitmap, ZoneState};

bitflags! {
    /// Flags carried by the general status byte.
    ///
    /// Bits 5-6 hold the arming mode and are decoded separately by
    /// [`ArmedState::from_general_byte`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeneralFlags: u8 {
        /// Siren sounding
        const SIREN        = 0x02;
        /// All zones closed
        const ZONES_CLOSED = 0x04;
        /// Zones firing
        const ZONES_FIRING = 0x08;
    }
}

/// Arming mode reported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmedState {
    Disarmed,
    /// Partial (stay/home) arm
    ArmedHome,
    ArmedAway,
    Unknown,
}

impl ArmedState {
    /// Decode bits 5-6 of the general status byte.
    pub fn from_general_byte(byte: u8) -> Self {
        match (byte >> 5) & 0x03 {
            0x00 => Self::Disarmed,
            0x01 => Self::ArmedHome,
            0x03 => Self::ArmedAway,
            other => {
                debug!("Unknown arming status code: {:#04x}", other);
                Self::Unknown
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarmed => "disarmed",
            Self::ArmedHome => "armed_home",
            Self::ArmedAway => "armed_away",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::ArmedHome | Self::ArmedAway)
    }
}

impl fmt::Display for ArmedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backup battery level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryStatus {
    Full,
    Middle,
    Low,
    Dead,
    Unknown,
}

impl BatteryStatus {
    /// Decode the battery byte of the status payload.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Dead,
            0x02 => Self::Low,
            0x03 => Self::Middle,
            0x04 => Self::Full,
            other => {
                debug!("Unknown battery status code: {:#04x}", other);
                Self::Unknown
            }
        }
    }

    /// Parse a battery status string; unrecognised values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Self::Full,
            "middle" => Self::Middle,
            "low" => Self::Low,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Middle => "middle",
            Self::Low => "low",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }

    /// Position on a strictly decreasing scale, `None` when unknown.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            Self::Full => Some(4),
            Self::Middle => Some(3),
            Self::Low => Some(2),
            Self::Dead => Some(1),
            Self::Unknown => None,
        }
    }

    /// Approximate charge in percent, `None` when unknown.
    pub fn percentage(&self) -> Option<u8> {
        match self {
            Self::Full => Some(100),
            Self::Middle => Some(60),
            Self::Low => Some(20),
            Self::Dead => Some(0),
            Self::Unknown => None,
        }
    }
}

impl FromStr for BatteryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded snapshot of one status response.
///
/// Constructed fresh on every status request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelStatus {
    pub model: String,
    pub version: String,
    pub armed_state: ArmedState,
    pub siren: bool,
    pub tamper: bool,
    pub battery: BatteryStatus,
    pub zones: ZoneBitmap,
    pub zones_firing: bool,
    pub zones_closed: bool,
}

impl PanelStatus {
    /// Decode a status reply payload.
    ///
    /// Each field falls back to its unknown/false default when the payload
    /// is too short to contain it.
    pub fn decode(payload: &[u8]) -> Self {
        let model = match payload.get(status_layout::MODEL) {
            Some(&MODEL_AMT_8000) => "AMT-8000".to_string(),
            _ => "Unknown".to_string(),
        };

        let version = match payload.get(status_layout::VERSION..status_layout::VERSION + 3) {
            Some(v) => format!("{}.{}.{}", v[0], v[1], v[2]),
            None => "Unknown".to_string(),
        };

        let (armed_state, flags) = match payload.get(status_layout::GENERAL) {
            Some(&byte) => (
                ArmedState::from_general_byte(byte),
                GeneralFlags::from_bits_truncate(byte),
            ),
            None => {
                debug!("Payload too short for general status. Length: {}", payload.len());
                (ArmedState::Unknown, GeneralFlags::empty())
            }
        };

        let tamper = match payload.get(status_layout::TAMPER) {
            Some(&byte) => byte & status_layout::TAMPER_MASK != 0,
            None => {
                debug!("Payload too short for tamper status. Length: {}", payload.len());
                false
            }
        };

        let battery = match payload.get(status_layout::BATTERY) {
            Some(&byte) => BatteryStatus::from_code(byte),
            None => {
                debug!("Payload too short for battery status. Length: {}", payload.len());
                BatteryStatus::Unknown
            }
        };

        let zones = ZoneBitmap::from_bytes(payload.get(status_layout::ZONES..).unwrap_or(&[]));

        Self {
            model,
            version,
            armed_state,
            siren: flags.contains(GeneralFlags::SIREN),
            tamper,
            battery,
            zones,
            zones_firing: flags.contains(GeneralFlags::ZONES_FIRING),
            zones_closed: flags.contains(GeneralFlags::ZONES_CLOSED),
        }
    }

    /// State of a zone according to the raw bitmap (unfiltered).
    pub fn zone_state(&self, zone: u32) -> ZoneState {
        if self.zones.is_set(zone) {
            ZoneState::Open
        } else {
            ZoneState::Closed
        }
    }
}
