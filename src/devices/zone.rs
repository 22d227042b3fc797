// MIT License - Copyright (c) 2021 TJForc
// Zone bitmaps and paired sensors

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{MAX_ZONES, ZONE_BITMAP_LEN};

/// Open/closed state of a single zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneState {
    Open,
    Closed,
}

impl ZoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-size bitmap with one bit per zone (zones are 1-indexed).
///
/// Bit `i` of byte `k` represents zone `8k + i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ZoneBitmap([u8; ZONE_BITMAP_LEN]);

impl ZoneBitmap {
    /// Build a bitmap from the bytes at the start of `data`.
    ///
    /// Missing trailing bytes leave the corresponding zones cleared.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bits = [0u8; ZONE_BITMAP_LEN];
        let n = data.len().min(ZONE_BITMAP_LEN);
        if n < ZONE_BITMAP_LEN {
            warn!(
                "Zone bitmap truncated: {} of {} bytes present, remaining zones reported clear",
                n, ZONE_BITMAP_LEN
            );
        }
        bits[..n].copy_from_slice(&data[..n]);
        Self(bits)
    }

    /// Build a bitmap with the given zones set. Out-of-range ids are ignored.
    pub fn from_zones(zones: impl IntoIterator<Item = u32>) -> Self {
        let mut bitmap = Self::default();
        for zone in zones {
            bitmap.set(zone, true);
        }
        bitmap
    }

    pub fn is_set(&self, zone: u32) -> bool {
        match Self::position(zone) {
            Some((byte, bit)) => self.0[byte] & (1 << bit) != 0,
            None => false,
        }
    }

    pub fn set(&mut self, zone: u32, value: bool) {
        if let Some((byte, bit)) = Self::position(zone) {
            if value {
                self.0[byte] |= 1 << bit;
            } else {
                self.0[byte] &= !(1 << bit);
            }
        }
    }

    /// Iterate over the ids of zones whose bit is set.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=MAX_ZONES).filter(|&z| self.is_set(z))
    }

    pub fn as_bytes(&self) -> &[u8; ZONE_BITMAP_LEN] {
        &self.0
    }

    fn position(zone: u32) -> Option<(usize, u32)> {
        if zone == 0 || zone > MAX_ZONES {
            return None;
        }
        let idx = zone - 1;
        Some(((idx / 8) as usize, idx % 8))
    }
}

/// Zones registered with the panel, as reported by the paired-sensors query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairedSensors {
    zones: BTreeSet<u32>,
}

impl PairedSensors {
    /// Decode the paired-sensors reply payload (one bit per zone).
    pub fn decode(payload: &[u8]) -> Self {
        if payload.len() < ZONE_BITMAP_LEN {
            warn!(
                "Paired zones data incomplete: {} of {} bytes",
                payload.len(),
                ZONE_BITMAP_LEN
            );
        }
        let paired = Self::from_zones(ZoneBitmap::from_bytes(payload).iter_set());
        debug!("Decoded paired zones: {:?}", paired.zones);
        paired
    }

    pub fn from_zones(zones: impl IntoIterator<Item = u32>) -> Self {
        Self {
            zones: zones
                .into_iter()
                .filter(|z| (1..=MAX_ZONES).contains(z))
                .collect(),
        }
    }

    pub fn is_paired(&self, zone: u32) -> bool {
        self.zones.contains(&zone)
    }

    pub fn zones(&self) -> impl Iterator<Item = u32> + '_ {
        self.zones.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
