// MIT License - Copyright (c) 2021 TJForc
// Sensor projections over the published snapshot

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorSnapshot;
use crate::devices::system::ArmedState;
use crate::panel::IsecPanel;

/// Anything that can hand out the current panel snapshot.
pub trait StatusSource {
    fn snapshot(&self) -> Option<Arc<CoordinatorSnapshot>>;
}

impl StatusSource for IsecPanel {
    fn snapshot(&self) -> Option<Arc<CoordinatorSnapshot>> {
        IsecPanel::snapshot(self)
    }
}

impl StatusSource for Arc<CoordinatorSnapshot> {
    fn snapshot(&self) -> Option<Arc<CoordinatorSnapshot>> {
        Some(Arc::clone(self))
    }
}

/// Value of one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Text(String),
    /// The sensor refers to something the snapshot does not contain.
    Unknown,
}

/// One presented sensor. Every variant is a projection of a snapshot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sensor {
    Battery,
    Tamper,
    Siren,
    AllZonesClosed,
    Zone(u32),
}

impl Sensor {
    /// Sensors to present for a snapshot: the general ones plus one per
    /// paired zone.
    pub fn catalogue(snapshot: &CoordinatorSnapshot) -> Vec<Sensor> {
        let mut sensors = vec![
            Sensor::Battery,
            Sensor::Tamper,
            Sensor::Siren,
            Sensor::AllZonesClosed,
        ];
        sensors.extend(snapshot.zones.keys().map(|&zone| Sensor::Zone(zone)));
        sensors
    }

    pub fn project(&self, snapshot: &CoordinatorSnapshot) -> SensorValue {
        match self {
            Sensor::Battery => SensorValue::Text(snapshot.battery_status.as_str().to_string()),
            Sensor::Tamper => SensorValue::Bool(snapshot.tamper),
            Sensor::Siren => SensorValue::Bool(snapshot.siren),
            Sensor::AllZonesClosed => SensorValue::Bool(snapshot.open_zones().next().is_none()),
            Sensor::Zone(zone) => match snapshot.zone(*zone) {
                Some(state) => SensorValue::Bool(state.is_open()),
                None => SensorValue::Unknown,
            },
        }
    }

    /// Read the sensor from a source; `Unknown` until a snapshot exists.
    pub fn read(&self, source: &impl StatusSource) -> SensorValue {
        match source.snapshot() {
            Some(snapshot) => self.project(&snapshot),
            None => SensorValue::Unknown,
        }
    }

    /// Stable identifier, e.g. `battery` or `zone_3`.
    pub fn key(&self) -> String {
        match self {
            Sensor::Battery => "battery".to_string(),
            Sensor::Tamper => "tamper".to_string(),
            Sensor::Siren => "siren".to_string(),
            Sensor::AllZonesClosed => "all_zones_closed".to_string(),
            Sensor::Zone(zone) => format!("zone_{}", zone),
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// State presented by the alarm control panel entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Disarmed,
    ArmedHome,
    ArmedAway,
    Triggered,
    Unknown,
}

impl AlarmState {
    pub fn from_snapshot(snapshot: &CoordinatorSnapshot) -> Self {
        match snapshot.armed_state {
            ArmedState::Disarmed => Self::Disarmed,
            ArmedState::ArmedHome => Self::ArmedHome,
            ArmedState::ArmedAway => Self::ArmedAway,
            ArmedState::Unknown if snapshot.siren => Self::Triggered,
            ArmedState::Unknown => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarmed => "disarmed",
            Self::ArmedHome => "armed_home",
            Self::ArmedAway => "armed_away",
            Self::Triggered => "triggered",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::system::BatteryStatus;
    use crate::devices::zone::ZoneState;
    use std::collections::BTreeMap;

    fn snapshot() -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            model: "AMT-8000".to_string(),
            version: "1.0.0".to_string(),
            armed_state: ArmedState::Disarmed,
            siren: false,
            tamper: true,
            battery_status: BatteryStatus::Low,
            zones_firing: false,
            zones_closed: false,
            zones: BTreeMap::from([(1, ZoneState::Open), (2, ZoneState::Closed)]),
        }
    }

    #[test]
    fn test_catalogue_lists_paired_zones() {
        assert_eq!(
            Sensor::catalogue(&snapshot()),
            vec![
                Sensor::Battery,
                Sensor::Tamper,
                Sensor::Siren,
                Sensor::AllZonesClosed,
                Sensor::Zone(1),
                Sensor::Zone(2),
            ]
        );
    }

    #[test]
    fn test_projections() {
        let snap = snapshot();
        assert_eq!(Sensor::Battery.project(&snap), SensorValue::Text("low".to_string()));
        assert_eq!(Sensor::Tamper.project(&snap), SensorValue::Bool(true));
        assert_eq!(Sensor::Siren.project(&snap), SensorValue::Bool(false));
        assert_eq!(Sensor::Zone(1).project(&snap), SensorValue::Bool(true));
        assert_eq!(Sensor::Zone(2).project(&snap), SensorValue::Bool(false));
        assert_eq!(Sensor::Zone(9).project(&snap), SensorValue::Unknown);
    }

    #[test]
    fn test_all_zones_closed() {
        let mut snap = snapshot();
        assert_eq!(Sensor::AllZonesClosed.project(&snap), SensorValue::Bool(false));
        snap.zones.insert(1, ZoneState::Closed);
        assert_eq!(Sensor::AllZonesClosed.project(&snap), SensorValue::Bool(true));
        snap.zones.clear();
        assert_eq!(Sensor::AllZonesClosed.project(&snap), SensorValue::Bool(true));
    }

    #[test]
    fn test_read_from_source() {
        let source = Arc::new(snapshot());
        assert_eq!(Sensor::Tamper.read(&source), SensorValue::Bool(true));
    }

    #[test]
    fn test_alarm_state() {
        let mut snap = snapshot();
        assert_eq!(AlarmState::from_snapshot(&snap), AlarmState::Disarmed);
        snap.armed_state = ArmedState::ArmedAway;
        snap.siren = true;
        assert_eq!(AlarmState::from_snapshot(&snap), AlarmState::ArmedAway);
        snap.armed_state = ArmedState::Unknown;
        assert_eq!(AlarmState::from_snapshot(&snap), AlarmState::Triggered);
        snap.siren = false;
        assert_eq!(AlarmState::from_snapshot(&snap), AlarmState::Unknown);
    }

    #[test]
    fn test_sensor_keys() {
        assert_eq!(Sensor::AllZonesClosed.key(), "all_zones_closed");
        assert_eq!(Sensor::Zone(12).to_string(), "zone_12");
        assert_eq!(serde_json::to_string(&SensorValue::Bool(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&SensorValue::Text("full".into())).unwrap(),
            "\"full\""
        );
    }
}
