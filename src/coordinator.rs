// MIT License - Copyright (c) 2021 TJForc
// Update coordinator: session lifecycle and per-poll algorithm

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::PanelClient;
use crate::devices::system::{ArmedState, BatteryStatus, PanelStatus};
use crate::devices::zone::{PairedSensors, ZoneState};
use crate::error::{Result, UpdateFailed};
use crate::protocol::{PairedReply, PanicKind, StateToken};

/// Processed panel state published after each successful poll.
///
/// `zones` only contains zones the panel reports as paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub model: String,
    pub version: String,
    pub armed_state: ArmedState,
    pub siren: bool,
    pub tamper: bool,
    pub battery_status: BatteryStatus,
    pub zones_firing: bool,
    pub zones_closed: bool,
    pub zones: BTreeMap<u32, ZoneState>,
}

impl CoordinatorSnapshot {
    /// Combine a status reply with the paired-zone set.
    pub fn project(status: &PanelStatus, paired: &PairedSensors) -> Self {
        let zones = paired
            .zones()
            .map(|zone| (zone, status.zone_state(zone)))
            .collect();

        Self {
            model: status.model.clone(),
            version: status.version.clone(),
            armed_state: status.armed_state,
            siren: status.siren,
            tamper: status.tamper,
            battery_status: status.battery,
            zones_firing: status.zones_firing,
            zones_closed: status.zones_closed,
            zones,
        }
    }

    pub fn zone(&self, zone: u32) -> Option<ZoneState> {
        self.zones.get(&zone).copied()
    }

    /// Ids of paired zones currently open.
    pub fn open_zones(&self) -> impl Iterator<Item = u32> + '_ {
        self.zones
            .iter()
            .filter(|(_, state)| state.is_open())
            .map(|(zone, _)| *zone)
    }
}

/// Paired-sensor cache held for the coordinator's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PairedCache {
    /// Not fetched yet (or invalidated); fetched on the next poll.
    #[default]
    Unknown,
    Ready(PairedSensors),
    /// The panel refused the query; zones are reported empty until the
    /// session is fully re-established.
    Degraded,
}

impl PairedCache {
    fn sensors(&self) -> PairedSensors {
        match self {
            Self::Ready(paired) => paired.clone(),
            Self::Unknown | Self::Degraded => PairedSensors::default(),
        }
    }
}

/// Turns the client's request/response operations into a resilient poll.
///
/// States: unauthenticated (initial) and authenticated. Any failure during a
/// poll or a command returns the coordinator to unauthenticated, so the next
/// poll reconnects (when needed) and authenticates before asking for status.
pub struct Coordinator<C> {
    client: C,
    password: String,
    authenticated: bool,
    paired: PairedCache,
}

impl<C: PanelClient> Coordinator<C> {
    pub fn new(client: C, password: impl Into<String>) -> Self {
        Self {
            client,
            password: password.into(),
            authenticated: false,
            paired: PairedCache::Unknown,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn paired_cache(&self) -> &PairedCache {
        &self.paired
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one poll cycle.
    ///
    /// On failure the authenticated flag is cleared and no snapshot is
    /// produced; the caller keeps whatever it last published.
    pub async fn poll(&mut self) -> std::result::Result<CoordinatorSnapshot, UpdateFailed> {
        match self.try_poll().await {
            Ok(snapshot) => {
                debug!(
                    "Poll complete: armed_state={} siren={} zones={}",
                    snapshot.armed_state,
                    snapshot.siren,
                    snapshot.zones.len()
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.authenticated = false;
                error!("Poll failed: {}", e);
                Err(UpdateFailed::from(&e))
            }
        }
    }

    async fn try_poll(&mut self) -> Result<CoordinatorSnapshot> {
        self.ensure_session().await?;

        if self.paired == PairedCache::Unknown {
            self.paired = match self.client.paired_sensors().await? {
                PairedReply::Paired(paired) => {
                    info!("Paired zones: {:?}", paired.zones().collect::<Vec<_>>());
                    PairedCache::Ready(paired)
                }
                PairedReply::Rejected => {
                    warn!("Paired sensors unavailable, zone state will be empty");
                    PairedCache::Degraded
                }
            };
        }

        let status = self.client.status().await?;
        Ok(CoordinatorSnapshot::project(&status, &self.paired.sensors()))
    }

    /// Connect (no-op when open) and authenticate unless already done.
    async fn ensure_session(&mut self) -> Result<()> {
        self.client.connect().await?;
        if self.authenticated {
            return Ok(());
        }

        self.client.authenticate(&self.password).await?;
        self.authenticated = true;
        if self.paired == PairedCache::Degraded {
            debug!("Session re-established, refetching paired sensors");
            self.paired = PairedCache::Unknown;
        }
        Ok(())
    }

    pub async fn arm(&mut self, partition: u8) -> Result<StateToken> {
        let result = match self.ensure_session().await {
            Ok(()) => self.client.arm_system(partition).await,
            Err(e) => Err(e),
        };
        self.settle_command("arm", result)
    }

    pub async fn disarm(&mut self, partition: u8) -> Result<StateToken> {
        let result = match self.ensure_session().await {
            Ok(()) => self.client.disarm_system(partition).await,
            Err(e) => Err(e),
        };
        self.settle_command("disarm", result)
    }

    pub async fn panic(&mut self, kind: PanicKind) -> Result<StateToken> {
        let result = match self.ensure_session().await {
            Ok(()) => self.client.panic(kind).await,
            Err(e) => Err(e),
        };
        self.settle_command("panic", result)
    }

    fn settle_command(&mut self, name: &str, result: Result<StateToken>) -> Result<StateToken> {
        match &result {
            Ok(token) => info!("{} returned {}", name, token),
            Err(e) => {
                self.authenticated = false;
                warn!("{} failed: {}", name, e);
            }
        }
        result
    }

    /// Close the connection and forget the session.
    pub async fn close(&mut self) {
        self.authenticated = false;
        self.client.close().await;
    }
}
