// MIT License - Copyright (c) 2021 TJForc
// Scriptable panel client used by unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::client::PanelClient;
use crate::devices::system::{ArmedState, BatteryStatus, PanelStatus};
use crate::devices::zone::{PairedSensors, ZoneBitmap};
use crate::error::{IsecError, Result};
use crate::protocol::{PairedReply, PanicKind, StateToken};

/// Status reply used by default: disarmed, no siren, full battery,
/// zone 1 open and zone 2 closed.
pub(crate) fn sample_status() -> PanelStatus {
    PanelStatus {
        model: "AMT-8000".to_string(),
        version: "1.0.0".to_string(),
        armed_state: ArmedState::Disarmed,
        siren: false,
        tamper: false,
        battery: BatteryStatus::Full,
        zones: ZoneBitmap::from_zones([1]),
        zones_firing: false,
        zones_closed: false,
    }
}

struct MockState {
    calls: Vec<String>,
    open: bool,
    failures: HashMap<&'static str, VecDeque<IsecError>>,
    status: PanelStatus,
    paired: PairedReply,
    arm_token: StateToken,
    disarm_token: StateToken,
    panic_token: StateToken,
}

/// Cloneable handle; clones share the same recorded state.
#[derive(Clone)]
pub(crate) struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                open: false,
                failures: HashMap::new(),
                status: sample_status(),
                paired: PairedReply::Paired(PairedSensors::from_zones([1, 2])),
                arm_token: StateToken::Armed,
                disarm_token: StateToken::Disarmed,
                panic_token: StateToken::Triggered,
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub(crate) fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub(crate) fn is_open(&self) -> bool {
        self.with(|s| s.open)
    }

    /// Make the next call to `op` fail with `err`.
    pub(crate) fn fail_next(&self, op: &'static str, err: IsecError) {
        self.with(|s| s.failures.entry(op).or_default().push_back(err));
    }

    pub(crate) fn set_status(&self, status: PanelStatus) {
        self.with(|s| s.status = status);
    }

    pub(crate) fn set_paired(&self, paired: PairedReply) {
        self.with(|s| s.paired = paired);
    }

    pub(crate) fn set_panic_token(&self, token: StateToken) {
        self.with(|s| s.panic_token = token);
    }

    /// Record the call and return any scripted failure, applying the
    /// same connection reset the real client performs.
    fn enter(&self, op: &'static str, label: String) -> Result<()> {
        self.with(|s| {
            s.calls.push(label);
            if op != "connect" && !s.open {
                s.open = true;
            }
            match s.failures.get_mut(op).and_then(VecDeque::pop_front) {
                Some(err) => {
                    if err.is_connection_fatal() {
                        s.open = false;
                    }
                    Err(err)
                }
                None => Ok(()),
            }
        })
    }
}

impl PanelClient for MockClient {
    async fn connect(&mut self) -> Result<()> {
        self.enter("connect", "connect".to_string())?;
        self.with(|s| s.open = true);
        Ok(())
    }

    async fn close(&mut self) {
        self.with(|s| s.open = false);
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        crate::protocol::encode_password(password)?;
        self.enter("authenticate", "authenticate".to_string())
    }

    async fn status(&mut self) -> Result<PanelStatus> {
        self.enter("status", "status".to_string())?;
        Ok(self.with(|s| s.status.clone()))
    }

    async fn arm_system(&mut self, partition: u8) -> Result<StateToken> {
        self.enter("arm_system", format!("arm_system({})", partition))?;
        Ok(self.with(|s| s.arm_token))
    }

    async fn disarm_system(&mut self, partition: u8) -> Result<StateToken> {
        self.enter("disarm_system", format!("disarm_system({})", partition))?;
        Ok(self.with(|s| s.disarm_token))
    }

    async fn panic(&mut self, kind: PanicKind) -> Result<StateToken> {
        self.enter("panic", format!("panic({})", kind.code()))?;
        Ok(self.with(|s| s.panic_token))
    }

    async fn paired_sensors(&mut self) -> Result<PairedReply> {
        self.enter("paired_sensors", "paired_sensors".to_string())?;
        Ok(self.with(|s| s.paired.clone()))
    }

    fn is_connected(&self) -> bool {
        self.is_open()
    }
}
