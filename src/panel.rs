// MIT License - Copyright (c) 2021 TJForc
// Panel handle and its single-owner polling worker

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::client::{IsecClient, PanelClient};
use crate::config::PanelConfig;
use crate::coordinator::{Coordinator, CoordinatorSnapshot};
use crate::error::{IsecError, Result, UpdateFailed};
use crate::event::{EventReceiver, EventSender, PanelEvent, event_channel};
use crate::protocol::{PanicKind, StateToken};

type PollResult = std::result::Result<Arc<CoordinatorSnapshot>, UpdateFailed>;

/// Result of a command checked against the state it was meant to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The panel reported the requested state.
    pub accepted: bool,
    pub token: StateToken,
}

impl CommandOutcome {
    fn verify(token: StateToken, expected: StateToken) -> Self {
        Self {
            accepted: token == expected,
            token,
        }
    }
}

enum Request {
    Refresh {
        reply: oneshot::Sender<PollResult>,
    },
    Arm {
        partition: u8,
        reply: oneshot::Sender<Result<StateToken>>,
    },
    Disarm {
        partition: u8,
        reply: oneshot::Sender<Result<StateToken>>,
    },
    Panic {
        kind: PanicKind,
        reply: oneshot::Sender<Result<StateToken>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The main public API for interacting with an ISEC alarm panel.
///
/// A background worker owns the connection and polls the panel on a fixed
/// interval. Commands and refresh requests are queued to the same worker, so
/// a command frame can never interleave with a poll on the wire.
///
/// # Example
///
/// ```no_run
/// use isec_bridge::{IsecPanel, PanelConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = PanelConfig::builder()
///         .host("192.168.1.100")
///         .password("123456")
///         .build();
///
///     let panel = IsecPanel::start(config)?;
///
///     let mut events = panel.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     let snapshot = panel.refresh().await?;
///     println!("Armed state: {}", snapshot.armed_state);
///
///     let outcome = panel.arm_and_verify(0).await?;
///     println!("Arm accepted: {}", outcome.accepted);
///
///     tokio::signal::ctrl_c().await?;
///     panel.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct IsecPanel {
    config: PanelConfig,
    requests: mpsc::Sender<Request>,
    snapshot_rx: watch::Receiver<Option<Arc<CoordinatorSnapshot>>>,
    event_tx: EventSender,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IsecPanel {
    /// Start polling the configured panel over TCP.
    ///
    /// Must be called from within a tokio runtime. Fails only when the
    /// configuration itself is unusable (malformed password).
    pub fn start(config: PanelConfig) -> Result<Self> {
        let client = IsecClient::new(&config);
        Self::with_client(config, client)
    }

    /// Start a worker around any [`PanelClient`] implementation.
    pub fn with_client<C>(config: PanelConfig, client: C) -> Result<Self>
    where
        C: PanelClient + 'static,
    {
        config.validate()?;

        let (event_tx, _event_rx) = event_channel(config.event_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (request_tx, request_rx) = mpsc::channel(32);

        let worker = Worker {
            coordinator: Coordinator::new(client, config.password.clone()),
            snapshot_tx,
            event_tx: event_tx.clone(),
        };
        let span = info_span!("isec_panel", host = %config.host, port = config.port);
        let handle = tokio::spawn(
            worker
                .run(request_rx, config.poll_interval)
                .instrument(span),
        );

        Ok(Self {
            config,
            requests: request_tx,
            snapshot_rx,
            event_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Subscribe to panel events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Last successfully polled snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<CoordinatorSnapshot>> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified every time a new snapshot is published.
    pub fn watch_snapshot(&self) -> watch::Receiver<Option<Arc<CoordinatorSnapshot>>> {
        self.snapshot_rx.clone()
    }

    /// Poll the panel now and return the fresh snapshot.
    pub async fn refresh(&self) -> PollResult {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Refresh { reply }).await.is_err() {
            return Err(UpdateFailed::from(&IsecError::WorkerStopped));
        }
        rx.await
            .unwrap_or_else(|_| Err(UpdateFailed::from(&IsecError::WorkerStopped)))
    }

    /// Arm a partition (0 = all). Returns what the panel reported.
    pub async fn arm(&self, partition: u8) -> Result<StateToken> {
        self.command(|reply| Request::Arm { partition, reply }).await
    }

    /// Disarm a partition (0 = all). Returns what the panel reported.
    pub async fn disarm(&self, partition: u8) -> Result<StateToken> {
        self.command(|reply| Request::Disarm { partition, reply }).await
    }

    pub async fn panic(&self, kind: PanicKind) -> Result<StateToken> {
        self.command(|reply| Request::Panic { kind, reply }).await
    }

    pub async fn arm_and_verify(&self, partition: u8) -> Result<CommandOutcome> {
        let token = self.arm(partition).await?;
        Ok(CommandOutcome::verify(token, StateToken::Armed))
    }

    pub async fn disarm_and_verify(&self, partition: u8) -> Result<CommandOutcome> {
        let token = self.disarm(partition).await?;
        Ok(CommandOutcome::verify(token, StateToken::Disarmed))
    }

    pub async fn panic_and_verify(&self, kind: PanicKind) -> Result<CommandOutcome> {
        let token = self.panic(kind).await?;
        Ok(CommandOutcome::verify(token, StateToken::Triggered))
    }

    async fn command(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<StateToken>>) -> Request,
    ) -> Result<StateToken> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| IsecError::WorkerStopped)?;
        rx.await.map_err(|_| IsecError::WorkerStopped)?
    }

    /// Stop the worker and close the connection.
    ///
    /// Waits for an in-flight poll or command to finish first. Safe to call
    /// more than once.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
        if let Some(handle) = self.worker.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!("Panel worker ended abnormally: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PanelCommand {
    Arm(u8),
    Disarm(u8),
    Panic(PanicKind),
}

impl PanelCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Arm(_) => "arm",
            Self::Disarm(_) => "disarm",
            Self::Panic(_) => "panic",
        }
    }
}

struct Worker<C> {
    coordinator: Coordinator<C>,
    snapshot_tx: watch::Sender<Option<Arc<CoordinatorSnapshot>>>,
    event_tx: EventSender,
}

impl<C: PanelClient> Worker<C> {
    async fn run(mut self, mut requests: mpsc::Receiver<Request>, poll_interval: Duration) {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Panel worker started, polling every {:?}", poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.refresh().await;
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        debug!("All panel handles dropped");
                        break;
                    };
                    match request {
                        Request::Refresh { reply } => {
                            let result = self.refresh().await;
                            ticker.reset();
                            let _ = reply.send(result);
                        }
                        Request::Arm { partition, reply } => {
                            let result = self.run_command(PanelCommand::Arm(partition)).await;
                            ticker.reset();
                            let _ = reply.send(result);
                        }
                        Request::Disarm { partition, reply } => {
                            let result = self.run_command(PanelCommand::Disarm(partition)).await;
                            ticker.reset();
                            let _ = reply.send(result);
                        }
                        Request::Panic { kind, reply } => {
                            let result = self.run_command(PanelCommand::Panic(kind)).await;
                            ticker.reset();
                            let _ = reply.send(result);
                        }
                        Request::Shutdown { reply } => {
                            self.stop().await;
                            let _ = reply.send(());
                            return;
                        }
                    }
                }
            }
        }

        self.stop().await;
    }

    async fn refresh(&mut self) -> PollResult {
        let was_authenticated = self.coordinator.is_authenticated();
        let result = self.coordinator.poll().await;
        self.note_session_change(was_authenticated);

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot_tx.send_replace(Some(snapshot.clone()));
                let _ = self.event_tx.send(PanelEvent::SnapshotUpdated);
                Ok(snapshot)
            }
            Err(failed) => {
                let _ = self.event_tx.send(PanelEvent::UpdateFailed {
                    message: failed.message.clone(),
                });
                Err(failed)
            }
        }
    }

    /// Run a command, then refresh so the published state follows it.
    async fn run_command(&mut self, command: PanelCommand) -> Result<StateToken> {
        let was_authenticated = self.coordinator.is_authenticated();
        let result = match command {
            PanelCommand::Arm(partition) => self.coordinator.arm(partition).await,
            PanelCommand::Disarm(partition) => self.coordinator.disarm(partition).await,
            PanelCommand::Panic(kind) => self.coordinator.panic(kind).await,
        };
        self.note_session_change(was_authenticated);

        if let Err(e) = &result {
            let _ = self.event_tx.send(PanelEvent::CommandFailed {
                command: command.name().to_string(),
                message: e.to_string(),
            });
        }

        let _ = self.refresh().await;
        result
    }

    fn note_session_change(&self, was_authenticated: bool) {
        match (was_authenticated, self.coordinator.is_authenticated()) {
            (false, true) => {
                let _ = self.event_tx.send(PanelEvent::Authenticated);
            }
            (true, false) => {
                let _ = self.event_tx.send(PanelEvent::ConnectionLost);
            }
            _ => {}
        }
    }

    async fn stop(&mut self) {
        self.coordinator.close().await;
        let _ = self.event_tx.send(PanelEvent::Shutdown);
        info!("Panel worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::system::ArmedState;
    use crate::testing::MockClient;
    use tokio::sync::broadcast::error::TryRecvError;

    fn config() -> PanelConfig {
        PanelConfig::builder()
            .host("127.0.0.1")
            .password("123456")
            .poll_interval(Duration::from_secs(3600))
            .build()
    }

    fn drain(rx: &mut EventReceiver) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    #[tokio::test]
    async fn test_rejects_malformed_password() {
        let config = PanelConfig::builder().password("12").build();
        assert!(matches!(
            IsecPanel::with_client(config, MockClient::new()),
            Err(IsecError::MalformedPassword)
        ));
    }

    #[tokio::test]
    async fn test_initial_poll_publishes_snapshot() {
        let mock = MockClient::new();
        let panel = IsecPanel::with_client(config(), mock.clone()).unwrap();
        let mut events = panel.subscribe();

        let mut watch = panel.watch_snapshot();
        watch.changed().await.unwrap();
        let snapshot = panel.snapshot().unwrap();
        assert_eq!(snapshot.armed_state, ArmedState::Disarmed);

        let events = drain(&mut events);
        assert_eq!(
            events,
            vec![PanelEvent::Authenticated, PanelEvent::SnapshotUpdated]
        );
        panel.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_poll_retains_snapshot() {
        let mock = MockClient::new();
        let panel = IsecPanel::with_client(config(), mock.clone()).unwrap();
        let first = panel.refresh().await.unwrap();
        let mut events = panel.subscribe();

        mock.fail_next("status", IsecError::Disconnected);
        let failed = panel.refresh().await.unwrap_err();
        assert_eq!(failed.message, "Socket disconnected");
        assert_eq!(panel.snapshot().unwrap(), first);

        let events = drain(&mut events);
        assert_eq!(
            events,
            vec![
                PanelEvent::ConnectionLost,
                PanelEvent::UpdateFailed {
                    message: "Socket disconnected".to_string()
                }
            ]
        );
        panel.shutdown().await;
    }

    #[tokio::test]
    async fn test_command_triggers_refresh() {
        let mock = MockClient::new();
        let panel = IsecPanel::with_client(config(), mock.clone()).unwrap();
        panel.refresh().await.unwrap();
        mock.clear_calls();

        let outcome = panel.arm_and_verify(0).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.token, StateToken::Armed);
        assert_eq!(
            mock.calls(),
            vec!["connect", "arm_system(0)", "connect", "status"]
        );
        panel.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_command_reported_and_refreshed() {
        let mock = MockClient::new();
        let panel = IsecPanel::with_client(config(), mock.clone()).unwrap();
        panel.refresh().await.unwrap();
        mock.clear_calls();
        let mut events = panel.subscribe();

        mock.fail_next("panic", IsecError::ReadTimeout);
        let err = panel.panic(PanicKind::Audible).await.unwrap_err();
        assert!(matches!(err, IsecError::ReadTimeout));
        assert_eq!(
            mock.calls(),
            vec!["connect", "panic(1)", "connect", "authenticate", "status"]
        );

        let events = drain(&mut events);
        assert!(events.contains(&PanelEvent::CommandFailed {
            command: "panic".to_string(),
            message: "Timed out waiting for panel reply".to_string(),
        }));
        panel.shutdown().await;
    }

    #[tokio::test]
    async fn test_verify_reports_rejection() {
        let mock = MockClient::new();
        mock.set_panic_token(StateToken::NotTriggered);
        let panel = IsecPanel::with_client(config(), mock.clone()).unwrap();
        let outcome = panel.panic_and_verify(PanicKind::Audible).await.unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.token, StateToken::NotTriggered);
        panel.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mock = MockClient::new();
        let panel = IsecPanel::with_client(config(), mock.clone()).unwrap();
        let mut events = panel.subscribe();
        panel.refresh().await.unwrap();

        panel.shutdown().await;
        panel.shutdown().await;
        assert!(!mock.is_open());
        assert!(drain(&mut events).contains(&PanelEvent::Shutdown));

        assert!(matches!(panel.arm(0).await, Err(IsecError::WorkerStopped)));
        assert!(panel.refresh().await.is_err());
        // last snapshot stays readable
        assert!(panel.snapshot().is_some());
    }
}
