// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use isec_bridge::{
    AlarmState, CoordinatorSnapshot, EventReceiver, IsecPanel, PanelConfig, PanelEvent, PanicKind,
    Sensor, SensorValue, StateToken,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "isec2mqtt")]
#[command(about = "Bridge between an Intelbras ISEC alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<u32, String>,
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_panel_port")]
    port: u16,
    password: String,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout")]
    io_timeout_ms: u64,
}

fn default_panel_port() -> u16 {
    9009
}
fn default_poll_interval() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    2000
}
fn default_io_timeout() -> u64 {
    2000
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "isec-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "isec/cmd".to_string()
}
fn default_publish_topic() -> String {
    "isec".to_string()
}

fn build_panel_config(toml: &PanelToml) -> Result<PanelConfig> {
    if toml.poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }
    let config = PanelConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .password(&toml.password)
        .poll_interval(Duration::from_secs(toml.poll_interval_secs))
        .connect_timeout(Duration::from_millis(toml.connect_timeout_ms))
        .io_timeout(Duration::from_millis(toml.io_timeout_ms))
        .build();
    config.validate().context("Invalid panel password")?;
    Ok(config)
}

/// Everything one bridge run needs, resolved from the config file.
struct Settings {
    panel: PanelConfig,
    mqtt_host: String,
    mqtt_port: u16,
    client_id: String,
    publish_topic: String,
    subscribe_topic: String,
    zone_names: Arc<HashMap<u32, String>>,
}

impl Settings {
    fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let panel = build_panel_config(&config.panel)?;
        let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
        Ok(Self {
            panel,
            mqtt_host,
            mqtt_port,
            client_id: config.mqtt.client_id,
            publish_topic: config.mqtt.publish_topic,
            subscribe_topic: config.mqtt.subscribe_topic,
            zone_names: Arc::new(config.zone_names),
        })
    }
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages: all share {now, op, ...} flat structure

// Full state: the coordinator snapshot as-is, plus display names of the
// paired zones
#[derive(Serialize)]
struct MqttSnapshot<'a> {
    now: u64,
    op: String,
    alarm: AlarmState,
    zone_names: BTreeMap<u32, String>,
    state: &'a CoordinatorSnapshot,
}

// Sensor change: {now, op, sensor, value}
#[derive(Serialize)]
struct MqttSensorEvent {
    now: u64,
    op: String,
    sensor: String,
    value: SensorValue,
}

// Poll failure: {now, op, message}
#[derive(Serialize)]
struct MqttUpdateFailed {
    now: u64,
    op: String,
    message: String,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<StateToken>,
}

// Simple event with just {now, op}
#[derive(Serialize)]
struct MqttSimpleEvent {
    now: u64,
    op: String,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    partition: Option<u8>,
    #[serde(default)]
    kind: Option<u8>,
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn zone_label(zone_id: u32, overrides: &HashMap<u32, String>) -> String {
    match overrides.get(&zone_id) {
        Some(name) => name.clone(),
        None => format!("Zone {zone_id}"),
    }
}

fn build_snapshot<'a>(
    snapshot: &'a CoordinatorSnapshot,
    zone_names: &HashMap<u32, String>,
) -> MqttSnapshot<'a> {
    MqttSnapshot {
        now: now_epoch_ms(),
        op: "SNAPSHOT".to_string(),
        alarm: AlarmState::from_snapshot(snapshot),
        zone_names: snapshot
            .zones
            .keys()
            .map(|&id| (id, zone_label(id, zone_names)))
            .collect(),
        state: snapshot,
    }
}

/// Publishes bridge messages on the configured topic.
#[derive(Clone)]
struct Publisher {
    client: AsyncClient,
    topic: String,
    zone_names: Arc<HashMap<u32, String>>,
}

impl Publisher {
    async fn json(&self, payload: &impl Serialize, retain: bool) {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize MQTT payload: {e}");
                return;
            }
        };
        if let Err(e) = self.client.publish(&self.topic, QoS::AtLeastOnce, retain, json).await {
            error!("Failed to publish to {}: {e}", self.topic);
        }
    }

    async fn cmd_ack(
        &self,
        success: bool,
        src: Option<serde_json::Value>,
        token: Option<StateToken>,
    ) {
        let msg = MqttCmdAck {
            now: now_epoch_ms(),
            op: "CMD_ACK".to_string(),
            success,
            src,
            token,
        };
        self.json(&msg, false).await;
    }

    async fn simple_event(&self, op: &str) {
        let msg = MqttSimpleEvent {
            now: now_epoch_ms(),
            op: op.to_string(),
        };
        self.json(&msg, false).await;
    }

    /// Retained SNAPSHOT; returns false when no poll has succeeded yet.
    async fn snapshot(&self, panel: &IsecPanel) -> bool {
        let Some(snapshot) = panel.snapshot() else {
            debug!("No snapshot available yet");
            return false;
        };
        self.json(&build_snapshot(&snapshot, &self.zone_names), true).await;
        true
    }

    /// Publish a SENSOR message for every projection whose value changed.
    async fn sensor_changes(
        &self,
        snapshot: &CoordinatorSnapshot,
        previous: &mut HashMap<Sensor, SensorValue>,
    ) {
        for sensor in Sensor::catalogue(snapshot) {
            let value = sensor.project(snapshot);
            if previous.get(&sensor) == Some(&value) {
                continue;
            }
            info!("Sensor {sensor} changed to {value:?}");
            previous.insert(sensor, value.clone());
            let msg = MqttSensorEvent {
                now: now_epoch_ms(),
                op: "SENSOR".to_string(),
                sensor: sensor.key(),
                value,
            };
            self.json(&msg, false).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Panel event → MQTT
// ---------------------------------------------------------------------------

async fn handle_panel_event(
    event: PanelEvent,
    publisher: &Publisher,
    panel: &IsecPanel,
    sensors: &mut HashMap<Sensor, SensorValue>,
) {
    match event {
        PanelEvent::SnapshotUpdated => {
            if let Some(snapshot) = panel.snapshot() {
                publisher
                    .json(&build_snapshot(&snapshot, &publisher.zone_names), true)
                    .await;
                publisher.sensor_changes(&snapshot, sensors).await;
            }
        }
        PanelEvent::UpdateFailed { message } => {
            warn!("Panel update failed: {message}");
            let msg = MqttUpdateFailed {
                now: now_epoch_ms(),
                op: "UPDATE_FAILED".to_string(),
                message,
            };
            publisher.json(&msg, false).await;
        }
        PanelEvent::Authenticated => {
            info!("Panel session established");
            publisher.simple_event("PANEL_CONNECTED").await;
        }
        PanelEvent::ConnectionLost => {
            warn!("Panel session lost, will re-authenticate on next poll");
            publisher.simple_event("PANEL_DISCONNECTED").await;
        }
        PanelEvent::CommandFailed { command, message } => {
            error!("Panel command {command} failed: {message}");
        }
        PanelEvent::Shutdown => {
            debug!("Panel worker shut down");
        }
    }
}

async fn forward_panel_events(
    mut events: EventReceiver,
    publisher: Publisher,
    panel: Arc<IsecPanel>,
) {
    let mut sensors = HashMap::new();
    loop {
        match events.recv().await {
            Ok(event) => handle_panel_event(event, &publisher, &panel, &mut sensors).await,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event receiver lagged, missed {n} events");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT → panel commands
// ---------------------------------------------------------------------------

/// Log the outcome of a panel command; `None` when it failed outright.
async fn run_panel_cmd(
    op: &str,
    fut: impl std::future::Future<Output = isec_bridge::Result<StateToken>>,
) -> Option<StateToken> {
    match fut.await {
        Ok(token) => {
            if token.is_success() {
                info!("{op}: {token}");
            } else {
                warn!("{op}: panel returned {token}");
            }
            Some(token)
        }
        Err(e) => {
            error!("{op} failed: {e}");
            None
        }
    }
}

async fn handle_command(payload: &str, publisher: &Publisher, panel: &IsecPanel) {
    let cmd = match serde_json::from_str::<MqttCommand>(payload) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("Failed to parse MQTT command: {e}");
            return;
        }
    };
    // echoed back in CMD_ACK
    let src = serde_json::from_str::<serde_json::Value>(payload).ok();
    debug!("MQTT command received: {}", cmd.op);

    let (success, token) = match cmd.op.as_str() {
        "SNAPSHOT" => (publisher.snapshot(panel).await, None),
        "REFRESH" => match panel.refresh().await {
            Ok(_) => (true, None),
            Err(e) => {
                warn!("REFRESH failed: {e}");
                (false, None)
            }
        },
        op @ ("ARM" | "DISARM") => {
            if cmd.code.as_deref() != Some(panel.config().password.as_str()) {
                warn!("{op}: missing or incorrect code");
                (false, None)
            } else {
                let partition = cmd.partition.unwrap_or(0);
                info!("Command: {op} partition {partition}");
                let token = if op == "ARM" {
                    run_panel_cmd(op, panel.arm(partition)).await
                } else {
                    run_panel_cmd(op, panel.disarm(partition)).await
                };
                (token.is_some_and(|t| t.is_success()), token)
            }
        }
        "PANIC" => {
            let kind = cmd.kind.map(PanicKind::from_code).unwrap_or_default();
            info!("Command: PANIC type {}", kind.code());
            let token = run_panel_cmd("PANIC", panel.panic(kind)).await;
            (token.is_some_and(|t| t.is_success()), token)
        }
        other => {
            warn!("Unknown command: {other}");
            (false, None)
        }
    };
    publisher.cmd_ack(success, src, token).await;
}

async fn serve_mqtt(
    mut eventloop: EventLoop,
    subscribe_topic: String,
    publisher: Publisher,
    panel: Arc<IsecPanel>,
) {
    loop {
        match eventloop.poll().await {
            // also covers broker reconnects, which drop the subscription
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT: connected, subscribing to {subscribe_topic}");
                if let Err(e) = publisher
                    .client
                    .subscribe(&subscribe_topic, QoS::AtLeastOnce)
                    .await
                {
                    error!("Failed to subscribe to {subscribe_topic}: {e}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(msg))) if msg.topic == subscribe_topic => {
                let payload = String::from_utf8_lossy(&msg.payload);
                handle_command(&payload, &publisher, &panel).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT event loop error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Run the bridge until a signal arrives. Returns true when SIGHUP asked
/// for a restart.
async fn run_bridge(settings: &Settings, sighup: &mut Signal, sigterm: &mut Signal) -> Result<bool> {
    info!("Starting panel worker for {}", settings.panel.address());
    let panel = Arc::new(IsecPanel::start(settings.panel.clone())?);

    let mut mqtt_opts =
        MqttOptions::new(&settings.client_id, &settings.mqtt_host, settings.mqtt_port);
    mqtt_opts.set_keep_alive(Duration::from_secs(30));
    let (client, eventloop) = AsyncClient::new(mqtt_opts, 256);
    let publisher = Publisher {
        client,
        topic: settings.publish_topic.clone(),
        zone_names: Arc::clone(&settings.zone_names),
    };

    let events = tokio::spawn(forward_panel_events(
        panel.subscribe(),
        publisher.clone(),
        Arc::clone(&panel),
    ));
    let commands = tokio::spawn(serve_mqtt(
        eventloop,
        settings.subscribe_topic.clone(),
        publisher,
        Arc::clone(&panel),
    ));

    info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
    let restart = tokio::select! {
        _ = tokio::signal::ctrl_c() => false,
        _ = sigterm.recv() => false,
        _ = sighup.recv() => true,
    };

    commands.abort();
    panel.shutdown().await;
    events.abort();
    Ok(restart)
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=isec_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    while run_bridge(&settings, &mut sighup, &mut sigterm).await? {
        info!("Received SIGHUP, reloading {}", cli.config);
        match Settings::load(&cli.config) {
            Ok(reloaded) => settings = reloaded,
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use isec_bridge::{ArmedState, BatteryStatus, ZoneState};

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(
            parse_mqtt_url("mqtt://broker.local:1883").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("10.0.0.2:8883").unwrap(),
            ("10.0.0.2".to_string(), 8883)
        );
        assert!(parse_mqtt_url("mqtt://broker.local").is_err());
    }

    #[test]
    fn test_config_parse_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [panel]
            host = "192.168.1.50"
            password = "123456"

            [mqtt]
            url = "mqtt://localhost:1883"

            [zone_names]
            1 = "Front Door"
            "#,
        )
        .unwrap();

        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.panel.port, 9009);
        assert_eq!(settings.panel.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.panel.io_timeout, Duration::from_millis(2000));
        assert_eq!(settings.mqtt_host, "localhost");
        assert_eq!(settings.publish_topic, "isec");
        assert_eq!(settings.subscribe_topic, "isec/cmd");
        assert_eq!(settings.zone_names.get(&1).map(String::as_str), Some("Front Door"));
    }

    #[test]
    fn test_config_rejects_bad_password() {
        let config: Config = toml::from_str(
            r#"
            [panel]
            host = "192.168.1.50"
            password = "1234"

            [mqtt]
            url = "mqtt://localhost:1883"
            "#,
        )
        .unwrap();
        assert!(Settings::from_config(config).is_err());
    }

    fn sample_snapshot() -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            model: "AMT-8000".to_string(),
            version: "1.2.3".to_string(),
            armed_state: ArmedState::ArmedAway,
            siren: false,
            tamper: false,
            battery_status: BatteryStatus::Full,
            zones_firing: false,
            zones_closed: false,
            zones: BTreeMap::from([(1, ZoneState::Closed), (12, ZoneState::Open)]),
        }
    }

    #[test]
    fn test_snapshot_message_shape() {
        let snapshot = sample_snapshot();
        let names = HashMap::from([(1, "Hall".to_string()), (30, "Unpaired".to_string())]);
        let json = serde_json::to_value(build_snapshot(&snapshot, &names)).unwrap();
        assert_eq!(json["op"], "SNAPSHOT");
        assert_eq!(json["alarm"], "armed_away");
        assert_eq!(json["state"]["battery_status"], "full");
        assert_eq!(json["state"]["zones"], serde_json::json!({ "1": "closed", "12": "open" }));
        // names only for paired zones, defaulted when not configured
        assert_eq!(
            json["zone_names"],
            serde_json::json!({ "1": "Hall", "12": "Zone 12" })
        );
    }

    // Loads `$ref`ed schemas from schemas/mqtt/
    struct SchemaDir;

    impl jsonschema::Retrieve for SchemaDir {
        fn retrieve(
            &self,
            uri: &jsonschema::Uri<String>,
        ) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>>
        {
            let name = uri.as_str().rsplit('/').next().unwrap_or_default();
            let path = format!("{}/schemas/mqtt/{name}", env!("CARGO_MANIFEST_DIR"));
            Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
        }
    }

    fn assert_matches_schema(schema_name: &str, instance: &serde_json::Value) {
        let path = format!("{}/schemas/mqtt/{schema_name}", env!("CARGO_MANIFEST_DIR"));
        let schema: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let validator = jsonschema::options()
            .with_retriever(SchemaDir)
            .build(&schema)
            .unwrap();
        let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
        assert!(errors.is_empty(), "{schema_name}: {errors:?}\n{instance:#}");
    }

    #[test]
    fn test_published_snapshot_matches_schema() {
        let mut snapshot = sample_snapshot();
        let names = HashMap::from([(1, "Hall".to_string())]);
        assert_matches_schema(
            "snapshot.schema.json",
            &serde_json::to_value(build_snapshot(&snapshot, &names)).unwrap(),
        );

        snapshot.armed_state = ArmedState::Unknown;
        snapshot.battery_status = BatteryStatus::Unknown;
        snapshot.siren = true;
        snapshot.zones.clear();
        let json = serde_json::to_value(build_snapshot(&snapshot, &names)).unwrap();
        assert_eq!(json["alarm"], "triggered");
        assert_matches_schema("snapshot.schema.json", &json);
    }

    #[test]
    fn test_published_events_match_schema() {
        let ack = MqttCmdAck {
            now: now_epoch_ms(),
            op: "CMD_ACK".to_string(),
            success: true,
            src: Some(serde_json::json!({ "op": "ARM", "code": "123456" })),
            token: Some(StateToken::Armed),
        };
        assert_matches_schema("cmd_ack.schema.json", &serde_json::to_value(ack).unwrap());

        let failed = MqttUpdateFailed {
            now: now_epoch_ms(),
            op: "UPDATE_FAILED".to_string(),
            message: "Error communicating with panel: Socket disconnected".to_string(),
        };
        assert_matches_schema("update_failed.schema.json", &serde_json::to_value(failed).unwrap());

        let snapshot = sample_snapshot();
        for sensor in Sensor::catalogue(&snapshot) {
            let msg = MqttSensorEvent {
                now: now_epoch_ms(),
                op: "SENSOR".to_string(),
                sensor: sensor.key(),
                value: sensor.project(&snapshot),
            };
            assert_matches_schema("sensor.schema.json", &serde_json::to_value(msg).unwrap());
        }
    }
}
