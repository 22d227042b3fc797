// MIT License - Copyright (c) 2021 TJForc
// Panel connection settings

use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DEVICE_TYPE, DEFAULT_IO_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT, DEFAULT_SOFTWARE_VERSION,
};
use crate::error::Result;
use crate::protocol::encode_password;

/// Everything needed to reach and poll one panel.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel hostname or IP address.
    pub host: String,
    /// Panel TCP port (default 9009).
    pub port: u16,
    /// 6-digit remote access password.
    pub password: String,
    /// Interval between scheduled polls (default 10s).
    pub poll_interval: Duration,
    /// TCP connect timeout (default 2s).
    pub connect_timeout: Duration,
    /// Timeout applied to each socket write and each reply read (default 2s).
    pub io_timeout: Duration,
    /// Device type byte announced when authenticating.
    pub device_type: u8,
    /// Software version byte announced when authenticating.
    pub software_version: u8,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            device_type: DEFAULT_DEVICE_TYPE,
            software_version: DEFAULT_SOFTWARE_VERSION,
            event_capacity: 256,
        }
    }
}

impl PanelConfig {
    pub fn builder() -> PanelConfigBuilder {
        PanelConfigBuilder::default()
    }

    /// `host:port` string for socket connection and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the password format without touching the network.
    pub fn validate(&self) -> Result<()> {
        encode_password(&self.password).map(|_| ())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PanelConfigBuilder {
    config: PanelConfig,
}

impl PanelConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    pub fn device_type(mut self, device_type: u8) -> Self {
        self.config.device_type = device_type;
        self
    }

    pub fn software_version(mut self, version: u8) -> Self {
        self.config.software_version = version;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> PanelConfig {
        self.config
    }
}
