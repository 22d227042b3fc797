// MIT License - Copyright (c) 2021 TJForc
// ISEC protocol client over a persistent TCP connection

use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PanelConfig;
use crate::constants::HEADER_LEN;
use crate::devices::system::PanelStatus;
use crate::error::{IsecError, Result};
use crate::frame::{Frame, hex, total_frame_len};
use crate::protocol::{
    Command, PairedReply, PanicKind, StateToken, parse_arm_disarm_reply, parse_auth_reply,
    parse_panic_reply, parse_paired_reply, parse_status_reply,
};

/// Request/response operations against one panel.
///
/// Implemented by [`IsecClient`] for the real wire protocol; the coordinator
/// is generic over this trait so it can be driven by a test double. Every
/// command implicitly connects when no connection is open, but never
/// re-authenticates on its own.
pub trait PanelClient: Send {
    /// Open the connection. No-op when already open.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Shut the connection down. Never fails; idempotent.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    fn authenticate(&mut self, password: &str) -> impl Future<Output = Result<()>> + Send;

    fn status(&mut self) -> impl Future<Output = Result<PanelStatus>> + Send;

    fn arm_system(&mut self, partition: u8) -> impl Future<Output = Result<StateToken>> + Send;

    fn disarm_system(&mut self, partition: u8) -> impl Future<Output = Result<StateToken>> + Send;

    fn panic(&mut self, kind: PanicKind) -> impl Future<Output = Result<StateToken>> + Send;

    fn paired_sensors(&mut self) -> impl Future<Output = Result<PairedReply>> + Send;

    fn is_connected(&self) -> bool;
}

/// Client for the ISEC binary protocol.
///
/// Holds at most one socket. Any failure on the wire drops the socket and
/// clears the authenticated flag, so the next command starts from a fresh
/// connect and the caller must authenticate again.
pub struct IsecClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
    device_type: u8,
    software_version: u8,
    stream: Option<TcpStream>,
    authenticated: bool,
}

impl IsecClient {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
            device_type: config.device_type,
            software_version: config.software_version,
            stream: None,
            authenticated: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Drop the socket without a graceful shutdown.
    fn reset(&mut self) {
        if self.stream.take().is_some() {
            debug!("Connection to {}:{} reset", self.host, self.port);
        }
        self.authenticated = false;
    }

    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.authenticated = false;

        debug!("Connecting to panel at {}:{}", self.host, self.port);
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("TCP connect to {}:{} failed: {}", self.host, self.port, e);
                return Err(IsecError::Io(e));
            }
            Err(_) => {
                warn!("TCP connect to {}:{} timed out", self.host, self.port);
                return Err(IsecError::ConnectTimeout);
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        info!("Connected to panel at {}:{}", self.host, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    /// Send one command and read its reply, resetting the connection on any
    /// transport failure.
    async fn transact(&mut self, command: &Command) -> Result<Frame> {
        self.open().await?;
        match self.round_trip(command).await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                if e.is_connection_fatal() {
                    warn!("{} failed, dropping connection: {}", command.name(), e);
                    self.reset();
                }
                Err(e)
            }
        }
    }

    async fn round_trip(&mut self, command: &Command) -> Result<Frame> {
        let io_timeout = self.io_timeout;
        let stream = self.stream.as_mut().ok_or(IsecError::NotConnected)?;

        let request = command.to_frame().encode();
        debug!("Sending {}: {}", command.name(), hex(&request));
        match timeout(io_timeout, stream.write_all(&request)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(IsecError::Io(e)),
            Err(_) => return Err(IsecError::WriteTimeout),
        }

        let reply = match timeout(io_timeout, read_frame(stream)).await {
            Ok(result) => result?,
            Err(_) => return Err(IsecError::ReadTimeout),
        };
        debug!("Received {} reply: {}", command.name(), hex(&reply));
        Frame::decode(&reply)
    }
}

/// Read one complete frame: header first, then the announced remainder.
async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.map_err(map_read_error)?;

    let total = total_frame_len(&header)?;
    let mut buf = vec![0u8; total];
    buf[..HEADER_LEN].copy_from_slice(&header);
    stream
        .read_exact(&mut buf[HEADER_LEN..])
        .await
        .map_err(map_read_error)?;
    Ok(buf)
}

fn map_read_error(e: std::io::Error) -> IsecError {
    if e.kind() == IoErrorKind::UnexpectedEof {
        IsecError::Disconnected
    } else {
        IsecError::Io(e)
    }
}

impl PanelClient for IsecClient {
    async fn connect(&mut self) -> Result<()> {
        let result = self.open().await;
        if result.is_err() {
            self.reset();
        }
        result
    }

    async fn close(&mut self) {
        self.authenticated = false;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error shutting down connection: {}", e);
            }
            info!("Disconnected from panel at {}:{}", self.host, self.port);
        }
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        let command = Command::authenticate(password, self.device_type, self.software_version)?;
        self.authenticated = false;

        let reply = self.transact(&command).await?;
        match parse_auth_reply(&reply) {
            Ok(()) => {
                info!("Authenticated with panel");
                self.authenticated = true;
                Ok(())
            }
            Err(e) => {
                if e.is_connection_fatal() {
                    self.reset();
                } else {
                    warn!("Authentication failed: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn status(&mut self) -> Result<PanelStatus> {
        let reply = self.transact(&Command::Status).await?;
        parse_status_reply(&reply).inspect_err(|e| {
            warn!("Status request failed, dropping connection: {}", e);
            self.reset();
        })
    }

    async fn arm_system(&mut self, partition: u8) -> Result<StateToken> {
        let reply = self.transact(&Command::arm(partition)).await?;
        Ok(parse_arm_disarm_reply(&reply, true))
    }

    async fn disarm_system(&mut self, partition: u8) -> Result<StateToken> {
        let reply = self.transact(&Command::disarm(partition)).await?;
        Ok(parse_arm_disarm_reply(&reply, false))
    }

    async fn panic(&mut self, kind: PanicKind) -> Result<StateToken> {
        let reply = self.transact(&Command::Panic(kind)).await?;
        Ok(parse_panic_reply(&reply))
    }

    async fn paired_sensors(&mut self) -> Result<PairedReply> {
        let reply = self.transact(&Command::PairedSensors).await?;
        Ok(parse_paired_reply(&reply))
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
