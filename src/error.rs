// MIT License - Copyright (c) 2021 TJForc
// Error taxonomy

use std::fmt;

/// Reasons the panel gives for refusing an authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthRejection {
    /// 0x01 - Invalid password
    InvalidPassword,
    /// 0x02 - Incorrect software version
    IncorrectSoftwareVersion,
    /// 0x03 - Alarm panel will call back
    PanelWillCallBack,
    /// 0x04 - Waiting for user permission
    WaitingUserPermission,
}

impl AuthRejection {
    /// Parse the result byte of an authentication reply.
    ///
    /// Returns `None` for `0x00` (accepted) and for codes the panel is not
    /// documented to send.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::InvalidPassword),
            0x02 => Some(Self::IncorrectSoftwareVersion),
            0x03 => Some(Self::PanelWillCallBack),
            0x04 => Some(Self::WaitingUserPermission),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidPassword => 0x01,
            Self::IncorrectSoftwareVersion => 0x02,
            Self::PanelWillCallBack => 0x03,
            Self::WaitingUserPermission => 0x04,
        }
    }

    /// Human-readable description of the rejection.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidPassword => "Invalid password",
            Self::IncorrectSoftwareVersion => "Incorrect software version",
            Self::PanelWillCallBack => "Alarm panel will call back",
            Self::WaitingUserPermission => "Waiting for user permission",
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}: {}", self.code(), self.description())
    }
}

/// The two failure families seen at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket level failure, timeout, short/corrupt frame.
    Communication,
    /// The panel refused the credentials.
    Auth,
}

/// All errors that can occur in the isec-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum IsecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("Timed out waiting for panel reply")]
    ReadTimeout,

    #[error("Timed out sending command")]
    WriteTimeout,

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },

    #[error("Authentication rejected: {0}")]
    AuthRejected(AuthRejection),

    #[error("Password must be exactly 6 digits")]
    MalformedPassword,

    #[error("Panel worker stopped")]
    WorkerStopped,
}

impl IsecError {
    /// Which side of the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IsecError::AuthRejected(_) => ErrorKind::Auth,
            _ => ErrorKind::Communication,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    pub fn is_communication(&self) -> bool {
        self.kind() == ErrorKind::Communication
    }

    /// Whether the socket can no longer be trusted after this error.
    ///
    /// A rejected password leaves the socket intact; every failure on the
    /// wire itself does not.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            IsecError::Io(_)
                | IsecError::ConnectTimeout
                | IsecError::ReadTimeout
                | IsecError::WriteTimeout
                | IsecError::Disconnected
                | IsecError::ChecksumMismatch { .. }
                | IsecError::FrameTooLarge { .. }
                | IsecError::InvalidResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IsecError>;

/// Failure of one poll cycle, carrying the underlying error's message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error communicating with panel: {message}")]
pub struct UpdateFailed {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&IsecError> for UpdateFailed {
    fn from(err: &IsecError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
