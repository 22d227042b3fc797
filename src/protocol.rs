// MIT License - Copyright (c) 2021 TJForc
// ISEC commands and reply decoding

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    ALL_PARTITIONS, ARM_DISARM_OK, ARM_MODE_ARM, ARM_MODE_DISARM, PANIC_ACK, PANIC_AUDIBLE,
    PASSWORD_LEN, opcode,
};
use crate::devices::system::PanelStatus;
use crate::devices::zone::PairedSensors;
use crate::error::{AuthRejection, IsecError, Result};
use crate::frame::Frame;

/// Panic type selector sent with the panic command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicKind {
    #[default]
    Audible,
    /// Raw selector byte for panic types this crate does not name.
    Other(u8),
}

impl PanicKind {
    pub fn code(&self) -> u8 {
        match self {
            Self::Audible => PANIC_AUDIBLE,
            Self::Other(code) => *code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            PANIC_AUDIBLE => Self::Audible,
            other => Self::Other(other),
        }
    }
}

/// Commands that can be sent to the panel.
///
/// Every command is a single request frame answered by exactly one reply
/// frame. There is no pipelining; the client sends one and waits.
///
/// | command        | opcode | payload                                 |
/// |----------------|--------|-----------------------------------------|
/// | Authenticate   | `F0F0` | device type, 6 password digits, sw ver  |
/// | Status         | `0B4A` | none                                    |
/// | ArmDisarm      | `401E` | partition (`FF` = all), mode            |
/// | Panic          | `401A` | panic type                              |
/// | PairedSensors  | `0B01` | none                                    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a session. Password digits are sent one byte each (value 0-9).
    Authenticate {
        device_type: u8,
        password: [u8; PASSWORD_LEN],
        software_version: u8,
    },
    /// Full status dump.
    Status,
    /// Arm (`arm = true`) or disarm a partition. `partition` is the
    /// zero-based index; 0 addresses every partition.
    ArmDisarm { partition: u8, arm: bool },
    /// Trigger a panic alarm.
    Panic(PanicKind),
    /// Query which zones have a sensor paired.
    PairedSensors,
}

impl Command {
    pub fn arm(partition: u8) -> Self {
        Self::ArmDisarm {
            partition,
            arm: true,
        }
    }

    pub fn disarm(partition: u8) -> Self {
        Self::ArmDisarm {
            partition,
            arm: false,
        }
    }

    /// Build an authentication command, validating the password format.
    pub fn authenticate(password: &str, device_type: u8, software_version: u8) -> Result<Self> {
        Ok(Self::Authenticate {
            device_type,
            password: encode_password(password)?,
            software_version,
        })
    }

    pub fn opcode(&self) -> u16 {
        match self {
            Self::Authenticate { .. } => opcode::AUTH,
            Self::Status => opcode::STATUS,
            Self::ArmDisarm { .. } => opcode::ARM_DISARM,
            Self::Panic(_) => opcode::PANIC,
            Self::PairedSensors => opcode::PAIRED_SENSORS,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Authenticate {
                device_type,
                password,
                software_version,
            } => {
                let mut payload = Vec::with_capacity(PASSWORD_LEN + 2);
                payload.push(*device_type);
                payload.extend_from_slice(password);
                payload.push(*software_version);
                payload
            }
            Self::Status | Self::PairedSensors => Vec::new(),
            Self::ArmDisarm { partition, arm } => {
                let mode = if *arm { ARM_MODE_ARM } else { ARM_MODE_DISARM };
                vec![wire_partition(*partition), mode]
            }
            Self::Panic(kind) => vec![kind.code()],
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::request(self.opcode(), self.payload())
    }

    /// Short name used in logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Status => "status",
            Self::ArmDisarm { arm: true, .. } => "arm",
            Self::ArmDisarm { arm: false, .. } => "disarm",
            Self::Panic(_) => "panic",
            Self::PairedSensors => "paired_sensors",
        }
    }
}

/// Map a zero-based partition index to its wire value (0 means "all").
pub fn wire_partition(partition: u8) -> u8 {
    if partition == 0 { ALL_PARTITIONS } else { partition }
}

/// Convert a 6-digit numeric password into one byte per digit.
pub fn encode_password(password: &str) -> Result<[u8; PASSWORD_LEN]> {
    let bytes = password.as_bytes();
    if bytes.len() != PASSWORD_LEN || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(IsecError::MalformedPassword);
    }
    let mut digits = [0u8; PASSWORD_LEN];
    for (dst, src) in digits.iter_mut().zip(bytes) {
        *dst = src - b'0';
    }
    Ok(digits)
}

/// Outcome of a state-changing command as reported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateToken {
    Armed,
    NotArmed,
    Disarmed,
    NotDisarmed,
    Triggered,
    NotTriggered,
}

impl StateToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Armed => "armed",
            Self::NotArmed => "not_armed",
            Self::Disarmed => "disarmed",
            Self::NotDisarmed => "not_disarmed",
            Self::Triggered => "triggered",
            Self::NotTriggered => "not_triggered",
        }
    }

    /// Whether the panel reported the requested effect.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Armed | Self::Disarmed | Self::Triggered)
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret an authentication reply.
///
/// Result byte 0 accepts; 1-4 are documented rejections. Anything else,
/// including a missing result byte, is a communication failure.
pub fn parse_auth_reply(frame: &Frame) -> Result<()> {
    let Some(&code) = frame.payload.first() else {
        return Err(IsecError::InvalidResponse {
            details: "empty authentication reply".to_string(),
        });
    };
    if code == 0 {
        return Ok(());
    }
    match AuthRejection::from_code(code) {
        Some(reason) => Err(IsecError::AuthRejected(reason)),
        None => Err(IsecError::InvalidResponse {
            details: format!("unknown authentication result {:#04x}", code),
        }),
    }
}

/// Decode a status reply.
///
/// Only a reply carrying the status opcode is decoded; a NACK or any other
/// reply type is a failed poll, never an all-unknown status.
pub fn parse_status_reply(frame: &Frame) -> Result<PanelStatus> {
    if frame.opcode != opcode::STATUS {
        return Err(IsecError::InvalidResponse {
            details: format!("unexpected status reply opcode {:#06x}", frame.opcode),
        });
    }
    Ok(PanelStatus::decode(&frame.payload))
}

/// Interpret the reply to an arm or disarm command.
pub fn parse_arm_disarm_reply(frame: &Frame, arm: bool) -> StateToken {
    let ok = frame.payload.first() == Some(&ARM_DISARM_OK);
    if !ok {
        debug!(
            "Arm/disarm not confirmed (opcode {:#06x}, first byte {:?})",
            frame.opcode,
            frame.payload.first()
        );
    }
    match (arm, ok) {
        (true, true) => StateToken::Armed,
        (true, false) => StateToken::NotArmed,
        (false, true) => StateToken::Disarmed,
        (false, false) => StateToken::NotDisarmed,
    }
}

/// Interpret the reply to a panic command.
pub fn parse_panic_reply(frame: &Frame) -> StateToken {
    if frame.opcode_low() == PANIC_ACK {
        StateToken::Triggered
    } else {
        StateToken::NotTriggered
    }
}

/// Reply to the paired-sensors query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairedReply {
    Paired(PairedSensors),
    /// The panel answered with a negative acknowledgement.
    Rejected,
}

pub fn parse_paired_reply(frame: &Frame) -> PairedReply {
    if frame.opcode == opcode::NACK {
        warn!("Panel rejected the paired sensors query");
        return PairedReply::Rejected;
    }
    PairedReply::Paired(PairedSensors::decode(&frame.payload))
}
