// MIT License - Copyright (c) 2021 TJForc
// ISEC protocol constants (Intelbras AMT-8000)

use std::time::Duration;

/// Default TCP port the panel listens on.
pub const DEFAULT_PORT: u16 = 9009;

/// Default polling interval of the update coordinator.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for a single write or read on the socket.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Destination id placed in every outbound frame.
pub const DST_ID: [u8; 2] = [0x00, 0x00];

/// Source id identifying this client to the panel.
pub const OUR_ID: [u8; 2] = [0x8F, 0xFF];

/// Device type announced during authentication.
pub const DEFAULT_DEVICE_TYPE: u8 = 0x01;

/// Software version announced during authentication.
pub const DEFAULT_SOFTWARE_VERSION: u8 = 0x10;

/// Header: destination (2) + source (2) + length (2).
pub const HEADER_LEN: usize = 6;

/// Size of the opcode field that follows the header.
pub const OPCODE_LEN: usize = 2;

/// Offset of the first payload byte inside a frame.
pub const PAYLOAD_OFFSET: usize = HEADER_LEN + OPCODE_LEN;

/// Upper bound for a single inbound frame.
pub const MAX_FRAME_SIZE: usize = 1024;

/// Length of the numeric password expected by the panel.
pub const PASSWORD_LEN: usize = 6;

/// Command opcodes.
pub mod opcode {
    pub const AUTH: u16 = 0xF0F0;
    pub const STATUS: u16 = 0x0B4A;
    pub const ARM_DISARM: u16 = 0x401E;
    pub const PANIC: u16 = 0x401A;
    pub const PAIRED_SENSORS: u16 = 0x0B01;
    /// Generic negative acknowledgement sent by the panel.
    pub const NACK: u16 = 0xF0FD;
    /// Generic positive acknowledgement sent by the panel.
    pub const ACK: u16 = 0xF0FE;
}

/// Partition byte meaning "every partition".
pub const ALL_PARTITIONS: u8 = 0xFF;

/// Mode byte of the arm/disarm command.
pub const ARM_MODE_ARM: u8 = 0x01;
pub const ARM_MODE_DISARM: u8 = 0x00;

/// Panic type selector for an audible panic.
pub const PANIC_AUDIBLE: u8 = 0x01;

/// First payload byte of a successful arm/disarm reply.
pub const ARM_DISARM_OK: u8 = 0x91;

/// Low byte of the reply opcode acknowledging a panic.
pub const PANIC_ACK: u8 = 0xFE;

/// Status payload layout.
pub mod status_layout {
    /// Model identifier byte; `1` is an AMT-8000.
    pub const MODEL: usize = 0;
    /// Three firmware version bytes (major, minor, patch).
    pub const VERSION: usize = 1;
    /// General status byte: arming bits, zone and siren flags.
    pub const GENERAL: usize = 20;
    /// First byte of the zone open/closed bitmap.
    pub const ZONES: usize = 22;
    /// Tamper byte.
    pub const TAMPER: usize = 71;
    /// Bit of the tamper byte signalling tamper.
    pub const TAMPER_MASK: u8 = 1 << 1;
    /// Battery level byte.
    pub const BATTERY: usize = 134;
}

/// Model byte reported by an AMT-8000.
pub const MODEL_AMT_8000: u8 = 0x01;

/// Maximum number of zones covered by the bitmaps.
pub const MAX_ZONES: u32 = 64;

/// Bytes needed to hold [`MAX_ZONES`] bits.
pub const ZONE_BITMAP_LEN: usize = (MAX_ZONES as usize).div_ceil(8);
