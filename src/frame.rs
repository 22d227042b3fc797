// MIT License - Copyright (c) 2021 TJForc
// ISEC frame codec

use tracing::debug;

use crate::constants::{DST_ID, HEADER_LEN, MAX_FRAME_SIZE, OPCODE_LEN, OUR_ID, PAYLOAD_OFFSET};
use crate::error::{IsecError, Result};

/// Compute the ISEC checksum over a byte slice.
///
/// XOR fold of every byte, inverted.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b) ^ 0xFF
}

/// One protocol message unit in either direction.
///
/// Wire layout: `[dst:2][src:2][len:2][opcode:2][payload:len-2][checksum:1]`,
/// all multi-byte fields big endian. `len` counts the opcode and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: [u8; 2],
    pub source: [u8; 2],
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame addressed from this client to the panel.
    pub fn request(opcode: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            destination: DST_ID,
            source: OUR_ID,
            opcode,
            payload: payload.into(),
        }
    }

    /// Encode the frame including its trailing checksum byte.
    pub fn encode(&self) -> Vec<u8> {
        let len = (OPCODE_LEN + self.payload.len()) as u16;
        let mut out = Vec::with_capacity(PAYLOAD_OFFSET + self.payload.len() + 1);
        out.extend_from_slice(&self.destination);
        out.extend_from_slice(&self.source);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.push(checksum(&out));
        out
    }

    /// Decode and validate a complete frame.
    ///
    /// Fails with a communication error if the buffer is shorter than a
    /// minimal frame, if the declared length disagrees with the bytes
    /// received, or if the checksum does not match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PAYLOAD_OFFSET + 1 {
            return Err(IsecError::InvalidResponse {
                details: format!("frame too short: {} bytes", data.len()),
            });
        }
        if data.len() > MAX_FRAME_SIZE {
            return Err(IsecError::FrameTooLarge {
                len: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let declared = total_frame_len(&[data[0], data[1], data[2], data[3], data[4], data[5]])?;
        if declared != data.len() {
            return Err(IsecError::InvalidResponse {
                details: format!(
                    "declared frame length {} but received {} bytes",
                    declared,
                    data.len()
                ),
            });
        }

        let (body, trailer) = data.split_at(data.len() - 1);
        let expected = checksum(body);
        let actual = trailer[0];
        if expected != actual {
            debug!("Checksum Not Ok (expected {:#04x}, got {:#04x})", expected, actual);
            return Err(IsecError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            destination: [data[0], data[1]],
            source: [data[2], data[3]],
            opcode: u16::from_be_bytes([data[HEADER_LEN], data[HEADER_LEN + 1]]),
            payload: body[PAYLOAD_OFFSET..].to_vec(),
        })
    }

    /// Low byte of the opcode (reply status for acknowledgements).
    pub fn opcode_low(&self) -> u8 {
        (self.opcode & 0xFF) as u8
    }
}

/// Total number of bytes (header, body and checksum) announced by a header.
pub fn total_frame_len(header: &[u8; HEADER_LEN]) -> Result<usize> {
    let len = u16::from_be_bytes([header[4], header[5]]) as usize;
    if len < OPCODE_LEN {
        return Err(IsecError::InvalidResponse {
            details: format!("declared length {} is shorter than the opcode", len),
        });
    }
    let total = HEADER_LEN + len + 1;
    if total > MAX_FRAME_SIZE {
        return Err(IsecError::FrameTooLarge {
            len: total,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(total)
}

/// Lowercase hex rendering for wire logging.
pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::opcode;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_known_status_request() {
        // 00 00 8f ff 00 02 0b 4a
        let body = [0x00, 0x00, 0x8F, 0xFF, 0x00, 0x02, 0x0B, 0x4A];
        let expected = 0x8F ^ 0xFF ^ 0x02 ^ 0x0B ^ 0x4A ^ 0xFF;
        assert_eq!(checksum(&body), expected);
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0xFF);
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::request(opcode::STATUS, Vec::new());
        let bytes = frame.encode();
        assert_eq!(&bytes[..8], &[0x00, 0x00, 0x8F, 0xFF, 0x00, 0x02, 0x0B, 0x4A]);
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[8], checksum(&bytes[..8]));
    }

    #[test]
    fn test_encode_length_counts_opcode_and_payload() {
        let frame = Frame::request(opcode::ARM_DISARM, vec![0xFF, 0x01]);
        let bytes = frame.encode();
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 4);
        assert_eq!(&bytes[8..10], &[0xFF, 0x01]);
    }

    #[test]
    fn test_decode_valid_frame() {
        let original = Frame {
            destination: OUR_ID,
            source: DST_ID,
            opcode: opcode::STATUS,
            payload: vec![1, 2, 3, 4],
        };
        let decoded = Frame::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut bytes = Frame::request(opcode::STATUS, vec![9, 9]).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(IsecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        assert!(matches!(
            Frame::decode(&[0x00, 0x00, 0x8F]),
            Err(IsecError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut bytes = Frame::request(opcode::STATUS, vec![0xAA]).encode();
        bytes.push(0x00);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(IsecError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_total_frame_len_limits() {
        assert_eq!(total_frame_len(&[0, 0, 0, 0, 0x00, 0x02]).unwrap(), 9);
        assert!(total_frame_len(&[0, 0, 0, 0, 0x00, 0x01]).is_err());
        assert!(matches!(
            total_frame_len(&[0, 0, 0, 0, 0xFF, 0xFF]),
            Err(IsecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0x8F, 0xFF]), "008fff");
    }

    proptest! {
        #[test]
        fn prop_checksum_reproduces_trailer(
            op in any::<u16>(),
            payload in proptest::collection::vec(any::<u8>(), 0..200),
        ) {
            let bytes = Frame::request(op, payload).encode();
            let (body, trailer) = bytes.split_at(bytes.len() - 1);
            prop_assert_eq!(checksum(body), trailer[0]);
        }

        #[test]
        fn prop_single_byte_corruption_is_detected(
            op in any::<u16>(),
            payload in proptest::collection::vec(any::<u8>(), 0..200),
            position in any::<proptest::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut bytes = Frame::request(op, payload).encode();
            let idx = position.index(bytes.len());
            bytes[idx] ^= flip;
            prop_assert!(Frame::decode(&bytes).is_err());
        }
    }
}
