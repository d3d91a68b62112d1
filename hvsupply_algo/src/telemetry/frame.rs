// Wire format of the telemetry frame.
//
// [f32 extract volt LE][f32 focus volt LE][crc8 over the 8 payload bytes]

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_integer::crc8::crc8;
use crate::system::RegulatedValues;

pub const PAYLOAD_LEN: usize = 8;
pub const FRAME_LEN: usize = PAYLOAD_LEN + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    #[error("frame of {0} bytes, expected 9")]
    Length(usize),
    #[error("crc mismatch: computed {computed:#04x}, received {received:#04x}")]
    Crc { computed: u8, received: u8 },
}

/// Measurements carried from the high side to the low side.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommFrame {
    pub extract_volt: f32,
    pub focus_volt: f32,
}

impl CommFrame {
    pub fn from_meas(meas: &RegulatedValues) -> Self {
        Self {
            extract_volt: meas.extract.value,
            focus_volt: meas.focus_volt,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..4].copy_from_slice(&self.extract_volt.to_le_bytes());
        buf[4..8].copy_from_slice(&self.focus_volt.to_le_bytes());
        buf[PAYLOAD_LEN] = crc8(&buf[..PAYLOAD_LEN]);
        buf
    }

    /// Parses a complete frame. The CRC is the only correctness check.
    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        if bytes.len() != FRAME_LEN {
            return Err(LinkError::Length(bytes.len()));
        }
        let computed = crc8(&bytes[..PAYLOAD_LEN]);
        let received = bytes[PAYLOAD_LEN];
        if computed != received {
            return Err(LinkError::Crc { computed, received });
        }

        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[0..4]);
        let extract_volt = f32::from_le_bytes(word);
        word.copy_from_slice(&bytes[4..8]);
        let focus_volt = f32::from_le_bytes(word);

        Ok(Self {
            extract_volt,
            focus_volt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let frame = CommFrame {
            extract_volt: 500.0,
            focus_volt: 0.6,
        };
        let bytes = frame.encode();
        assert_eq!(&bytes[0..4], &500.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0.6f32.to_le_bytes());
        assert_eq!(crc8(&bytes), 0);
        assert_eq!(CommFrame::decode(&bytes), Ok(frame));
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let mut bytes = CommFrame {
            extract_volt: 1234.5,
            focus_volt: -12.0,
        }
        .encode();
        bytes[2] ^= 0x10;
        assert!(matches!(CommFrame::decode(&bytes), Err(LinkError::Crc { .. })));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let bytes = CommFrame {
            extract_volt: 1.0,
            focus_volt: 2.0,
        }
        .encode();
        assert_eq!(CommFrame::decode(&bytes[..8]), Err(LinkError::Length(8)));
    }
}
