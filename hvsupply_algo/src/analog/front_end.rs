// Implements decoding of the ADS131M02 output frame.

// Key Features:
// - Four 24-bit words per frame: status, channel 0, channel 1, CRC.
// - Channel words are two's complement and sign-extended to `i32`.
// - The frame is valid when the CRC-16/CCITT over the first three words matches
//   the CRC word sent by the converter.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::sampling::{RawFrame, FRONT_END_CHANNELS};
use crate::math_integer::crc16::crc16;

/// Bytes per word at the default 24-bit word length.
pub const WORD_LEN: usize = 3;
/// Status, channels, CRC.
pub const FRAME_WORDS: usize = 2 + FRONT_END_CHANNELS;
pub const FRONT_END_FRAME_LEN: usize = FRAME_WORDS * WORD_LEN;

const CRC_OFFSET: usize = (FRAME_WORDS - 1) * WORD_LEN;

/// Sign-extends one 24-bit big-endian word.
#[inline(always)]
fn sign_extend(word: &[u8]) -> i32 {
    (((word[0] as u32) << 24 | (word[1] as u32) << 16 | (word[2] as u32) << 8) as i32) >> 8
}

/// Decodes one frame clocked out of the converter.
pub fn decode_frame(frame: &[u8; FRONT_END_FRAME_LEN]) -> RawFrame {
    let mut codes = [0i32; FRONT_END_CHANNELS];
    for (channel, code) in codes.iter_mut().enumerate() {
        let start = (channel + 1) * WORD_LEN;
        *code = sign_extend(&frame[start..start + WORD_LEN]);
    }
    let received = u16::from_be_bytes([frame[CRC_OFFSET], frame[CRC_OFFSET + 1]]);
    RawFrame {
        codes,
        valid: crc16(&frame[..CRC_OFFSET]) == received,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(words: [[u8; 3]; 3]) -> [u8; FRONT_END_FRAME_LEN] {
        let mut frame = [0u8; FRONT_END_FRAME_LEN];
        for (i, word) in words.iter().enumerate() {
            frame[i * WORD_LEN..(i + 1) * WORD_LEN].copy_from_slice(word);
        }
        let crc = crc16(&frame[..CRC_OFFSET]).to_be_bytes();
        frame[CRC_OFFSET] = crc[0];
        frame[CRC_OFFSET + 1] = crc[1];
        frame
    }

    #[test]
    fn channel_words_are_sign_extended() {
        let raw = decode_frame(&frame([[0x05, 0x00, 0x00], [0xFF, 0xFF, 0xFF], [0x80, 0x00, 0x00]]));
        assert!(raw.valid);
        assert_eq!(raw.codes, [-1, -8_388_608]);

        let raw = decode_frame(&frame([[0x05, 0x00, 0x00], [0x7F, 0xFF, 0xFF], [0x00, 0x00, 0x01]]));
        assert_eq!(raw.codes, [8_388_607, 1]);
    }

    #[test]
    fn corrupted_frame_is_invalid() {
        let mut bytes = frame([[0x05, 0x00, 0x00], [0x00, 0x10, 0x00], [0x00, 0x20, 0x00]]);
        bytes[4] ^= 0x40;
        assert!(!decode_frame(&bytes).valid);
    }
}
