// Implements the CRC-16/CCITT used by the analog front-end to protect its output frames.

// Key Features:
// - Polynomial 0x1021, MSB-first, seed 0xFFFF, no final xor.
// - Bit-serial, table-free.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub const CRC16_POLY: u16 = 0x1021;
pub const CRC16_SEED: u16 = 0xFFFF;

pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(CRC16_SEED, data)
}

pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn appended_crc_yields_zero() {
        let data = [0x05, 0x00, 0x00, 0x7F, 0xFF, 0xFF, 0x80, 0x00, 0x01];
        let crc = crc16(&data);
        assert_eq!(crc16_update(crc, &crc.to_be_bytes()), 0);
    }
}
