// Implements the CRC-8 used to guard the telemetry frame and the stored settings record.

// Key Features:
// - Reflected polynomial 0x8C (Dallas/Maxim 1-Wire), LSB-first, seed 0x00, no final xor.
// - Bit-serial, table-free: eight shift/xor steps per byte.
// - Continuation form: appending the CRC to the data makes the CRC of the whole zero.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Reflected generator polynomial.
pub const CRC8_POLY: u8 = 0x8C;

/// Initial register value.
pub const CRC8_SEED: u8 = 0x00;

/// Computes the CRC over `data` starting from the standard seed.
pub fn crc8(data: &[u8]) -> u8 {
    crc8_update(CRC8_SEED, data)
}

/// Continues a CRC computation from a previous register value.
pub fn crc8_update(mut crc: u8, data: &[u8]) -> u8 {
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= CRC8_POLY;
            }
            b >>= 1;
        }
    }
    crc
}
