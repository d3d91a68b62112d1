// Implements the persisted operator settings: the reference record with a CRC-8 guard.

// Key Features:
// - Fixed-size record: [payload length][postcard encoded reference][crc8 over both].
// - Load yields `None` on storage errors, erased storage or checksum mismatch; the
//   caller falls back to the built-in defaults.
// - The fixed-point anode current is the stored source of truth; the float is re-derived.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_integer::crc8::crc8;
use crate::system::RegulatedValues;

/// Bytes reserved for one record.
pub const SETTINGS_RECORD_LEN: usize = 64;
const MAX_PAYLOAD: usize = SETTINGS_RECORD_LEN - 2;

/// Non-volatile slot holding one settings record.
pub trait SettingsStorage {
    type Error;

    fn read(&mut self, record: &mut [u8; SETTINGS_RECORD_LEN]) -> Result<(), Self::Error>;
    fn write(&mut self, record: &[u8; SETTINGS_RECORD_LEN]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError<E> {
    #[error("settings storage access failed")]
    Storage(E),
    #[error("settings record corrupt")]
    Corrupt,
    #[error("settings do not fit the record")]
    Encode,
}

/// Serializes `reference` into a record.
pub fn encode<E>(reference: &RegulatedValues) -> Result<[u8; SETTINGS_RECORD_LEN], SettingsError<E>> {
    let mut record = [0xFF; SETTINGS_RECORD_LEN];
    let len = postcard::to_slice(reference, &mut record[1..1 + MAX_PAYLOAD])
        .map_err(|_| SettingsError::Encode)?
        .len();
    record[0] = len as u8;
    record[1 + len] = crc8(&record[..1 + len]);
    Ok(record)
}

/// Parses a record, checking length and checksum.
pub fn decode<E>(record: &[u8; SETTINGS_RECORD_LEN]) -> Result<RegulatedValues, SettingsError<E>> {
    let len = record[0] as usize;
    if len == 0 || len > MAX_PAYLOAD {
        return Err(SettingsError::Corrupt); // Erased storage reads 0xFF
    }
    if crc8(&record[..1 + len]) != record[1 + len] {
        return Err(SettingsError::Corrupt);
    }
    let mut reference: RegulatedValues =
        postcard::from_bytes(&record[1..1 + len]).map_err(|_| SettingsError::Corrupt)?;
    reference.sync_anode_current();
    Ok(reference)
}

/// Reads the stored reference record.
pub fn load<S: SettingsStorage>(storage: &mut S) -> Option<RegulatedValues> {
    let mut record = [0u8; SETTINGS_RECORD_LEN];
    storage.read(&mut record).ok()?;
    decode::<S::Error>(&record).ok()
}

/// Reads the stored reference record, falling back to the startup defaults.
pub fn load_or_default<S: SettingsStorage>(storage: &mut S) -> RegulatedValues {
    match load(storage) {
        Some(reference) => {
            info!("settings: loaded");
            reference
        }
        None => {
            warn!("settings: no valid record, using defaults");
            RegulatedValues::startup_defaults()
        }
    }
}

/// Stores `reference`.
pub fn save<S: SettingsStorage>(storage: &mut S, reference: &RegulatedValues) -> Result<(), SettingsError<S::Error>> {
    let record = encode::<S::Error>(reference)?;
    storage.write(&record).map_err(SettingsError::Storage)?;
    info!("settings: saved");
    Ok(())
}
