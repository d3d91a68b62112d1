// Implements the settings record storage in the last flash page.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    flash::{Bank, Flash},
    pac::FLASH,
};

use hvsupply_algo::settings::{SettingsStorage, SETTINGS_RECORD_LEN};

/// Last 2 KiB page of the 256 KiB device.
pub const SETTINGS_PAGE: usize = 127;
const PAGE_SIZE: usize = 2048;
const FLASH_BASE: usize = 0x0800_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum FlashError {
    Erase,
    Program,
}

pub struct FlashSettings {
    flash: Flash,
}

impl FlashSettings {
    pub fn new(regs: FLASH) -> Self {
        FlashSettings {
            flash: Flash::new(regs),
        }
    }
}

impl SettingsStorage for FlashSettings {
    type Error = FlashError;

    fn read(&mut self, record: &mut [u8; SETTINGS_RECORD_LEN]) -> Result<(), FlashError> {
        let address = FLASH_BASE + SETTINGS_PAGE * PAGE_SIZE;
        // Memory-mapped flash, the page is reserved for this record
        let stored = unsafe { core::slice::from_raw_parts(address as *const u8, SETTINGS_RECORD_LEN) };
        record.copy_from_slice(stored);
        Ok(())
    }

    fn write(&mut self, record: &[u8; SETTINGS_RECORD_LEN]) -> Result<(), FlashError> {
        self.flash
            .erase_page(Bank::B1, SETTINGS_PAGE)
            .map_err(|_| FlashError::Erase)?;
        self.flash
            .write_page(Bank::B1, SETTINGS_PAGE, record)
            .map_err(|_| FlashError::Program)
    }
}
