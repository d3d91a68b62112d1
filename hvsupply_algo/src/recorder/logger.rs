// Implements the data logger: a periodic all-channel recorder on the control tick and a
// high-frequency single-channel recorder on acquisition events.

// Key Features:
// - Periodic mode appends all channels every `interval` control ticks and stops once the
//   log is full (25 ticks at 10 ms: 2000 samples cover about 8 minutes).
// - High-frequency mode logs one selected channel per acquisition, filling the four
//   buffers one after another, then stops.
// - Both modes share the sample log and are selected by the logger mode of the reference.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::{SampleLog, LOG_CAPACITY, LOG_CHANNELS};
use crate::system::{RegulatedValues, SystemFlags};

/// Control ticks between two periodic samples.
pub const LOG_INTERVAL_TICKS: u32 = 25;

/// Channel recorded by the high-frequency logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HfSource {
    AnodeCurrent,
    CathodeVolt,
}

pub struct Logger {
    interval: u32,
    counter: u32,
    hf_source: HfSource,
    hf_buffer: usize, // Buffer being filled by the high-frequency logger
    hf_index: usize,  // Next position in that buffer
}

impl Logger {
    pub const fn new(interval: u32, hf_source: HfSource) -> Self {
        Self {
            interval,
            counter: 0,
            hf_source,
            hf_buffer: 0,
            hf_index: 0,
        }
    }

    /// Rewinds both recorders and marks the logger active. The caller clears the log.
    pub fn start(&mut self, flags: &SystemFlags) {
        self.counter = 0;
        self.hf_buffer = 0;
        self.hf_index = 0;
        flags.set_logger_active(true);
        info!("logger: start");
    }

    pub fn stop(&mut self, flags: &SystemFlags) {
        if flags.logger_active() {
            flags.set_logger_active(false);
            info!("logger: stop");
        }
    }

    /// Periodic recorder, called on every control tick.
    pub fn tick(&mut self, meas: &RegulatedValues, log: &mut SampleLog, flags: &SystemFlags) {
        if !flags.logger_active() {
            return;
        }
        self.counter += 1;
        if self.counter < self.interval {
            return;
        }
        self.counter = 0;

        log.append(meas);
        if log.is_full() {
            flags.set_logger_active(false);
            info!("logger: full");
        }
    }

    /// High-frequency recorder, called on every acquisition.
    pub fn sample_high_freq(&mut self, meas: &RegulatedValues, log: &mut SampleLog, flags: &SystemFlags) {
        if !flags.logger_active() || self.hf_buffer >= LOG_CHANNELS {
            return;
        }
        let value = match self.hf_source {
            HfSource::AnodeCurrent => meas.anode_current,
            HfSource::CathodeVolt => meas.cathode_volt,
        };
        log.write(self.hf_buffer, self.hf_index, value);
        self.hf_index += 1;

        if self.hf_index >= LOG_CAPACITY {
            self.hf_index = 0;
            self.hf_buffer += 1;
            if self.hf_buffer >= LOG_CHANNELS {
                flags.set_logger_active(false);
                info!("logger: full");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::LogChannel;
    use super::*;

    fn meas_with(current: f32, cathode: f32) -> RegulatedValues {
        let mut meas = RegulatedValues::unmeasured();
        meas.anode_current = current;
        meas.cathode_volt = cathode;
        meas
    }

    #[test]
    fn periodic_stops_when_full() {
        let flags = SystemFlags::new();
        let mut log = SampleLog::new();
        let mut logger = Logger::new(2, HfSource::CathodeVolt);
        logger.start(&flags);

        let meas = meas_with(1.0e-6, -2500.0);
        for _ in 0..LOG_CAPACITY * 2 - 1 {
            logger.tick(&meas, &mut log, &flags);
        }
        assert_eq!(log.len(), LOG_CAPACITY - 1);
        assert!(flags.logger_active());

        logger.tick(&meas, &mut log, &flags);
        assert_eq!(log.len(), LOG_CAPACITY);
        assert!(!flags.logger_active());
    }

    #[test]
    fn high_freq_round_robins_all_buffers() {
        let flags = SystemFlags::new();
        let mut log = SampleLog::new();
        let mut logger = Logger::new(LOG_INTERVAL_TICKS, HfSource::CathodeVolt);
        logger.start(&flags);

        for i in 0..LOG_CAPACITY * LOG_CHANNELS {
            let buffer = i / LOG_CAPACITY;
            logger.sample_high_freq(&meas_with(0.0, -(buffer as f32) - 1.0), &mut log, &flags);
        }
        assert!(!flags.logger_active());
        assert_eq!(log.channel(LogChannel::AnodeCurrent)[LOG_CAPACITY - 1], -1.0);
        assert_eq!(log.channel(LogChannel::CathodeVolt)[0], -2.0);
        assert_eq!(log.channel(LogChannel::FocusVolt)[LOG_CAPACITY - 1], -4.0);

        // Inactive logger leaves the buffers alone
        logger.sample_high_freq(&meas_with(0.0, 99.0), &mut log, &flags);
        assert_eq!(log.channel(LogChannel::AnodeCurrent)[0], -1.0);
    }
}
