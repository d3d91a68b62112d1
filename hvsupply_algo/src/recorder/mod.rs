// Implements the sample recorder shared by the extract voltage sweep and the data logger.

// Key Features:
// - Four fixed-capacity channel logs (anode current, cathode, extract, focus voltage)
//   kept in RAM and read out with a debugger on a halted core.
// - Sweep and logger are mutually exclusive owners of the same buffers.
// - The control tick runs the sweep when it is active, otherwise the periodic logger;
//   the high-frequency logger runs on acquisition events instead.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub mod logger;
pub mod sweep;

pub use logger::{HfSource, Logger, LOG_INTERVAL_TICKS};
pub use sweep::{Sweep, SweepExit, SWEEP_OVERSHOOT, SWEEP_STEP_V};

use crate::system::{RegulatedValues, SweepResult, SystemFlags};

/// Samples per channel log.
pub const LOG_CAPACITY: usize = 2000;
/// Number of channel logs.
pub const LOG_CHANNELS: usize = 4;

/// Channel logs in the order they are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogChannel {
    AnodeCurrent = 0,
    CathodeVolt = 1,
    ExtractVolt = 2,
    FocusVolt = 3,
}

/// Per-channel sample buffers with a shared fill index.
pub struct SampleLog {
    buffers: [[f32; LOG_CAPACITY]; LOG_CHANNELS],
    len: usize,
}

impl SampleLog {
    pub const fn new() -> Self {
        Self {
            buffers: [[0.0; LOG_CAPACITY]; LOG_CHANNELS],
            len: 0,
        }
    }

    /// Zeroes all buffers and rewinds the index.
    pub fn clear(&mut self) {
        for buffer in self.buffers.iter_mut() {
            buffer.fill(0.0);
        }
        self.len = 0;
    }

    /// Appends one sample of every channel. Returns false, without writing, once full.
    pub fn append(&mut self, meas: &RegulatedValues) -> bool {
        if self.len >= LOG_CAPACITY {
            return false;
        }
        let i = self.len;
        self.buffers[LogChannel::AnodeCurrent as usize][i] = meas.anode_current;
        self.buffers[LogChannel::CathodeVolt as usize][i] = meas.cathode_volt;
        self.buffers[LogChannel::ExtractVolt as usize][i] = meas.extract.value;
        self.buffers[LogChannel::FocusVolt as usize][i] = meas.focus_volt;
        self.len += 1;
        true
    }

    /// Writes one value at an explicit position, for the high-frequency logger.
    pub(crate) fn write(&mut self, buffer: usize, index: usize, value: f32) {
        if let Some(slot) = self.buffers.get_mut(buffer).and_then(|b| b.get_mut(index)) {
            *slot = value;
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len >= LOG_CAPACITY
    }

    /// Full buffer of one channel, including unwritten (zero) samples.
    pub fn channel(&self, channel: LogChannel) -> &[f32; LOG_CAPACITY] {
        &self.buffers[channel as usize]
    }
}

impl Default for SampleLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample log with its two writers.
pub struct Recorder {
    log: SampleLog,
    sweep: Sweep,
    logger: Logger,
}

impl Recorder {
    pub const fn new(hf_source: HfSource) -> Self {
        Self {
            log: SampleLog::new(),
            sweep: Sweep::new(),
            logger: Logger::new(LOG_INTERVAL_TICKS, hf_source),
        }
    }

    /// Starts a sweep; a running logger is stopped first.
    pub fn start_sweep(&mut self, reference: &mut RegulatedValues, flags: &SystemFlags) {
        if flags.logger_active() {
            self.logger.stop(flags);
        }
        self.log.clear();
        self.sweep.start(reference, flags);
    }

    /// Operator cancel. Returns the exit kind if a sweep was running.
    pub fn abort_sweep(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        result: &mut SweepResult,
        flags: &SystemFlags,
    ) -> Option<SweepExit> {
        self.sweep.abort(meas, reference, result, flags)
    }

    /// Starts the logger unless a sweep owns the buffers. Returns whether it started.
    pub fn start_logger(&mut self, flags: &SystemFlags) -> bool {
        if flags.sweep_active() {
            warn!("logger: sweep running, not started");
            return false;
        }
        self.log.clear();
        self.logger.start(flags);
        true
    }

    pub fn stop_logger(&mut self, flags: &SystemFlags) {
        self.logger.stop(flags);
    }

    /// Control tick: sweep step if a sweep is running, else the periodic logger.
    pub fn tick(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        result: &mut SweepResult,
        flags: &SystemFlags,
    ) -> Option<SweepExit> {
        if flags.sweep_active() {
            self.sweep.tick(meas, reference, result, &mut self.log, flags)
        } else {
            if !reference.logger_mode.is_high_freq() {
                self.logger.tick(meas, &mut self.log, flags);
            }
            None
        }
    }

    /// Acquisition event: feeds the high-frequency logger when it is selected.
    pub fn on_acquisition(&mut self, meas: &RegulatedValues, reference: &RegulatedValues, flags: &SystemFlags) {
        if reference.logger_mode.is_high_freq() && !flags.sweep_active() {
            self.logger.sample_high_freq(meas, &mut self.log, flags);
        }
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{ExtractMode, LoggerMode};

    fn setup() -> (Recorder, RegulatedValues, RegulatedValues, SweepResult, SystemFlags) {
        let mut meas = RegulatedValues::unmeasured();
        meas.anode_current = 0.0;
        meas.cathode_volt = -2500.0;
        meas.extract.value = 0.0;
        meas.focus_volt = 0.0;
        let mut reference = RegulatedValues::startup_defaults();
        reference.extract_mode = ExtractMode::Sweep;
        (
            Recorder::new(HfSource::CathodeVolt),
            meas,
            reference,
            RegulatedValues::unmeasured(),
            SystemFlags::new(),
        )
    }

    #[test]
    fn log_saturates_at_capacity() {
        let mut log = SampleLog::new();
        let meas = RegulatedValues::startup_defaults();
        for _ in 0..LOG_CAPACITY {
            assert!(log.append(&meas));
        }
        assert!(!log.append(&meas));
        assert_eq!(log.len(), LOG_CAPACITY);
    }

    #[test]
    fn sweep_preempts_logger() {
        let (mut rec, _meas, mut reference, _result, flags) = setup();
        assert!(rec.start_logger(&flags));
        rec.start_sweep(&mut reference, &flags);
        assert!(flags.sweep_active());
        assert!(!flags.logger_active());
        assert!(!rec.start_logger(&flags));
    }

    #[test]
    fn tick_runs_periodic_logger_without_sweep() {
        let (mut rec, meas, mut reference, mut result, flags) = setup();
        reference.logger_mode = LoggerMode::Periodic;
        rec.start_logger(&flags);
        for _ in 0..LOG_INTERVAL_TICKS * 3 {
            rec.tick(&meas, &mut reference, &mut result, &flags);
        }
        assert_eq!(rec.log().len(), 3);
    }

    #[test]
    fn high_freq_logger_ignores_tick() {
        let (mut rec, meas, mut reference, mut result, flags) = setup();
        reference.logger_mode = LoggerMode::HighFreqSteady;
        rec.start_logger(&flags);
        for _ in 0..LOG_INTERVAL_TICKS * 3 {
            rec.tick(&meas, &mut reference, &mut result, &flags);
        }
        assert_eq!(rec.log().len(), 0);

        rec.on_acquisition(&meas, &reference, &flags);
        assert_eq!(rec.log().channel(LogChannel::AnodeCurrent)[0], -2500.0);
    }
}
