// Implements the extract voltage sweep: an automatic ramp of the user extract voltage
// that records every channel and captures the anode current peak.

// Key Features:
// - Start saves and zeroes the user extract voltage and clears the peak capture.
// - Each control tick logs all channels, ramps the user voltage by a fixed step up to
//   110 % of the configured limit and tracks the highest anode current seen.
// - Exit once the measured extract voltage passes the limit; the result carries the peak,
//   or NaN if no peak was captured or the sweep was aborted.
// - The user voltage saved at start is restored on every exit.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::SampleLog;
use crate::system::{ExtractMode, RegulatedValues, SweepResult, SystemFlags};

/// Ramp step per control tick: 2000 ticks cover 500 V.
pub const SWEEP_STEP_V: f32 = 0.25;
/// Ramp stops at this multiple of the extract limit.
pub const SWEEP_OVERSHOOT: f32 = 1.1;

/// How a sweep ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SweepExit {
    /// Limit reached, peak captured.
    Completed,
    /// Limit reached without any anode current.
    NoPeak,
    /// Cancelled by the operator.
    Aborted,
}

pub struct Sweep {
    saved_user: f32,   // User extract voltage before the sweep
    peak_current: f32, // Highest anode current seen
    peak_volt: f32,    // Extract voltage at the peak
    falling: u32,      // Ticks since the last new peak
}

impl Sweep {
    pub const fn new() -> Self {
        Self {
            saved_user: 0.0,
            peak_current: 0.0,
            peak_volt: 0.0,
            falling: 0,
        }
    }

    /// Prepares the ramp. The caller clears the sample log.
    pub fn start(&mut self, reference: &mut RegulatedValues, flags: &SystemFlags) {
        self.saved_user = reference.extract.user;
        reference.extract.user = 0.0;
        self.peak_current = 0.0;
        self.peak_volt = 0.0;
        self.falling = 0;
        flags.set_sweep_active(true);
        info!("sweep: start, limit {} V", reference.extract.limit);
    }

    /// One control tick. Returns the exit kind on the tick the sweep ends.
    pub fn tick(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        result: &mut SweepResult,
        log: &mut SampleLog,
        flags: &SystemFlags,
    ) -> Option<SweepExit> {
        if !flags.sweep_active() || reference.extract_mode != ExtractMode::Sweep {
            return None;
        }

        log.append(meas); // Silently stops once full

        let ceiling = reference.extract.limit * SWEEP_OVERSHOOT;
        if reference.extract.user < ceiling {
            reference.extract.user = (reference.extract.user + SWEEP_STEP_V).min(ceiling);
        }

        if meas.anode_current > self.peak_current {
            self.peak_current = meas.anode_current;
            self.peak_volt = meas.extract.value;
            self.falling = 0;
        } else {
            self.falling = self.falling.saturating_add(1);
        }

        if meas.extract.value > reference.extract.limit {
            let exit = if self.peak_current > 0.0 {
                SweepExit::Completed
            } else {
                SweepExit::NoPeak
            };
            self.finish(exit, meas, reference, result, flags);
            return Some(exit);
        }
        None
    }

    /// Cancels a running sweep.
    pub fn abort(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        result: &mut SweepResult,
        flags: &SystemFlags,
    ) -> Option<SweepExit> {
        if !flags.sweep_active() {
            return None;
        }
        self.finish(SweepExit::Aborted, meas, reference, result, flags);
        Some(SweepExit::Aborted)
    }

    fn finish(
        &mut self,
        exit: SweepExit,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        result: &mut SweepResult,
        flags: &SystemFlags,
    ) {
        *result = *meas;
        if exit == SweepExit::Completed {
            result.anode_current = self.peak_current;
            result.extract.value = self.peak_volt;
        } else {
            result.anode_current = f32::NAN;
            result.extract.value = f32::NAN;
        }
        reference.extract.user = self.saved_user;
        flags.set_sweep_active(false);
        info!("sweep: {}, peak {} A at {} V", exit, result.anode_current, result.extract.value);
    }

    /// Ticks since the peak last increased.
    pub fn falling_count(&self) -> u32 {
        self.falling
    }
}

impl Default for Sweep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::LOG_CAPACITY;
    use super::*;

    struct Bench {
        sweep: Sweep,
        log: SampleLog,
        meas: RegulatedValues,
        reference: RegulatedValues,
        result: SweepResult,
        flags: SystemFlags,
    }

    impl Bench {
        fn new() -> Self {
            let mut meas = RegulatedValues::unmeasured();
            meas.anode_current = 0.0;
            meas.extract.value = 0.0;
            let mut reference = RegulatedValues::startup_defaults();
            reference.extract_mode = ExtractMode::Sweep;
            reference.extract.limit = 500.0;
            reference.extract.user = 123.0;
            Self {
                sweep: Sweep::new(),
                log: SampleLog::new(),
                meas,
                reference,
                result: RegulatedValues::unmeasured(),
                flags: SystemFlags::new(),
            }
        }

        fn start(&mut self) {
            self.log.clear();
            self.sweep.start(&mut self.reference, &self.flags);
        }

        fn tick(&mut self) -> Option<SweepExit> {
            self.sweep.tick(
                &self.meas,
                &mut self.reference,
                &mut self.result,
                &mut self.log,
                &self.flags,
            )
        }
    }

    #[test]
    fn log_index_saturates_after_2000_ticks() {
        let mut b = Bench::new();
        b.start();
        assert_eq!(b.reference.extract.user, 0.0);

        for _ in 0..LOG_CAPACITY {
            assert_eq!(b.tick(), None);
        }
        assert_eq!(b.log.len(), LOG_CAPACITY);
        assert_eq!(b.reference.extract.user, 500.0);

        for _ in 0..500 {
            assert_eq!(b.tick(), None);
        }
        assert_eq!(b.log.len(), LOG_CAPACITY);
        // Ramp capped at 110 % of the limit
        assert_eq!(b.reference.extract.user, 550.0);
        assert!(b.flags.sweep_active());
    }

    #[test]
    fn ramp_stops_exactly_at_overshoot_bound() {
        let mut b = Bench::new();
        b.reference.extract.limit = 10.1; // 110 % is not a multiple of the step
        b.start();

        for _ in 0..100 {
            assert_eq!(b.tick(), None);
            assert!(b.reference.extract.user <= 10.1 * SWEEP_OVERSHOOT);
        }
        assert_eq!(b.reference.extract.user, 10.1 * SWEEP_OVERSHOOT);
    }

    #[test]
    fn exit_captures_peak_and_restores_user_voltage() {
        let mut b = Bench::new();
        b.start();

        let profile = [(100.0, 1.0e-6), (200.0, 3.0e-6), (300.0, 2.0e-6), (400.0, 1.0e-6)];
        for &(volt, current) in &profile {
            b.meas.extract.value = volt;
            b.meas.anode_current = current;
            assert_eq!(b.tick(), None);
        }
        assert_eq!(b.sweep.falling_count(), 2);

        b.meas.extract.value = 501.0;
        b.meas.anode_current = 0.5e-6;
        assert_eq!(b.tick(), Some(SweepExit::Completed));

        assert_eq!(b.result.anode_current, 3.0e-6);
        assert_eq!(b.result.extract.value, 200.0);
        assert_eq!(b.reference.extract.user, 123.0);
        assert!(!b.flags.sweep_active());
        assert_eq!(b.tick(), None);
    }

    #[test]
    fn abort_reports_nan() {
        let mut b = Bench::new();
        b.start();
        b.meas.anode_current = 1.0e-6;
        b.tick();

        let exit = b
            .sweep
            .abort(&b.meas, &mut b.reference, &mut b.result, &b.flags);
        assert_eq!(exit, Some(SweepExit::Aborted));
        assert!(b.result.anode_current.is_nan());
        assert!(b.result.extract.value.is_nan());
        assert_eq!(b.reference.extract.user, 123.0);
    }

    #[test]
    fn no_current_means_no_peak() {
        let mut b = Bench::new();
        b.start();
        b.meas.extract.value = 600.0;
        assert_eq!(b.tick(), Some(SweepExit::NoPeak));
        assert!(b.result.anode_current.is_nan());
    }

    #[test]
    fn idle_outside_sweep_mode() {
        let mut b = Bench::new();
        b.start();
        b.reference.extract_mode = ExtractMode::Steady;
        assert_eq!(b.tick(), None);
        assert_eq!(b.log.len(), 0);
        assert_eq!(b.reference.extract.user, 0.0);
    }
}
