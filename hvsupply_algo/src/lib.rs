#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod analog;
pub mod indicator;
pub mod math_float;
pub mod math_integer;
pub mod operator;
pub mod recorder;
pub mod regulator;
pub mod settings;
pub mod system;
pub mod telemetry;

use analog::calibration::PumpCalibration;
use recorder::{Recorder, SweepExit};
use regulator::{PwmOutput, Regulator, RegulatorError, TickControl};
use system::{LoggerMode, RegulatedValues, SweepResult, SystemFlags};

/// Low-side supply core: the regulation engine and the sweep/logger sharing its tick.
pub struct SupplyController<'a, P: PwmOutput, T: TickControl> {
    regulator: Regulator,
    recorder: &'a mut Recorder, // Large buffers, placed in static storage by the caller
    pwm: P,                     // Power stage outputs
    tick: T,                    // Timer producing the control tick
}

impl<'a, P: PwmOutput, T: TickControl> SupplyController<'a, P, T> {
    /// Create a controller with every loop stopped and the outputs at zero.
    pub fn new(pump: PumpCalibration, recorder: &'a mut Recorder, mut pwm: P, tick: T) -> Self {
        for channel in regulator::PwmChannel::ALL {
            pwm.set_duty(channel, 0.0);
        }
        Self {
            regulator: Regulator::new(pump),
            recorder,
            pwm,
            tick,
        }
    }

    /// Control tick: sweep or periodic logger first, then the loops.
    ///
    /// The sweep ramps `reference.extract.user` before the extract loop reads it,
    /// so the new value takes effect in the same tick.
    pub fn tick(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        sweep_result: &mut SweepResult,
        flags: &SystemFlags,
    ) -> Option<SweepExit> {
        let exit = self.recorder.tick(meas, reference, sweep_result, flags);
        self.regulator
            .tick(meas, reference, flags.communication_ok(), &mut self.pwm);
        exit
    }

    /// Acquisition event, feeds the high-frequency logger.
    #[inline(always)]
    pub fn on_acquisition(&mut self, meas: &RegulatedValues, reference: &RegulatedValues, flags: &SystemFlags) {
        self.recorder.on_acquisition(meas, reference, flags);
    }

    /// Starts regulation once the high side reports. Returns whether the loops were started now.
    pub fn link_up(&mut self, reference: &RegulatedValues, flags: &SystemFlags) -> Result<bool, RegulatorError> {
        if self.regulator.is_running() || !flags.high_side_powered() {
            return Ok(false);
        }
        self.regulator.init(reference, &mut self.tick);
        self.regulator.init_current(reference)?;
        if reference.logger_mode == LoggerMode::HighFreqStartup {
            self.recorder.start_logger(flags);
        }
        Ok(true)
    }

    /// Stops regulation. A hard link error after this leaves the receiver stopped until power returns.
    pub fn power_off(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        sweep_result: &mut SweepResult,
        flags: &SystemFlags,
    ) {
        flags.set_high_side_powered(false);
        self.recorder.abort_sweep(meas, reference, sweep_result, flags);
        self.recorder.stop_logger(flags);
        self.regulator.deinit(&mut self.pwm, &mut self.tick);
    }

    pub fn regulator(&self) -> &Regulator {
        &self.regulator
    }

    pub fn recorder(&self) -> &Recorder {
        self.recorder
    }

    /// Control tick timer, the interrupt handler acknowledges through it.
    pub fn tick_timer_mut(&mut self) -> &mut T {
        &mut self.tick
    }

    pub(crate) fn parts(&mut self) -> (&mut Regulator, &mut Recorder, &mut P) {
        (&mut self.regulator, &mut *self.recorder, &mut self.pwm)
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use crate::analog::calibration::Calibration;
    use crate::recorder::HfSource;
    use crate::regulator::mock::{MockPwm, MockTick};

    pub type TestController<'a> = SupplyController<'a, MockPwm, MockTick>;

    pub fn recorder() -> Box<Recorder> {
        Box::new(Recorder::new(HfSource::CathodeVolt))
    }

    pub fn controller(recorder: &mut Recorder) -> TestController<'_> {
        SupplyController::new(
            Calibration::trimmed().pump,
            recorder,
            MockPwm::default(),
            MockTick::default(),
        )
    }

    /// Measurements of a healthy supply with no emission.
    pub fn meas() -> RegulatedValues {
        let mut meas = RegulatedValues::unmeasured();
        meas.anode_current = 0.0;
        meas.cathode_volt = -2500.0;
        meas.extract.value = 0.0;
        meas.focus_volt = 0.0;
        meas
    }
}

#[cfg(test)]
mod tests {
    use super::testkit::*;
    use super::*;
    use crate::system::ExtractMode;

    #[test]
    fn link_up_starts_loops_once_powered() {
        let mut recorder = recorder();
        let mut ctrl = controller(&mut recorder);
        let flags = SystemFlags::new();
        let reference = RegulatedValues::startup_defaults();

        assert_eq!(ctrl.link_up(&reference, &flags), Ok(false));
        assert!(!ctrl.regulator().is_running());

        flags.set_high_side_powered(true);
        assert_eq!(ctrl.link_up(&reference, &flags), Ok(true));
        assert!(ctrl.regulator().has_current_loop());
        assert!(ctrl.tick.running);
        assert_eq!(ctrl.link_up(&reference, &flags), Ok(false));
    }

    #[test]
    fn startup_logger_follows_link_up() {
        let mut recorder = recorder();
        let mut ctrl = controller(&mut recorder);
        let flags = SystemFlags::new();
        flags.set_high_side_powered(true);
        let mut reference = RegulatedValues::startup_defaults();
        reference.logger_mode = LoggerMode::HighFreqStartup;

        ctrl.link_up(&reference, &flags).unwrap();
        assert!(flags.logger_active());
    }

    #[test]
    fn sweep_ramp_reaches_extract_loop_in_same_tick() {
        let mut recorder = recorder();
        let mut ctrl = controller(&mut recorder);
        let flags = SystemFlags::new();
        flags.set_high_side_powered(true);
        flags.set_communication_ok(true);
        let mut reference = RegulatedValues::startup_defaults();
        reference.extract_mode = ExtractMode::Sweep;
        let meas = meas();
        let mut result = RegulatedValues::unmeasured();

        ctrl.link_up(&reference, &flags).unwrap();
        let (_, recorder, _) = ctrl.parts();
        recorder.start_sweep(&mut reference, &flags);

        assert_eq!(ctrl.tick(&meas, &mut reference, &mut result, &flags), None);
        assert_eq!(reference.extract.user, 0.25);
        assert_eq!(ctrl.regulator().extract_setpoint(), 0.25);
    }

    #[test]
    fn power_off_zeroes_outputs_and_aborts_sweep() {
        let mut recorder = recorder();
        let mut ctrl = controller(&mut recorder);
        let flags = SystemFlags::new();
        flags.set_high_side_powered(true);
        flags.set_communication_ok(true);
        let mut reference = RegulatedValues::startup_defaults();
        reference.extract_mode = ExtractMode::Sweep;
        reference.extract.user = 120.0;
        let meas = meas();
        let mut result = RegulatedValues::unmeasured();

        ctrl.link_up(&reference, &flags).unwrap();
        let (_, recorder, _) = ctrl.parts();
        recorder.start_sweep(&mut reference, &flags);
        for _ in 0..10 {
            ctrl.tick(&meas, &mut reference, &mut result, &flags);
        }

        ctrl.power_off(&meas, &mut reference, &mut result, &flags);
        assert!(!flags.high_side_powered());
        assert!(!flags.sweep_active());
        assert_eq!(reference.extract.user, 120.0);
        assert!(result.anode_current.is_nan());
        assert!(!ctrl.regulator().is_running());
        assert!(!ctrl.tick.running);
        assert_eq!(ctrl.pwm.duty, [0.0; 4]);
    }
}
