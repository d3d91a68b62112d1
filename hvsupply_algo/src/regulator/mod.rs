// Implements the regulation engine: cathode, extract, focus and anode current PID loops
// plus the open-loop pump mapping, run on the fixed control tick.

// Key Features:
// - Cathode loop runs every tick, it depends on local measurements only.
// - Extract, focus and current loops run only while the link to the high side is up;
//   without it their outputs hold the last value.
// - Extract control mode arbitration: in current-regulate mode the current loop output,
//   bounded to [100 V, extract limit], becomes the extract setpoint; in steady and sweep
//   mode the extract loop follows the user voltage.
// - Pump duty from the requested pump voltage, no feedback.
// - Init/de-init of the loops together with the control tick timer; the current loop has
//   its own init that reads the extract limit and requires the voltage loops first.

// Detailed Operation:
// One tick evaluates, in this order: cathode loop, pump mapping, then (link up) the current
// loop if selected, the extract loop and the focus loop. The current loop writes its output
// to `reference.extract.current_ref` before the extract loop reads it in the same tick.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub mod tuning;

use crate::analog::calibration::{manual_duty, PumpCalibration};
use crate::math_float::controllers::{Direction, PidConfig, PidMode, PID};
use crate::system::{ExtractMode, RegulatedValues};

/// Control tick period.
pub const PID_PERIOD: f32 = 0.01;
/// Lowest duty of all voltage loops.
pub const PID_OUT_MIN: f32 = 0.0;

/// Cathode voltage loop. Ziegler-Nichols PI from Ku = 0.00045, Tu = 0.05 s.
/// A larger duty makes the cathode more negative, hence reverse acting.
pub const CATHODE_PID: PidConfig = PidConfig {
    kp: 0.00002025,
    ki: 0.009,
    kd: 0.0,
    period: PID_PERIOD,
    out_min: PID_OUT_MIN,
    out_max: 0.9,
    direction: Direction::Reverse,
};

pub const EXTRACT_PID: PidConfig = PidConfig {
    kp: 0.01,
    ki: 0.01,
    kd: 0.0,
    period: PID_PERIOD,
    out_min: PID_OUT_MIN,
    out_max: 0.5,
    direction: Direction::Direct,
};

pub const FOCUS_PID: PidConfig = PidConfig {
    kp: 0.01,
    ki: 0.01,
    kd: 0.0,
    period: PID_PERIOD,
    out_min: PID_OUT_MIN,
    out_max: 0.9,
    direction: Direction::Direct,
};

/// Lowest extract voltage the current loop may request.
pub const CURRENT_OUT_MIN_V: f32 = 100.0;
/// Anode current loop gains, V/A: 1 µA of error moves the extract voltage 20 V at once
/// and 100 V per second.
pub const CURRENT_KP: f32 = 2.0e7;
pub const CURRENT_KI: f32 = 1.0e8;
pub const CURRENT_KD: f32 = 0.0;

/// Current loop tuning with the output bounded by the extract limit.
pub fn current_pid(extract_limit: f32) -> PidConfig {
    PidConfig {
        kp: CURRENT_KP,
        ki: CURRENT_KI,
        kd: CURRENT_KD,
        period: PID_PERIOD,
        out_min: CURRENT_OUT_MIN_V,
        out_max: extract_limit.max(CURRENT_OUT_MIN_V),
        direction: Direction::Direct,
    }
}

/// PWM outputs of the power stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmChannel {
    Cathode,
    Extract,
    Focus,
    Pump,
}

impl PwmChannel {
    pub const ALL: [PwmChannel; 4] = [
        PwmChannel::Cathode,
        PwmChannel::Extract,
        PwmChannel::Focus,
        PwmChannel::Pump,
    ];
}

/// Duty output, 0.0..=1.0. Implementations ignore values above 1.0.
pub trait PwmOutput {
    fn set_duty(&mut self, channel: PwmChannel, duty: f32);
}

/// Hardware timer producing the control tick.
pub trait TickControl {
    fn start(&mut self);
    fn stop(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegulatorError {
    #[error("voltage loops not initialized")]
    VoltageLoopsNotInitialized,
    #[error("extract limit is not a number")]
    InvalidLimit,
    #[error("regulator running, manual drive refused")]
    Running,
}

pub struct Regulator {
    cathode: PID,
    extract: PID,
    focus: PID,
    current: Option<PID>,
    pump: PumpCalibration,
    running: bool,
}

impl Regulator {
    /// All loops in manual mode, tick not running.
    pub fn new(pump: PumpCalibration) -> Self {
        Self {
            cathode: PID::new(&CATHODE_PID, PidMode::Manual),
            extract: PID::new(&EXTRACT_PID, PidMode::Manual),
            focus: PID::new(&FOCUS_PID, PidMode::Manual),
            current: None,
            pump,
            running: false,
        }
    }

    /// Puts the voltage loops in automatic mode with setpoints from `reference`
    /// and starts the control tick.
    pub fn init(&mut self, reference: &RegulatedValues, tick: &mut impl TickControl) {
        self.cathode.set_setpoint(reference.cathode_volt);
        self.extract.set_setpoint(self.extract_target(reference));
        self.focus.set_setpoint(reference.focus_volt);

        self.cathode.set_mode(PidMode::Automatic);
        self.extract.set_mode(PidMode::Automatic);
        self.focus.set_mode(PidMode::Automatic);

        self.running = true;
        tick.start();
        info!("regulator: init, cathode {} V", reference.cathode_volt);
    }

    /// Builds the current loop. Its upper bound is the extract limit read now;
    /// a changed limit needs another call.
    pub fn init_current(&mut self, reference: &RegulatedValues) -> Result<(), RegulatorError> {
        if !self.running {
            return Err(RegulatorError::VoltageLoopsNotInitialized);
        }
        let limit = reference.extract.limit;
        if !limit.is_finite() {
            return Err(RegulatorError::InvalidLimit);
        }
        let mut current = PID::new(&current_pid(limit), PidMode::Automatic);
        current.set_setpoint(reference.anode_current);
        self.current = Some(current);
        info!("regulator: current loop, limit {} V", limit);
        Ok(())
    }

    /// Switches every loop to manual, zeroes all outputs and stops the control tick.
    pub fn deinit(&mut self, pwm: &mut impl PwmOutput, tick: &mut impl TickControl) {
        tick.stop();
        self.cathode.set_mode(PidMode::Manual);
        self.extract.set_mode(PidMode::Manual);
        self.focus.set_mode(PidMode::Manual);
        if let Some(current) = self.current.as_mut() {
            current.set_mode(PidMode::Manual);
        }
        for channel in PwmChannel::ALL {
            pwm.set_duty(channel, 0.0);
        }
        self.running = false;
        info!("regulator: de-init");
    }

    /// One control tick.
    pub fn tick(
        &mut self,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        communication_ok: bool,
        pwm: &mut impl PwmOutput,
    ) {
        if !self.running {
            return;
        }

        self.cathode.set_input(meas.cathode_volt);
        self.cathode.set_setpoint(reference.cathode_volt);
        self.cathode.compute();
        pwm.set_duty(PwmChannel::Cathode, self.cathode.output());

        pwm.set_duty(PwmChannel::Pump, self.pump.duty(reference.pump_volt));

        if !communication_ok {
            return; // Remote measurements stale, hold the remote loops
        }

        if reference.extract_mode == ExtractMode::RegulateCurrent {
            if let Some(current) = self.current.as_mut() {
                current.set_input(meas.anode_current);
                current.set_setpoint(reference.anode_current);
                if current.compute() {
                    let (min, max) = current.limits();
                    reference.extract.current_ref = current.output().clamp(min, max);
                }
            }
        }

        self.extract.set_input(meas.extract.value);
        self.extract.set_setpoint(self.extract_target(reference));
        self.extract.compute();
        pwm.set_duty(PwmChannel::Extract, self.extract.output());

        self.focus.set_input(meas.focus_volt);
        self.focus.set_setpoint(reference.focus_volt);
        self.focus.compute();
        pwm.set_duty(PwmChannel::Focus, self.focus.output());
    }

    /// Extract setpoint selected by the extract control mode.
    fn extract_target(&self, reference: &RegulatedValues) -> f32 {
        match reference.extract_mode {
            ExtractMode::RegulateCurrent => reference.extract.current_ref,
            ExtractMode::Steady | ExtractMode::Sweep => reference.extract.user,
        }
    }

    /// Drives one stage open-loop; only while the loops are stopped.
    pub fn drive_manual(
        &mut self,
        channel: PwmChannel,
        voltage: f32,
        pwm: &mut impl PwmOutput,
    ) -> Result<(), RegulatorError> {
        if self.running {
            return Err(RegulatorError::Running);
        }
        pwm.set_duty(channel, manual_duty(voltage));
        Ok(())
    }

    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_current_loop(&self) -> bool {
        self.current.is_some()
    }

    /// Setpoint the extract loop used on its last evaluation.
    pub fn extract_setpoint(&self) -> f32 {
        self.extract.setpoint()
    }

    /// Last output of each loop, in `PwmChannel` order without the pump.
    pub fn outputs(&self) -> [f32; 3] {
        [self.cathode.output(), self.extract.output(), self.focus.output()]
    }

    pub fn current_output(&self) -> Option<f32> {
        self.current.as_ref().map(PID::output)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MockPwm {
        pub duty: [f32; 4],
        pub writes: [u32; 4],
    }

    impl MockPwm {
        pub fn get(&self, channel: PwmChannel) -> f32 {
            self.duty[channel as usize]
        }
    }

    impl PwmOutput for MockPwm {
        fn set_duty(&mut self, channel: PwmChannel, duty: f32) {
            if duty > 1.0 {
                return;
            }
            self.duty[channel as usize] = duty;
            self.writes[channel as usize] += 1;
        }
    }

    #[derive(Default)]
    pub struct MockTick {
        pub running: bool,
    }

    impl TickControl for MockTick {
        fn start(&mut self) {
            self.running = true;
        }

        fn stop(&mut self) {
            self.running = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockPwm, MockTick};
    use super::*;
    use crate::analog::calibration::Calibration;

    struct Rig {
        reg: Regulator,
        meas: RegulatedValues,
        reference: RegulatedValues,
        pwm: MockPwm,
        tick: MockTick,
    }

    impl Rig {
        fn running(mode: ExtractMode) -> Self {
            let mut reference = RegulatedValues::startup_defaults();
            reference.extract_mode = mode;
            reference.extract.user = 250.0;
            reference.extract.limit = 500.0;
            let mut meas = RegulatedValues::unmeasured();
            meas.cathode_volt = -2400.0;
            meas.anode_current = 0.0;
            meas.extract.value = 200.0;
            meas.focus_volt = 0.0;

            let mut rig = Self {
                reg: Regulator::new(Calibration::trimmed().pump),
                meas,
                reference,
                pwm: MockPwm::default(),
                tick: MockTick::default(),
            };
            rig.reg.init(&rig.reference, &mut rig.tick);
            rig.reg.init_current(&rig.reference).unwrap();
            rig
        }

        fn tick(&mut self, communication_ok: bool) {
            self.reg
                .tick(&self.meas, &mut self.reference, communication_ok, &mut self.pwm);
        }
    }

    #[test]
    fn current_init_requires_voltage_loops() {
        let mut reg = Regulator::new(Calibration::trimmed().pump);
        let reference = RegulatedValues::startup_defaults();
        assert_eq!(
            reg.init_current(&reference),
            Err(RegulatorError::VoltageLoopsNotInitialized)
        );
        assert!(!reg.has_current_loop());
    }

    #[test]
    fn current_mode_cascades_into_extract() {
        let mut rig = Rig::running(ExtractMode::RegulateCurrent);
        for _ in 0..1000 {
            rig.tick(true);
            let cascade = rig.reg.current_output().unwrap();
            assert_eq!(rig.reg.extract_setpoint(), cascade);
            assert_eq!(rig.reference.extract.current_ref, cascade);
            assert!((CURRENT_OUT_MIN_V..=500.0).contains(&cascade));
        }
        // 0.6 µA requested, nothing measured: driven to the limit
        assert_eq!(rig.reg.extract_setpoint(), 500.0);

        // Current far above the request: clamped at the lower bound
        rig.meas.anode_current = 1.0e-3;
        for _ in 0..50 {
            rig.tick(true);
        }
        assert_eq!(rig.reg.extract_setpoint(), CURRENT_OUT_MIN_V);
    }

    #[test]
    fn steady_and_sweep_follow_user_voltage() {
        for mode in [ExtractMode::Steady, ExtractMode::Sweep] {
            let mut rig = Rig::running(mode);
            rig.reference.extract.current_ref = 321.0;
            for _ in 0..10 {
                rig.tick(true);
                assert_eq!(rig.reg.extract_setpoint(), 250.0);
            }
            assert_eq!(rig.reference.extract.current_ref, 321.0);
        }
    }

    #[test]
    fn remote_loops_hold_without_link() {
        let mut rig = Rig::running(ExtractMode::Steady);
        for _ in 0..20 {
            rig.tick(true);
        }
        let held = rig.pwm.get(PwmChannel::Extract);
        let extract_writes = rig.pwm.writes[PwmChannel::Extract as usize];
        assert!(held > 0.0);

        rig.meas.extract.value = 0.0;
        for _ in 0..20 {
            rig.tick(false);
        }
        assert_eq!(rig.pwm.get(PwmChannel::Extract), held);
        assert_eq!(rig.pwm.writes[PwmChannel::Extract as usize], extract_writes);
        // Cathode and pump keep running
        assert_eq!(rig.pwm.writes[PwmChannel::Cathode as usize], 40);
        assert_eq!(rig.pwm.writes[PwmChannel::Pump as usize], 40);
    }

    #[test]
    fn cathode_loop_pushes_towards_more_negative() {
        let mut rig = Rig::running(ExtractMode::Steady);
        rig.tick(false);
        // -2400 measured, -2500 requested: more duty
        assert!(rig.pwm.get(PwmChannel::Cathode) > 0.0);
        assert!(rig.pwm.get(PwmChannel::Cathode) <= CATHODE_PID.out_max);
    }

    #[test]
    fn deinit_zeroes_outputs_and_stops_tick() {
        let mut rig = Rig::running(ExtractMode::Steady);
        rig.reference.pump_volt = 3000.0;
        for _ in 0..10 {
            rig.tick(true);
        }
        assert!(rig.tick.running);

        rig.reg.deinit(&mut rig.pwm, &mut rig.tick);
        assert!(!rig.tick.running);
        assert_eq!(rig.pwm.duty, [0.0; 4]);
        assert_eq!(rig.reg.outputs(), [0.0; 3]);

        rig.tick(true);
        assert_eq!(rig.pwm.duty, [0.0; 4]);
    }

    #[test]
    fn manual_drive_only_when_stopped() {
        let mut rig = Rig::running(ExtractMode::Steady);
        assert_eq!(
            rig.reg.drive_manual(PwmChannel::Focus, 1000.0, &mut rig.pwm),
            Err(RegulatorError::Running)
        );
        rig.reg.deinit(&mut rig.pwm, &mut rig.tick);
        rig.reg
            .drive_manual(PwmChannel::Focus, 1000.0, &mut rig.pwm)
            .unwrap();
        assert_eq!(rig.pwm.get(PwmChannel::Focus), manual_duty(1000.0));
    }
}
