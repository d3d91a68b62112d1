// Implements a floating-point PID controller for the fixed-period voltage and current loops
// of the supply.

// Key Features:
// - Proportional, integral and derivative gains scaled once by the sample period.
// - Derivative on measurement, so setpoint steps do not kick the output.
// - Conditional integration: the integrator freezes while the output sits on a bound
//   and the new error would push it further, and is itself clamped to the output range.
// - Automatic/manual mode; leaving automatic mode zeroes output and integrator.
// - Direct or reverse acting, reverse negates all gains.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Whether the controller computes an output on `compute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidMode {
    Automatic,
    Manual,
}

/// Sign of the plant: `Reverse` when a larger output lowers the measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Direct,
    Reverse,
}

/// Tuning of one loop.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32, // 1/s
    pub kd: f32, // s
    pub period: f32, // s
    pub out_min: f32,
    pub out_max: f32,
    pub direction: Direction,
}

/// PID controller state for one loop.
pub struct PID {
    kp: f32,         // Proportional gain, sign applied
    ki: f32,         // Integral gain per sample, sign applied
    kd: f32,         // Derivative gain per sample, sign applied
    out_min: f32,    // Lower output bound
    out_max: f32,    // Upper output bound
    integral: f32,   // Integrator state
    last_input: f32, // Input of the previous compute
    input: f32,      // Latest measurement
    setpoint: f32,   // Latest target
    output: f32,     // Output of the last compute
    mode: PidMode,
}

impl PID {
    /// Creates a controller in the given mode with zero state.
    pub fn new(config: &PidConfig, mode: PidMode) -> Self {
        let sign = match config.direction {
            Direction::Direct => 1.0,
            Direction::Reverse => -1.0,
        };
        Self {
            kp: sign * config.kp,
            ki: sign * config.ki * config.period,
            kd: sign * config.kd / config.period,
            out_min: config.out_min,
            out_max: config.out_max,
            integral: 0.0,
            last_input: 0.0,
            input: 0.0,
            setpoint: 0.0,
            output: 0.0,
            mode,
        }
    }

    #[inline(always)]
    pub fn set_input(&mut self, input: f32) {
        self.input = input;
    }

    #[inline(always)]
    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    /// Runs one sample period. Returns false in manual mode or without a finite input,
    /// the output is then left as is.
    pub fn compute(&mut self) -> bool {
        if self.mode == PidMode::Manual {
            return false;
        }
        if !self.input.is_finite() || !self.setpoint.is_finite() {
            return false; // No measurement yet, keep state and output
        }

        let error = self.setpoint - self.input;
        let d_input = if self.last_input.is_finite() {
            self.input - self.last_input
        } else {
            0.0
        };

        // Conditional integration: hold the integrator against a saturated bound
        let increment = self.ki * error;
        let pushing_high = self.output >= self.out_max && increment > 0.0;
        let pushing_low = self.output <= self.out_min && increment < 0.0;
        if !pushing_high && !pushing_low {
            self.integral += increment;
        }
        self.integral = self.integral.clamp(self.out_min, self.out_max);

        let output = self.kp * error + self.integral - self.kd * d_input;
        self.output = output.clamp(self.out_min, self.out_max);
        self.last_input = self.input;
        true
    }

    /// Switches mode. Leaving automatic mode zeroes output and integrator;
    /// entering it restarts from zero without a derivative kick.
    pub fn set_mode(&mut self, mode: PidMode) {
        if mode == self.mode {
            return;
        }
        match mode {
            PidMode::Manual => {
                self.output = 0.0;
                self.integral = 0.0;
            }
            PidMode::Automatic => {
                self.integral = 0.0;
                self.output = 0.0_f32.clamp(self.out_min, self.out_max);
                self.last_input = self.input;
            }
        }
        self.mode = mode;
    }

    /// Changes the output bounds and pulls output and integrator inside them.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        if !(min < max) {
            return;
        }
        self.out_min = min;
        self.out_max = max;
        self.output = self.output.clamp(min, max);
        self.integral = self.integral.clamp(min, max);
    }

    #[inline(always)]
    pub fn output(&self) -> f32 {
        self.output
    }

    #[inline(always)]
    pub fn integral(&self) -> f32 {
        self.integral
    }

    #[inline(always)]
    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    #[inline(always)]
    pub fn mode(&self) -> PidMode {
        self.mode
    }

    pub fn limits(&self) -> (f32, f32) {
        (self.out_min, self.out_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: PidConfig = PidConfig {
        kp: 0.01,
        ki: 0.01,
        kd: 0.0,
        period: 0.01,
        out_min: 0.0,
        out_max: 0.5,
        direction: Direction::Direct,
    };

    #[test]
    fn saturates_without_windup() {
        let mut pid = PID::new(&LOOP, PidMode::Automatic);
        pid.set_setpoint(1000.0);
        pid.set_input(0.0);
        for _ in 0..10_000 {
            pid.compute();
            assert!(pid.output() >= 0.0 && pid.output() <= 0.5);
        }
        assert_eq!(pid.output(), 0.5);
        assert!(pid.integral() <= 0.5);

        // Error back to zero: output drops to the frozen integrator, never past the bound
        pid.set_input(1000.0);
        for _ in 0..100 {
            pid.compute();
            assert!(pid.output() <= 0.5);
        }
        assert_eq!(pid.output(), pid.integral());

        // Error reverses: the output leaves the bound on the first sample
        pid.set_input(1001.0);
        pid.compute();
        assert!(pid.output() < 0.5);
    }

    #[test]
    fn reverse_acting_drives_output_up_on_negative_error() {
        let config = PidConfig {
            kp: 0.00002025,
            ki: 0.009,
            kd: 0.0,
            period: 0.01,
            out_min: 0.0,
            out_max: 0.9,
            direction: Direction::Reverse,
        };
        let mut pid = PID::new(&config, PidMode::Automatic);
        pid.set_setpoint(-2500.0);
        pid.set_input(0.0);
        pid.compute();
        assert!(pid.output() > 0.0);
    }

    #[test]
    fn manual_mode_holds_zero() {
        let mut pid = PID::new(&LOOP, PidMode::Automatic);
        pid.set_setpoint(10.0);
        pid.compute();
        assert!(pid.output() > 0.0);

        pid.set_mode(PidMode::Manual);
        assert_eq!(pid.output(), 0.0);
        assert_eq!(pid.integral(), 0.0);
        assert!(!pid.compute());
        assert_eq!(pid.output(), 0.0);
    }

    #[test]
    fn unknown_measurement_does_not_poison_state() {
        let mut pid = PID::new(&LOOP, PidMode::Automatic);
        pid.set_setpoint(10.0);
        pid.set_input(f32::NAN);
        assert!(!pid.compute());
        assert_eq!(pid.integral(), 0.0);

        pid.set_input(0.0);
        assert!(pid.compute());
        assert!(pid.output() > 0.0);
    }

    #[test]
    fn output_limits_apply_to_state() {
        let config = PidConfig {
            out_min: 100.0,
            out_max: 500.0,
            ..LOOP
        };
        let mut pid = PID::new(&config, PidMode::Automatic);
        pid.set_input(0.0);
        pid.set_setpoint(0.0);
        pid.compute();
        assert_eq!(pid.output(), 100.0);

        pid.set_output_limits(100.0, 300.0);
        pid.set_setpoint(1.0e6);
        for _ in 0..100 {
            pid.compute();
        }
        assert_eq!(pid.output(), 300.0);
        assert_eq!(pid.limits(), (100.0, 300.0));
    }
}
