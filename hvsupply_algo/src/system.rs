// Implements the process-wide state shared by the acquisition, link and control contexts.

// Key Features:
// - `RegulatedValues`: one record shape used as measured set, reference set and sweep result.
// - Fixed-point mirror of the anode current kept consistent with the float value.
// - `SystemFlags`: cross-context booleans as atomics with acquire/release ordering.
// - `SystemState`: the owned partition of records; each record has one writer context,
//   the application hands them out as separately locked resources.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Ampere per unit of the fixed-point anode current mirror (0.1 µA).
pub const ANODE_CURRENT_UNIT: f32 = 1.0e-7;

/// Selects what drives the extract voltage loop setpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExtractMode {
    /// Anode current loop output is the extract setpoint.
    RegulateCurrent,
    /// Extract loop follows the user voltage.
    Steady,
    /// Like `Steady`, with the user voltage ramped by the sweep.
    Sweep,
}

/// Selects which recorder owns the sample log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoggerMode {
    /// All channels every N control ticks.
    Periodic,
    /// One channel on every acquisition, steady operation.
    HighFreqSteady,
    /// One channel on every acquisition, capturing a start-up.
    HighFreqStartup,
}

impl LoggerMode {
    pub fn is_high_freq(self) -> bool {
        !matches!(self, LoggerMode::Periodic)
    }
}

/// Extract voltage with its three roles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtractVoltage {
    pub value: f32,       // Measured value; unused in the reference record
    pub user: f32,        // Operator requested value
    pub current_ref: f32, // Output of the anode current loop
    pub limit: f32,       // Operator configured upper limit
}

/// Measured or requested values of the supply.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegulatedValues {
    pub anode_current: f32,       // A
    pub anode_current_fixed: u32, // 0.1 µA units, operator edits go here
    pub cathode_volt: f32,        // V, negative polarity
    pub extract: ExtractVoltage,
    pub focus_volt: f32, // V
    pub pump_volt: f32,  // V
    pub extract_mode: ExtractMode,
    pub logger_mode: LoggerMode,
}

impl RegulatedValues {
    /// Measurement record before the first acquisition: all readings unknown.
    pub const fn unmeasured() -> Self {
        Self {
            anode_current: f32::NAN,
            anode_current_fixed: 0,
            cathode_volt: f32::NAN,
            extract: ExtractVoltage {
                value: f32::NAN,
                user: f32::NAN,
                current_ref: f32::NAN,
                limit: f32::NAN,
            },
            focus_volt: f32::NAN,
            pump_volt: f32::NAN,
            extract_mode: ExtractMode::RegulateCurrent,
            logger_mode: LoggerMode::Periodic,
        }
    }

    /// Reference record used when no valid settings are stored.
    pub fn startup_defaults() -> Self {
        let mut reference = Self {
            anode_current: 0.0,
            anode_current_fixed: 0,
            cathode_volt: -2500.0,
            extract: ExtractVoltage {
                value: 0.0,
                user: 0.0,
                current_ref: 0.0,
                limit: 500.0,
            },
            focus_volt: 0.0,
            pump_volt: 0.0,
            extract_mode: ExtractMode::RegulateCurrent,
            logger_mode: LoggerMode::Periodic,
        };
        reference.set_anode_current_fixed(6); // 0.6 µA
        reference
    }

    /// Sets the anode current from the fixed-point mirror and derives the float.
    pub fn set_anode_current_fixed(&mut self, units: u32) {
        self.anode_current_fixed = units;
        self.anode_current = units as f32 * ANODE_CURRENT_UNIT;
    }

    /// Re-derives the float after the mirror was restored from storage.
    pub fn sync_anode_current(&mut self) {
        self.set_anode_current_fixed(self.anode_current_fixed);
    }
}

/// Peak capture of the last sweep; NaN fields mean "no data".
pub type SweepResult = RegulatedValues;

/// Status reported by the analog front-end collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrontEndStatus {
    pub ready: bool,
    pub invalid_frames: u32,
}

/// Battery telemetry of the low side.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryState {
    pub volt: f32,
    pub percent: f32,
}

/// Flags read and written from several interrupt priorities.
pub struct SystemFlags {
    communication_ok: AtomicBool,
    high_side_powered: AtomicBool,
    sweep_active: AtomicBool,
    logger_active: AtomicBool,
    low_battery: AtomicBool,
    rx_stopped: AtomicBool,
}

macro_rules! flag_accessors {
    ($($get:ident, $set:ident;)*) => {
        $(
            #[inline(always)]
            pub fn $get(&self) -> bool {
                self.$get.load(Ordering::Acquire)
            }

            #[inline(always)]
            pub fn $set(&self, value: bool) {
                self.$get.store(value, Ordering::Release)
            }
        )*
    };
}

impl SystemFlags {
    pub const fn new() -> Self {
        Self {
            communication_ok: AtomicBool::new(false),
            high_side_powered: AtomicBool::new(false),
            sweep_active: AtomicBool::new(false),
            logger_active: AtomicBool::new(false),
            low_battery: AtomicBool::new(false),
            rx_stopped: AtomicBool::new(false),
        }
    }

    flag_accessors! {
        communication_ok, set_communication_ok;
        high_side_powered, set_high_side_powered;
        sweep_active, set_sweep_active;
        logger_active, set_logger_active;
        low_battery, set_low_battery;
        rx_stopped, set_rx_stopped;
    }
}

impl Default for SystemFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned records of the supply, initialized before interrupts are enabled.
pub struct SystemState {
    /// Written by the sampling pipeline and, on the low side, the link receiver.
    pub meas: RegulatedValues,
    /// Written by the operator and by the current loop (`extract.current_ref`).
    pub reference: RegulatedValues,
    /// Written by the sweep on exit.
    pub sweep_result: SweepResult,
    pub front_end: FrontEndStatus,
    pub battery: BatteryState,
}

impl SystemState {
    pub fn new(reference: RegulatedValues) -> Self {
        Self {
            meas: RegulatedValues::unmeasured(),
            reference,
            sweep_result: RegulatedValues::unmeasured(),
            front_end: FrontEndStatus::default(),
            battery: BatteryState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_mirror_drives_float() {
        let mut values = RegulatedValues::startup_defaults();
        assert_eq!(values.anode_current_fixed, 6);
        assert_eq!(values.anode_current, 6.0 * ANODE_CURRENT_UNIT);

        values.set_anode_current_fixed(125);
        assert_eq!(values.anode_current, 125.0 * ANODE_CURRENT_UNIT);

        values.anode_current = 0.0;
        values.sync_anode_current();
        assert_eq!(values.anode_current, 125.0 * ANODE_CURRENT_UNIT);
    }

    #[test]
    fn measurements_start_unknown() {
        let state = SystemState::new(RegulatedValues::startup_defaults());
        assert!(state.meas.cathode_volt.is_nan());
        assert!(state.meas.extract.value.is_nan());
        assert_eq!(state.reference.extract.limit, 500.0);
    }

    #[test]
    fn flags_start_cleared() {
        let flags = SystemFlags::new();
        assert!(!flags.communication_ok());
        flags.set_communication_ok(true);
        assert!(flags.communication_ok());
        assert!(!flags.sweep_active());
    }
}
