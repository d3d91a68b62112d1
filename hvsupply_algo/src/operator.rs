// Implements the operator command surface used by the keypad/display layer.

// Key Features:
// - One enum for every action the operator can take on the low side.
// - Reference edits that the loops capture at init (extract limit) rebuild the current loop.
// - Saving is reported back to the caller, which owns the settings storage.
// - Key scanning: a press is reported once after a short debounce, a hold once after
//   the hold time; the enter key toggles the sweep.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::recorder::SweepExit;
use crate::regulator::{PwmOutput, TickControl};
use crate::system::{ExtractMode, LoggerMode, RegulatedValues, SweepResult, SystemFlags};
use crate::SupplyController;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorCommand {
    StartSweep,
    AbortSweep,
    StartLogger,
    StopLogger,
    SetExtractMode(ExtractMode),
    SetLoggerMode(LoggerMode),
    /// Anode current in 0.1 µA units.
    SetAnodeCurrent(u32),
    SetExtractUser(f32),
    SetExtractLimit(f32),
    SetCathodeVolt(f32),
    SetFocusVolt(f32),
    SetPumpVolt(f32),
    HighSidePower(bool),
    SaveSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandOutcome {
    Done,
    /// Not allowed in the current state, nothing changed.
    Refused,
    SweepFinished(SweepExit),
    /// The caller stores the reference record.
    SaveRequested,
}

/// Key sampling interval.
pub const KEY_SCAN_MS: u32 = 50;
/// Scans a key must read pressed before it counts.
pub const KEY_PRESS_SCANS: u32 = 2;
/// Scans the power key must be held to switch off, about 2 s.
pub const KEY_POWER_OFF_SCANS: u32 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyEvent {
    Pressed,
    Held,
}

/// Press-time counter of one key, sampled every `KEY_SCAN_MS`.
pub struct KeyScanner {
    held: u32,
    hold_scans: u32,
}

impl KeyScanner {
    pub const fn new(hold_scans: u32) -> Self {
        Self { held: 0, hold_scans }
    }

    /// Reports each event once per press.
    pub fn scan(&mut self, pressed: bool) -> Option<KeyEvent> {
        if !pressed {
            self.held = 0;
            return None;
        }
        self.held = self.held.saturating_add(1);
        if self.held == KEY_PRESS_SCANS {
            Some(KeyEvent::Pressed)
        } else if self.held == self.hold_scans + 1 {
            Some(KeyEvent::Held)
        } else {
            None
        }
    }
}

/// Enter key action: start a sweep, or cancel the running one.
pub fn enter_command(flags: &SystemFlags) -> OperatorCommand {
    if flags.sweep_active() {
        OperatorCommand::AbortSweep
    } else {
        OperatorCommand::StartSweep
    }
}

impl<'a, P: PwmOutput, T: TickControl> SupplyController<'a, P, T> {
    /// Applies one operator action.
    pub fn apply(
        &mut self,
        command: OperatorCommand,
        meas: &RegulatedValues,
        reference: &mut RegulatedValues,
        sweep_result: &mut SweepResult,
        flags: &SystemFlags,
    ) -> CommandOutcome {
        debug!("operator: {}", command);
        let (regulator, recorder, _) = self.parts();
        match command {
            OperatorCommand::StartSweep => {
                if flags.sweep_active() || !regulator.is_running() {
                    return CommandOutcome::Refused;
                }
                reference.extract_mode = ExtractMode::Sweep;
                recorder.start_sweep(reference, flags);
            }
            OperatorCommand::AbortSweep => {
                return match recorder.abort_sweep(meas, reference, sweep_result, flags) {
                    Some(exit) => CommandOutcome::SweepFinished(exit),
                    None => CommandOutcome::Refused,
                };
            }
            OperatorCommand::StartLogger => {
                if !recorder.start_logger(flags) {
                    return CommandOutcome::Refused;
                }
            }
            OperatorCommand::StopLogger => recorder.stop_logger(flags),
            OperatorCommand::SetExtractMode(mode) => {
                if flags.sweep_active() {
                    return CommandOutcome::Refused; // The sweep needs its mode until exit
                }
                reference.extract_mode = mode;
            }
            OperatorCommand::SetLoggerMode(mode) => {
                if flags.logger_active() {
                    return CommandOutcome::Refused;
                }
                reference.logger_mode = mode;
            }
            OperatorCommand::SetAnodeCurrent(units) => reference.set_anode_current_fixed(units),
            OperatorCommand::SetExtractUser(volt) => {
                if flags.sweep_active() {
                    return CommandOutcome::Refused;
                }
                reference.extract.user = volt;
            }
            OperatorCommand::SetExtractLimit(volt) => {
                if !volt.is_finite() || flags.sweep_active() {
                    return CommandOutcome::Refused;
                }
                reference.extract.limit = volt;
                if regulator.is_running() && regulator.init_current(reference).is_err() {
                    return CommandOutcome::Refused;
                }
            }
            OperatorCommand::SetCathodeVolt(volt) => reference.cathode_volt = volt,
            OperatorCommand::SetFocusVolt(volt) => reference.focus_volt = volt,
            OperatorCommand::SetPumpVolt(volt) => reference.pump_volt = volt,
            OperatorCommand::HighSidePower(true) => flags.set_high_side_powered(true),
            OperatorCommand::HighSidePower(false) => self.power_off(meas, reference, sweep_result, flags),
            OperatorCommand::SaveSettings => return CommandOutcome::SaveRequested,
        }
        CommandOutcome::Done
    }
}
