// Implements the low-side telemetry receiver: byte accumulation, idle-line framing,
// CRC validation and hand-over of the remote measurements.

// Key Features:
// - Bytes collected into a bounded buffer; excess bytes of an over-long burst are dropped
//   and the frame marked overflowed.
// - Per-byte line errors (parity, framing, noise, overrun) accumulated per frame and
//   reported; they do not reject a frame whose CRC matches.
// - On a CRC match the two voltages go to the measurement record (optionally filtered)
//   and communication-ok is set. On a mismatch communication-ok is cleared, the fault
//   indicator raised and the previous measurements kept.
// - Any complete frame feeds the liveness watchdog, valid or not.
// - Recovery decision after hard peripheral errors: restart only while the high side
//   is powered.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use heapless::Vec;

use super::frame::{CommFrame, LinkError};
use super::watchdog::LinkWatchdog;
use crate::analog::sampling::FilterConfig;
use crate::indicator::{FaultLatch, Indicator};
use crate::math_float::filters::FilteredChannel;
use crate::system::{RegulatedValues, SystemFlags};

/// Receive buffer size; longer bursts are truncated.
pub const RX_CAPACITY: usize = 16;

/// Serial line errors seen while a frame was received.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineErrors {
    pub parity: bool,
    pub framing: bool,
    pub noise: bool,
    pub overrun: bool,
}

impl LineErrors {
    pub fn any(&self) -> bool {
        self.parity || self.framing || self.noise || self.overrun
    }

    pub fn merge(&mut self, other: LineErrors) {
        self.parity |= other.parity;
        self.framing |= other.framing;
        self.noise |= other.noise;
        self.overrun |= other.overrun;
    }
}

/// Reception counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub frames: u32,
    pub crc_errors: u32,
    pub length_errors: u32,
    pub line_error_frames: u32,
    pub overflows: u32,
}

/// What to do with the receive path after a hard peripheral error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recovery {
    /// Transient fault, abort and restart reception.
    Restart,
    /// High side intentionally powered down, leave the receiver stopped.
    Stop,
}

/// Decides the recovery after the serial peripheral reported a hard error.
/// A stopped receiver is marked so it can be resumed once the high side is back.
pub fn recovery(flags: &SystemFlags) -> Recovery {
    if flags.high_side_powered() {
        Recovery::Restart
    } else {
        flags.set_rx_stopped(true);
        Recovery::Stop
    }
}

/// Receiver was stopped during a power-down and the high side is powered again.
pub fn restart_pending(flags: &SystemFlags) -> bool {
    flags.rx_stopped() && flags.high_side_powered()
}

pub struct LinkReceiver {
    buffer: Vec<u8, RX_CAPACITY>,
    errors: LineErrors,
    overflowed: bool,
    fault: FaultLatch,
    extract_filter: FilteredChannel,
    focus_filter: FilteredChannel,
    stats: LinkStats,
}

impl LinkReceiver {
    /// `filters` selects averaging of the received voltages on this side.
    pub fn new(filters: FilterConfig) -> Self {
        Self {
            buffer: Vec::new(),
            errors: LineErrors::default(),
            overflowed: false,
            fault: FaultLatch::new(),
            extract_filter: FilteredChannel::new(filters.extract_volt),
            focus_filter: FilteredChannel::new(filters.focus_volt),
            stats: LinkStats::default(),
        }
    }

    /// Records line errors flagged by the peripheral for the current frame.
    pub fn on_line_errors(&mut self, errors: LineErrors) {
        self.errors.merge(errors);
    }

    /// Appends one received byte.
    pub fn on_byte(&mut self, byte: u8) {
        if self.buffer.push(byte).is_err() {
            self.overflowed = true;
        }
    }

    /// Line went idle: the bytes received so far form one frame.
    /// Returns `None` if nothing was received since the last boundary.
    pub fn on_idle(
        &mut self,
        meas: &mut RegulatedValues,
        flags: &SystemFlags,
        watchdog: &LinkWatchdog,
        fault_led: &mut impl Indicator,
    ) -> Option<Result<CommFrame, LinkError>> {
        if self.buffer.is_empty() && !self.overflowed {
            self.errors = LineErrors::default();
            return None;
        }

        watchdog.feed();
        self.stats.frames = self.stats.frames.wrapping_add(1);

        if self.errors.any() {
            self.stats.line_error_frames = self.stats.line_error_frames.wrapping_add(1);
            warn!("link: line errors {}", self.errors);
        }
        if self.overflowed {
            self.stats.overflows = self.stats.overflows.wrapping_add(1);
        }

        let result = self.accept(meas, flags, fault_led);

        self.buffer.clear();
        self.errors = LineErrors::default();
        self.overflowed = false;
        Some(result)
    }

    fn accept(
        &mut self,
        meas: &mut RegulatedValues,
        flags: &SystemFlags,
        fault_led: &mut impl Indicator,
    ) -> Result<CommFrame, LinkError> {
        let frame = match CommFrame::decode(&self.buffer) {
            Ok(frame) => frame,
            Err(err) => {
                match err {
                    LinkError::Length(_) => self.stats.length_errors = self.stats.length_errors.wrapping_add(1),
                    LinkError::Crc { .. } => self.stats.crc_errors = self.stats.crc_errors.wrapping_add(1),
                }
                warn!("link: frame dropped, {}", err);
                self.fault.raise(fault_led);
                flags.set_communication_ok(false);
                return Err(err);
            }
        };

        self.fault.release(fault_led);
        meas.extract.value = self.extract_filter.apply(frame.extract_volt);
        meas.focus_volt = self.focus_filter.apply(frame.focus_volt);

        if !flags.communication_ok() {
            info!("link: restored after {} frames", self.stats.frames);
        }
        flags.set_communication_ok(true);
        Ok(frame)
    }

    /// Drops the partial frame and the averaged remote values before reception resumes.
    pub fn restart(&mut self, flags: &SystemFlags) {
        self.buffer.clear();
        self.errors = LineErrors::default();
        self.overflowed = false;
        self.extract_filter.reset();
        self.focus_filter.reset();
        flags.set_rx_stopped(false);
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Bytes waiting for the next idle boundary.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
