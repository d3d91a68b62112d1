// Implements the high-side telemetry sender with idle-based flow control.

// Key Features:
// - One frame offered per acquisition; skipped while the previous one is still in flight.
// - A transmit that cannot be started raises the fault indicator and leaves the sender
//   idle, so the next acquisition retries.
// - Transmit-complete from the serial interrupt re-opens the sender.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::frame::{CommFrame, FRAME_LEN};
use crate::indicator::{FaultLatch, Indicator};
use crate::system::RegulatedValues;

/// Interrupt-driven serial transmitter. The implementation copies the frame and
/// signals completion through `TelemetrySender::on_transmit_complete`.
pub trait FrameTransmit {
    type Error;

    fn start_transmit(&mut self, frame: &[u8; FRAME_LEN]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    /// Transmission started.
    Started,
    /// Previous frame still in flight.
    Busy,
    /// The transmitter refused the frame.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenderStats {
    pub started: u32,
    pub sent: u32,
    pub busy: u32,
    pub failed: u32,
}

pub struct TelemetrySender {
    idle: bool,
    fault: FaultLatch,
    stats: SenderStats,
}

impl TelemetrySender {
    pub const fn new() -> Self {
        Self {
            idle: true,
            fault: FaultLatch::new(),
            stats: SenderStats {
                started: 0,
                sent: 0,
                busy: 0,
                failed: 0,
            },
        }
    }

    /// Sends the current high-side voltages if the link is idle.
    pub fn offer<T: FrameTransmit>(
        &mut self,
        meas: &RegulatedValues,
        tx: &mut T,
        fault_led: &mut impl Indicator,
    ) -> SendOutcome {
        if !self.idle {
            self.stats.busy = self.stats.busy.wrapping_add(1);
            return SendOutcome::Busy;
        }

        let frame = CommFrame::from_meas(meas).encode();
        match tx.start_transmit(&frame) {
            Ok(()) => {
                self.idle = false;
                self.stats.started = self.stats.started.wrapping_add(1);
                self.fault.release(fault_led);
                SendOutcome::Started
            }
            Err(_) => {
                self.stats.failed = self.stats.failed.wrapping_add(1);
                self.fault.raise(fault_led);
                warn!("link: transmit not started");
                SendOutcome::Failed
            }
        }
    }

    /// Called from the transmit-complete interrupt.
    pub fn on_transmit_complete(&mut self) {
        self.stats.sent = self.stats.sent.wrapping_add(1);
        self.idle = true;
    }

    #[inline(always)]
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }
}

impl Default for TelemetrySender {
    fn default() -> Self {
        Self::new()
    }
}
