// Implements the sampling pipeline: front-end codes to calibrated, optionally filtered
// measurements of the channels owned by this controller.

// Key Features:
// - One pipeline per controller side; the low side owns anode current and cathode voltage,
//   the high side owns extract and focus voltage.
// - Per-channel filter selection fixed when the pipeline is built.
// - Frames flagged invalid by the front-end are skipped and counted; the previous
//   measurements stay in place.
// - On the high side a stored sample asks for a telemetry transmission.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::calibration::{Calibration, ChannelCalibration};
use crate::math_float::filters::FilteredChannel;
use crate::system::RegulatedValues;

/// Channels delivered by the front-end on each acquisition.
pub const FRONT_END_CHANNELS: usize = 2;

/// One acquisition from the analog front-end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFrame {
    pub codes: [i32; FRONT_END_CHANNELS],
    pub valid: bool, // Front-end integrity check passed
}

/// Controller variant the firmware is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Low,
    High,
}

/// Which measured channels pass through a moving average.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterConfig {
    pub anode_current: bool,
    pub cathode_volt: bool,
    pub extract_volt: bool,
    pub focus_volt: bool,
}

/// Low side: filter its own channels, take extract/focus as received.
pub const LOW_SIDE_FILTERS: FilterConfig = FilterConfig {
    anode_current: true,
    cathode_volt: true,
    extract_volt: false,
    focus_volt: false,
};

/// High side: filter before transmission, the link drops samples at high rates.
pub const HIGH_SIDE_FILTERS: FilterConfig = FilterConfig {
    anode_current: false,
    cathode_volt: false,
    extract_volt: true,
    focus_volt: true,
};

/// Result of processing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    /// Measurements updated.
    Stored,
    /// Measurements updated, the telemetry sender should transmit them.
    Transmit,
    /// Frame rejected by the front-end check, nothing stored.
    Invalid,
}

pub struct SamplingPipeline {
    side: Side,
    channels: [ChannelCalibration; FRONT_END_CHANNELS],
    filters: [FilteredChannel; FRONT_END_CHANNELS],
    invalid_frames: u32,
}

impl SamplingPipeline {
    pub fn new(side: Side, calibration: &Calibration, filters: FilterConfig) -> Self {
        let (channels, filtered) = match side {
            Side::Low => (
                [calibration.anode_current, calibration.cathode_volt],
                [filters.anode_current, filters.cathode_volt],
            ),
            Side::High => (
                [calibration.extract_volt, calibration.focus_volt],
                [filters.extract_volt, filters.focus_volt],
            ),
        };
        Self {
            side,
            channels,
            filters: [
                FilteredChannel::new(filtered[0]),
                FilteredChannel::new(filtered[1]),
            ],
            invalid_frames: 0,
        }
    }

    /// Converts `frame` and stores the owned channels into `meas`.
    pub fn process(&mut self, frame: &RawFrame, meas: &mut RegulatedValues) -> SampleOutcome {
        if !frame.valid {
            self.invalid_frames = self.invalid_frames.wrapping_add(1);
            return SampleOutcome::Invalid;
        }

        let ch0 = self.filters[0].apply(self.channels[0].to_physical(frame.codes[0]));
        let ch1 = self.filters[1].apply(self.channels[1].to_physical(frame.codes[1]));

        match self.side {
            Side::Low => {
                meas.anode_current = ch0;
                meas.cathode_volt = ch1;
                SampleOutcome::Stored
            }
            Side::High => {
                meas.extract.value = ch0;
                meas.focus_volt = ch1;
                SampleOutcome::Transmit
            }
        }
    }

    /// Frames skipped because the front-end flagged them.
    pub fn invalid_frames(&self) -> u32 {
        self.invalid_frames
    }
}
