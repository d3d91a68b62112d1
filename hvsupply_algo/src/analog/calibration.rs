// Implements the per-channel calibration of the analog front-end codes and the pump mapping.

// Key Features:
// - Gain/offset pair per channel: physical = gain * (raw - offset).
// - Built-in gains derived from the divider and shunt networks, corrected by trim factors
//   measured against an external reference.
// - Open-loop pump mapping: duty = (voltage - offset) * gain, and the same stage gain
//   for driving any output by hand.
// - Offset measurement helper averaging raw codes with the inputs shorted.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Full scale of the 24-bit front-end in codes per reference span.
const ADC_SCALE: f32 = (1u32 << 23) as f32;
/// Front-end reference voltage.
const ADC_VREF: f32 = 1.2;

/// Cathode voltage, V/code. 1.08 V on the ADC at 6 kV in.
pub const CATHODE_GAIN_DEFAULT: f32 = ADC_VREF * (100e3 / 50e3) * (500e6 / 180e3) / ADC_SCALE;
/// Extract and focus voltage, V/code. 1.16 V on the ADC at 6 kV in.
pub const EXTRACT_GAIN_DEFAULT: f32 = ADC_VREF * (100e3 / 24e3) * (100e6 / 76744.2) / ADC_SCALE;
pub const FOCUS_GAIN_DEFAULT: f32 = EXTRACT_GAIN_DEFAULT;
/// Anode current, A/code. 1.1985 V on the ADC at 50 µA in, inverting stage.
pub const ANODE_GAIN_DEFAULT: f32 = -1.0 * ADC_VREF * (100e3 / 47e3) * (1.0 / 51e3) / ADC_SCALE;
/// Duty per output volt of a high-voltage stage: 6 kV per 12 V converter, 16.3k/4.3k
/// driver gain, 3.3 V PWM swing.
pub const OUTPUT_DUTY_PER_VOLT: f32 = 1.0 / ((6000.0 / 12.0) * (16300.0 / 4300.0) * 3.3);
/// Pump, duty/V. 0.959 duty at 6 kV out.
pub const PUMP_GAIN_DEFAULT: f32 = OUTPUT_DUTY_PER_VOLT;

/// Open-loop duty for `voltage` on any high-voltage stage, for bring-up without feedback.
pub fn manual_duty(voltage: f32) -> f32 {
    voltage * OUTPUT_DUTY_PER_VOLT
}

/// Gain and zero offset of one front-end channel.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelCalibration {
    pub gain: f32,   // Physical unit per code
    pub offset: i32, // Code at zero input
}

impl ChannelCalibration {
    pub const fn new(gain: f32, offset: i32) -> Self {
        Self { gain, offset }
    }

    /// Converts a raw code into the physical value.
    #[inline(always)]
    pub fn to_physical(&self, raw: i32) -> f32 {
        self.gain * raw.saturating_sub(self.offset) as f32
    }
}

/// Linear open-loop mapping from requested pump voltage to duty.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PumpCalibration {
    pub gain: f32,   // duty/V
    pub offset: f32, // V
}

impl PumpCalibration {
    #[inline(always)]
    pub fn duty(&self, voltage: f32) -> f32 {
        (voltage - self.offset) * self.gain
    }
}

/// Calibration of all channels of both controllers.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub anode_current: ChannelCalibration, // Low side, front-end channel 0
    pub cathode_volt: ChannelCalibration,  // Low side, front-end channel 1
    pub extract_volt: ChannelCalibration,  // High side, front-end channel 0
    pub focus_volt: ChannelCalibration,    // High side, front-end channel 1
    pub pump: PumpCalibration,
}

impl Calibration {
    /// Nominal gains from the schematic, zero offsets.
    pub const fn nominal() -> Self {
        Self {
            anode_current: ChannelCalibration::new(ANODE_GAIN_DEFAULT, 0),
            cathode_volt: ChannelCalibration::new(CATHODE_GAIN_DEFAULT, 0),
            extract_volt: ChannelCalibration::new(EXTRACT_GAIN_DEFAULT, 0),
            focus_volt: ChannelCalibration::new(FOCUS_GAIN_DEFAULT, 0),
            pump: PumpCalibration {
                gain: PUMP_GAIN_DEFAULT,
                offset: 0.0,
            },
        }
    }

    /// Nominal gains corrected by the board trims (external reference / front-end reading)
    /// and the measured zero offsets.
    pub fn trimmed() -> Self {
        Self {
            anode_current: ChannelCalibration::new(ANODE_GAIN_DEFAULT * (10.0 / 9.62), -37850),
            cathode_volt: ChannelCalibration::new(CATHODE_GAIN_DEFAULT * (935.0 / 900.0), -29325),
            extract_volt: ChannelCalibration::new(EXTRACT_GAIN_DEFAULT * (759.6 / 735.4), -48034),
            focus_volt: ChannelCalibration::new(FOCUS_GAIN_DEFAULT * (734.0 / 708.2), -39380),
            pump: PumpCalibration {
                gain: PUMP_GAIN_DEFAULT,
                offset: 0.0,
            },
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::trimmed()
    }
}

/// Samples averaged by one offset measurement.
pub const OFFSET_SAMPLES: u32 = 10_000;

/// Averages raw codes of both front-end channels to find their zero offsets.
pub struct OffsetCalibrator {
    sums: [i64; 2],
    count: u32,
    samples: u32,
}

impl OffsetCalibrator {
    pub const fn new(samples: u32) -> Self {
        Self {
            sums: [0; 2],
            count: 0,
            samples,
        }
    }

    /// Adds one pair of codes. Returns the averaged offsets once `samples` were
    /// collected and starts over.
    pub fn add(&mut self, codes: [i32; 2]) -> Option<[i32; 2]> {
        self.sums[0] += codes[0] as i64;
        self.sums[1] += codes[1] as i64;
        self.count += 1;

        if self.count < self.samples {
            return None;
        }
        let n = self.count as i64;
        let offsets = [(self.sums[0] / n) as i32, (self.sums[1] / n) as i32];
        debug!("offsets ch0: {} ch1: {}", offsets[0], offsets[1]);
        self.sums = [0; 2];
        self.count = 0;
        Some(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cathode_code_converts_exactly() {
        let cal = Calibration::trimmed().cathode_volt;
        let raw = -29325 - 7000;
        assert_eq!(cal.to_physical(raw), cal.gain * (raw - cal.offset) as f32);
        assert!(cal.to_physical(raw) < 0.0);
    }

    #[test]
    fn nominal_gains_match_schematic() {
        assert!((CATHODE_GAIN_DEFAULT - 0.000794728636).abs() < 1e-9);
        assert!((EXTRACT_GAIN_DEFAULT - 0.000776666449).abs() < 1e-9);
        assert!((ANODE_GAIN_DEFAULT + 5.96792451e-12).abs() < 1e-17);
        assert!((PUMP_GAIN_DEFAULT - 0.000159881019).abs() < 1e-10);
    }

    #[test]
    fn pump_mapping_is_linear() {
        let pump = Calibration::trimmed().pump;
        assert_eq!(pump.duty(0.0), 0.0);
        assert!((pump.duty(6000.0) - 0.959286).abs() < 1e-4);
    }

    #[test]
    fn offset_calibrator_averages_and_restarts() {
        let mut cal = OffsetCalibrator::new(4);
        assert_eq!(cal.add([-100, 10]), None);
        assert_eq!(cal.add([-102, 12]), None);
        assert_eq!(cal.add([-98, 8]), None);
        assert_eq!(cal.add([-100, 10]), Some([-100, 10]));
        assert_eq!(cal.add([5, 5]), None);
    }

    #[test]
    fn manual_duty_matches_pump_mapping() {
        assert_eq!(manual_duty(3000.0), Calibration::nominal().pump.duty(3000.0));
    }
}
