// Implements the battery monitor of the low-side controller, turning raw ADC readings
// into a filtered cell voltage and a state of charge estimate.

// Key Features:
// - Scales 12-bit ADC codes through the input divider to volts
// - Smooths the voltage with the shared moving average filter
// - Linear state of charge between 3.0 V (empty) and 4.2 V (full)
// - Flags a low battery below a fixed threshold, once the filter window has filled

// Detailed Operation:
// Each `tick` converts the conversion result to the cell voltage, feeds it through the
// moving average and derives the percentage from the filtered value. The low battery flag
// follows the filtered voltage so single noisy readings cannot toggle it.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_float::filters::{MovingAverage, MOVAVG_SIZE};
use crate::system::BatteryState;

/// Volts per ADC code: 3.3 V reference, 1:2 divider, trimmed against a meter.
pub const BATTERY_VOLT_PER_CODE: f32 = 6.6 * (3.74 / 3.64) / 4095.0;
/// Cell voltage reported as 0 %.
pub const BATTERY_EMPTY_V: f32 = 3.0;
/// Span from empty to full.
pub const BATTERY_SPAN_V: f32 = 1.2;
/// Below this the low battery flag is raised.
pub const BATTERY_LOW_V: f32 = 3.3;

/// Manages battery voltage measurements with moving average filtering
pub struct BatteryMonitor {
    /// Moving average over the converted voltages
    filter: MovingAverage<MOVAVG_SIZE>,

    /// Latest filtered voltage and charge estimate
    state: BatteryState,

    /// Filtered voltage below `BATTERY_LOW_V`
    low: bool,

    /// Conversions seen, saturating at the filter length
    scans: usize,
}

impl BatteryMonitor {
    pub const fn new() -> Self {
        BatteryMonitor {
            filter: MovingAverage::new(),
            state: BatteryState {
                volt: 0.0,
                percent: 0.0,
            },
            low: false,
            scans: 0,
        }
    }

    /// Processes one ADC conversion result
    pub fn tick(&mut self, adc_code: u16) -> &Self {
        let volt = self.filter.add_sample(adc_code as f32 * BATTERY_VOLT_PER_CODE); // Scale and smooth
        let percent = 100.0 * (volt - BATTERY_EMPTY_V) / BATTERY_SPAN_V;
        self.state = BatteryState {
            volt,
            percent: percent.clamp(0.0, 100.0), // Readings beyond the span saturate
        };
        // The zeroed window drags the average down until it is full
        self.scans = (self.scans + 1).min(MOVAVG_SIZE);
        self.low = self.scans >= MOVAVG_SIZE && volt < BATTERY_LOW_V;
        self
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn is_low(&self) -> bool {
        self.low
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_for(volt: f32) -> u16 {
        (volt / BATTERY_VOLT_PER_CODE) as u16
    }

    #[test]
    fn full_cell_reads_full() {
        let mut battery = BatteryMonitor::new();
        for _ in 0..MOVAVG_SIZE {
            battery.tick(code_for(4.2));
        }
        assert!((battery.state().volt - 4.2).abs() < 0.01);
        assert!(battery.state().percent > 98.0);
        assert!(!battery.is_low());
    }

    #[test]
    fn warm_up_does_not_flag_low() {
        let mut battery = BatteryMonitor::new();
        battery.tick(code_for(4.0));
        assert!(battery.state().volt < BATTERY_LOW_V);
        assert!(!battery.is_low());

        for _ in 1..MOVAVG_SIZE {
            battery.tick(code_for(4.0));
            assert!(!battery.is_low());
        }
        assert!(battery.state().volt > BATTERY_LOW_V);
    }

    #[test]
    fn empty_cell_raises_flag() {
        let mut battery = BatteryMonitor::new();
        for _ in 0..MOVAVG_SIZE {
            battery.tick(code_for(3.1));
        }
        assert!(battery.is_low());
        assert!(battery.state().percent < 10.0);
        assert!(battery.state().percent >= 0.0);
    }
}
