// Ziegler-Nichols helper: measures the oscillation period of a loop driven to its
// stability limit, from the rising edges of its measurement.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Periods averaged per report.
pub const OSC_PERIODS: u32 = 10;

pub struct OscillationMeter {
    last_sample: f32,
    rising: bool,
    last_edge_ms: Option<u32>,
    accumulated_ms: u32,
    count: u32,
    periods: u32,
}

impl OscillationMeter {
    pub const fn new(periods: u32) -> Self {
        Self {
            last_sample: f32::NAN,
            rising: false,
            last_edge_ms: None,
            accumulated_ms: 0,
            count: 0,
            periods,
        }
    }

    /// Feeds one measurement taken at `now_ms`. Returns the average period in ms
    /// every `periods` oscillations.
    pub fn add(&mut self, sample: f32, now_ms: u32) -> Option<u32> {
        let mut report = None;
        if sample > self.last_sample {
            if !self.rising {
                // Falling to rising: one full period since the previous edge
                if let Some(prev) = self.last_edge_ms {
                    self.accumulated_ms = self.accumulated_ms.wrapping_add(now_ms.wrapping_sub(prev));
                    self.count += 1;
                }
                self.last_edge_ms = Some(now_ms);

                if self.count >= self.periods {
                    let period = self.accumulated_ms / self.count;
                    debug!("oscillation period {} ms", period);
                    self.accumulated_ms = 0;
                    self.count = 0;
                    report = Some(period);
                }
            }
            self.rising = true;
        } else {
            self.rising = false;
        }
        self.last_sample = sample;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_period() {
        const SHAPE: [f32; 10] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        let mut meter = OscillationMeter::new(OSC_PERIODS);
        let mut reports = 0;
        for i in 0..(10 * 12) {
            if let Some(period) = meter.add(SHAPE[i % 10], i as u32 * 5) {
                assert_eq!(period, 50);
                reports += 1;
            }
        }
        assert_eq!(reports, 1);
    }
}
