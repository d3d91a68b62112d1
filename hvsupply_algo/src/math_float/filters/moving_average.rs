// Implements a fixed-length moving average filter over f32 samples, used on every
// monitored analog channel (anode current, cathode, extract and focus voltage, battery).

// Key Features:
// - Circular buffer with constant capacity chosen at compile time.
// - Incremental running sum: each sample evicts the oldest value and adds the new one.
// - Full resynchronization of the sum from the buffer on every wraparound,
//   which bounds the rounding drift accumulated by the incremental updates.
// - `FilteredChannel` wrapper that either filters or passes samples through,
//   selected once when the channel is constructed.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Buffer length used by the sampling pipeline and the battery monitor.
pub const MOVAVG_SIZE: usize = 33;

/// Moving average over the last `N` samples.
pub struct MovingAverage<const N: usize> {
    buffer: [f32; N], // Last N samples, oldest at `idx`
    sum: f32,         // Running sum of `buffer`
    idx: usize,       // Next write position
}

impl<const N: usize> MovingAverage<N> {
    /// Creates a filter with a zeroed buffer.
    pub const fn new() -> Self {
        Self {
            buffer: [0.0; N],
            sum: 0.0,
            idx: 0,
        }
    }

    /// Zeroes the buffer, the sum and the write position.
    pub fn reset(&mut self) {
        self.buffer = [0.0; N];
        self.sum = 0.0;
        self.idx = 0;
    }

    /// Pushes `sample`, drops the oldest one and returns the new average.
    pub fn add_sample(&mut self, sample: f32) -> f32 {
        self.sum -= self.buffer[self.idx];
        self.buffer[self.idx] = sample;
        self.sum += sample;

        self.idx += 1;
        if self.idx >= N {
            self.idx = 0;
            // Resync: drop whatever the incremental updates accumulated
            self.sum = self.buffer.iter().fold(0.0, |acc, x| acc + x);
        }

        self.average()
    }

    /// Current average without adding a sample.
    #[inline(always)]
    pub fn average(&self) -> f32 {
        self.sum / N as f32
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One analog channel that is either averaged or passed straight through.
pub struct FilteredChannel {
    filter: Option<MovingAverage<MOVAVG_SIZE>>,
}

impl FilteredChannel {
    pub const fn new(filtered: bool) -> Self {
        Self {
            filter: if filtered {
                Some(MovingAverage::new())
            } else {
                None
            },
        }
    }

    #[inline(always)]
    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// Feeds `sample` through the filter if there is one.
    #[inline(always)]
    pub fn apply(&mut self, sample: f32) -> f32 {
        match self.filter.as_mut() {
            Some(filter) => filter.add_sample(sample),
            None => sample,
        }
    }

    pub fn reset(&mut self) {
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_average(window: &[f32]) -> f32 {
        window.iter().fold(0.0, |acc, x| acc + x) / window.len() as f32
    }

    #[test]
    fn average_tracks_last_window() {
        let mut filter = MovingAverage::<MOVAVG_SIZE>::new();
        let samples: [f32; 200] = core::array::from_fn(|i| ((i * 37) % 101) as f32 * 0.5 - 12.0);

        for (i, &x) in samples.iter().enumerate() {
            let avg = filter.add_sample(x);
            let start = (i + 1).saturating_sub(MOVAVG_SIZE);
            // Samples before the window are zeros in the buffer
            let expected = samples[start..=i].iter().fold(0.0, |acc, x| acc + x) / MOVAVG_SIZE as f32;
            assert!((avg - expected).abs() < 1e-4, "sample {}: {} vs {}", i, avg, expected);
        }
    }

    #[test]
    fn wraparound_matches_naive_sum_exactly() {
        let mut filter = MovingAverage::<4>::new();
        let samples = [1.0e6_f32, 0.1, -3.3, 7.77, 1.0e-3, 42.0, -1.0e6, 0.3];

        for &x in &samples[..4] {
            filter.add_sample(x);
        }
        // Write position is back at 0: sum was rebuilt from the buffer
        assert_eq!(filter.average(), naive_average(&samples[..4]));

        for &x in &samples[4..] {
            filter.add_sample(x);
        }
        assert_eq!(filter.average(), naive_average(&samples[4..]));
    }

    #[test]
    fn constant_input_settles_to_constant() {
        let mut filter = MovingAverage::<MOVAVG_SIZE>::new();
        let mut avg = 0.0;
        for _ in 0..MOVAVG_SIZE {
            avg = filter.add_sample(-2500.0);
        }
        assert_eq!(avg, -2500.0);
    }

    #[test]
    fn bypassed_channel_passes_samples() {
        let mut ch = FilteredChannel::new(false);
        assert!(!ch.is_filtered());
        assert_eq!(ch.apply(3.25), 3.25);

        let mut ch = FilteredChannel::new(true);
        assert_eq!(ch.apply(33.0), 1.0);
    }
}
