// Status indicators driven by the core: fault (red) and link activity (green).

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// A single on/off indicator, usually an LED.
pub trait Indicator {
    fn set(&mut self, on: bool);
    fn toggle(&mut self);
}

/// Remembers whether the fault indicator was raised by this owner, so it only
/// clears faults it raised itself.
#[derive(Default)]
pub struct FaultLatch {
    raised: bool,
}

impl FaultLatch {
    pub const fn new() -> Self {
        Self { raised: false }
    }

    pub fn raise(&mut self, led: &mut impl Indicator) {
        led.set(true);
        self.raised = true;
    }

    pub fn release(&mut self, led: &mut impl Indicator) {
        if self.raised {
            led.set(false);
            self.raised = false;
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }
}

/// Minimum time between two activity toggles.
pub const BLINK_PERIOD_MS: u32 = 100;

/// Rate-limited toggling of an activity indicator.
#[derive(Default)]
pub struct Blinker {
    last_toggle_ms: u32,
}

impl Blinker {
    pub const fn new() -> Self {
        Self { last_toggle_ms: 0 }
    }

    /// Toggles `led` if at least `BLINK_PERIOD_MS` passed since the last toggle.
    pub fn blink(&mut self, led: &mut impl Indicator, now_ms: u32) {
        if now_ms.wrapping_sub(self.last_toggle_ms) > BLINK_PERIOD_MS {
            led.toggle();
            self.last_toggle_ms = now_ms;
        }
    }
}
