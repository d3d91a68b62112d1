// Liveness watchdog of the telemetry receiver.
//
// Fed from the receive context on every framed reception, decremented from the 1 ms
// system tick. Both sides only touch one atomic counter.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::sync::atomic::{AtomicU32, Ordering};

use crate::system::SystemFlags;

/// Watchdog ceiling in system ticks (1 ms): 25 frame periods at 250 SPS.
pub const COMM_WATCHDOG_TICKS: u32 = 100;

pub struct LinkWatchdog {
    remaining: AtomicU32,
    ceiling: u32,
}

impl LinkWatchdog {
    /// Creates an expired watchdog: no link until the first frame arrives.
    pub const fn new(ceiling: u32) -> Self {
        Self {
            remaining: AtomicU32::new(0),
            ceiling,
        }
    }

    /// Re-arms the counter to its ceiling.
    #[inline(always)]
    pub fn feed(&self) {
        self.remaining.store(self.ceiling, Ordering::Release);
    }

    /// Advances one system tick. Returns true on the tick the counter reaches zero,
    /// after forcing communication-ok false.
    pub fn tick(&self, flags: &SystemFlags) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));

        match previous {
            Ok(1) => {
                flags.set_communication_ok(false);
                warn!("link: no frame for {} ms", self.ceiling);
                true
            }
            _ => false,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_once_at_zero() {
        let flags = SystemFlags::new();
        let watchdog = LinkWatchdog::new(5);

        watchdog.feed();
        flags.set_communication_ok(true);

        for _ in 0..4 {
            assert!(!watchdog.tick(&flags));
            assert!(flags.communication_ok());
        }
        assert!(watchdog.tick(&flags));
        assert!(!flags.communication_ok());

        // Stays expired without further events
        for _ in 0..10 {
            assert!(!watchdog.tick(&flags));
        }
        assert_eq!(watchdog.remaining(), 0);
    }

    #[test]
    fn feeding_postpones_expiry() {
        let flags = SystemFlags::new();
        let watchdog = LinkWatchdog::new(3);
        flags.set_communication_ok(true);
        watchdog.feed();

        for _ in 0..10 {
            assert!(!watchdog.tick(&flags));
            watchdog.feed();
        }
        assert!(flags.communication_ok());
    }

    #[test]
    fn never_fed_never_fires() {
        let flags = SystemFlags::new();
        let watchdog = LinkWatchdog::new(COMM_WATCHDOG_TICKS);
        for _ in 0..1000 {
            assert!(!watchdog.tick(&flags));
        }
    }
}
