use hal::gpio::Pin;

use hvsupply_algo::indicator::Indicator;

use super::pinout::{self, PinDef};

/// Active-high status LED.
pub struct Led {
    pin: Pin,
    on: bool,
}

impl Led {
    pub fn new(def: &PinDef) -> Self {
        let mut pin = def.init();
        pin.set_low();
        Led { pin, on: false }
    }
}

impl Indicator for Led {
    fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.on = on;
    }

    fn toggle(&mut self) {
        self.set(!self.on);
    }
}

/// Active-low key with the internal pull-up.
pub struct Key {
    pin: Pin,
}

impl Key {
    pub fn new(def: &PinDef) -> Self {
        let mut pin = def.init();
        pin.pull(hal::gpio::Pull::Up);
        Key { pin }
    }

    #[inline(always)]
    pub fn is_pressed(&self) -> bool {
        self.pin.is_low()
    }
}

/// Power latch, the supply switches itself off once released.
pub struct PowerLatch {
    pin: Pin,
}

impl PowerLatch {
    /// Latches the supply on.
    pub fn hold() -> Self {
        let mut pin = pinout::panel::PWR_LOCK.init();
        pin.set_high();
        PowerLatch { pin }
    }

    pub fn release(&mut self) {
        defmt::info!("POWER: latch released");
        self.pin.set_low();
    }
}
