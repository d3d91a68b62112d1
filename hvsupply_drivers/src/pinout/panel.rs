//! Operator panel: status LEDs (active high), keys (active low) and the power latch.
use super::PinDef;
use super::{PinMode, Port};

pub const LED_RED: PinDef = PinDef {
    port: Port::C,
    pin: 12,
    mode: PinMode::Output,
};

pub const LED_GREEN: PinDef = PinDef {
    port: Port::C,
    pin: 10,
    mode: PinMode::Output,
};

pub const LED_BLUE: PinDef = PinDef {
    port: Port::A,
    pin: 15,
    mode: PinMode::Output,
};

pub const LED_ORANGE: PinDef = PinDef {
    port: Port::C,
    pin: 11,
    mode: PinMode::Output,
};

pub const KEY_PWR: PinDef = PinDef {
    port: Port::B,
    pin: 15,
    mode: PinMode::Input,
};

pub const KEY_ENTER: PinDef = PinDef {
    port: Port::C,
    pin: 8,
    mode: PinMode::Input,
};

/// Keeps the supply switched on while high.
pub const PWR_LOCK: PinDef = PinDef {
    port: Port::B,
    pin: 14,
    mode: PinMode::Output,
};

/// Battery divider, ADC1 channel 1.
pub const BATTERY_SENSE: PinDef = PinDef {
    port: Port::C,
    pin: 0,
    mode: PinMode::Analog,
};
