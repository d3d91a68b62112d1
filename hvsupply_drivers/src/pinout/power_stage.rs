//! TIM1 outputs driving the high-voltage converters.
use super::PinDef;
use super::{PinMode, Port};

/// Cathode converter, TIM1_CH1N
pub const PWM_CATHODE: PinDef = PinDef {
    port: Port::B,
    pin: 13,
    mode: PinMode::Alt(1),
};

/// Extract converter, TIM1_CH2
pub const PWM_EXTRACT: PinDef = PinDef {
    port: Port::A,
    pin: 9,
    mode: PinMode::Alt(1),
};

/// Focus converter, TIM1_CH3
pub const PWM_FOCUS: PinDef = PinDef {
    port: Port::A,
    pin: 10,
    mode: PinMode::Alt(1),
};

/// Ion pump converter, TIM1_CH4
pub const PWM_PUMP: PinDef = PinDef {
    port: Port::A,
    pin: 11,
    mode: PinMode::Alt(1),
};
