use super::PinDef;
use super::{PinMode, Port};

/// USART1 towards the isolation barrier.
pub const USART1_TX: PinDef = PinDef {
    port: Port::B,
    pin: 6,
    mode: PinMode::Alt(7),
};

pub const USART1_RX: PinDef = PinDef {
    port: Port::B,
    pin: 7,
    mode: PinMode::Alt(7),
};
