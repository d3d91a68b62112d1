#![no_std]

pub mod battery;
pub mod flash;
pub mod front_end;
pub mod link;
pub mod panel;
pub mod pinout;
pub mod pwm;
pub mod tick;
