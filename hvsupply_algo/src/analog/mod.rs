pub mod battery;
pub mod calibration;
pub mod front_end;
pub mod sampling;
