pub mod pid;

pub use pid::{Direction, PidConfig, PidMode, PID};
