pub mod moving_average;

pub use moving_average::{FilteredChannel, MovingAverage, MOVAVG_SIZE};
