pub mod regression;
pub mod timeseries;

pub use regression::{SignalError, TrendType};
pub use timeseries::{DataPoint, Timeseries};
