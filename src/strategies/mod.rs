pub mod algorithm;
pub mod options;
pub mod registry;
pub mod trend;

pub use algorithm::{Algorithm, AlgorithmError};
pub use options::Options;
pub use registry::AlgorithmRegistry;
pub use trend::Trend;
