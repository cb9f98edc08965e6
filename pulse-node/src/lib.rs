pub mod cli;
pub mod config;
pub mod error;
pub mod runtime;

pub use config::Config;
pub use error::{NodeError, Result};
pub use runtime::builder::{build_runtime, PulseRuntime};
pub use runtime::pulse_driver::{DriverSummary, PulseDriver};
