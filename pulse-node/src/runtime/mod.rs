pub mod builder;
pub mod pulse_driver;
