pub mod adversus;
pub mod env;
pub mod telemetry;
