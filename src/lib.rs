pub mod errors;
mod macros;
pub mod refine;
pub mod report;
pub mod rules;
pub mod telemetry;
