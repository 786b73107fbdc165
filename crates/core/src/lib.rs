pub mod strng;
pub mod telemetry;
