pub mod control;
pub mod errors;
pub mod mission_config;
pub mod simulator;
pub mod telemetry;
pub mod world;
