pub mod config;
pub mod decision;
pub mod delivery;
pub mod error;
pub mod ingestion;
pub mod telemetry;
