//! Infrastructure layer: configuration loading and engine wiring.

pub mod config;
pub mod setup;

pub use setup::{default_processor_id, Engine};
