pub mod config;
pub mod logging;

pub mod engine;
pub mod error;
pub mod formats;
pub mod job;
pub mod orchestrator;
pub mod progress;
pub mod sink;
