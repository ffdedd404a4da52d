//! Real-time video-analysis pipeline: a bounded-queue producer/worker-pool/consumer
//! pipeline feeding a multi-track appearance correlator and an optional pan/tilt
//! servo controller.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod servo;
pub mod tracker;

pub use error::{PipelineError, Result};

/// Installs the process-wide logger from a parsed [`config::LogLevel`].
///
/// Binaries call this once, before constructing any component, so that every
/// component can log through the plain `log` facade macros without owning a
/// logger instance of its own.
pub fn init_logging(level: config::LogLevel) {
    let filter = match level {
        config::LogLevel::Debug => log::LevelFilter::Debug,
        config::LogLevel::Info => log::LevelFilter::Info,
        config::LogLevel::Warning => log::LevelFilter::Warn,
        config::LogLevel::Error | config::LogLevel::Critical => log::LevelFilter::Error,
    };

    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp_millis()
        .try_init();
}
