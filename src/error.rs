//! Typed error kinds for the pipeline, servo, and configuration layers.
//!
//! Fatal-vs-recoverable is encoded structurally rather than by convention:
//! binary entry points match on [`PipelineError`] and decide the exit code
//! from the variant alone.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the servo serial client (C9).
#[derive(Debug, Error)]
pub enum ServoError {
    #[error("short write to servo channel {channel}: wrote {wrote} of {expected} bytes")]
    ShortWrite {
        channel: u8,
        wrote: usize,
        expected: usize,
    },

    #[error("short read from servo channel {channel}: read {read} of {expected} bytes")]
    ShortRead {
        channel: u8,
        read: usize,
        expected: usize,
    },

    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    #[error("i/o error talking to servo board: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel {0} is out of range 0..=5")]
    InvalidChannel(u8),

    #[error("calibration file {path:?} could not be read or parsed: {reason}")]
    CalibrationFile { path: PathBuf, reason: String },
}

/// Top-level error kind, one variant per §7 of the design.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not open source: {0}")]
    SourceOpen(String),

    #[error("frame decode failed at source: {0}")]
    SourceDecode(String),

    #[error("queue closed unexpectedly: {0}")]
    QueueClosed(&'static str),

    #[error("worker job {index} panicked: {message}")]
    WorkerPanic { index: u64, message: String },

    #[error("servo protocol error: {0}")]
    Protocol(#[from] ServoError),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("required config key {0:?} is missing")]
    ConfigMissing(String),

    #[error("config key {key:?} has the wrong type: expected {expected}")]
    ConfigType { key: String, expected: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("no input arrived in the start queue before warmup timed out")]
    NoInput,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
