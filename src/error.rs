//! Custom error types for the application.
//!
//! This module defines the primary error type, `MapperError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of a field-mapping run, from
//! configuration and I/O problems to the two device-level conditions that
//! halt a scan: a move that never converges and a probe read that comes back
//! malformed.
//!
//! The scan executor deliberately performs no automatic retries. A
//! `MotionTimeout` or `ProbeRead` error halts the run at the failing point;
//! the operator restarts with an explicit `--restart` index. A field map with
//! silently skipped or duplicated points is worse than a run that stops and
//! asks.

use crate::geometry::Coordinate;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, MapperError>;

/// Application error type.
#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid scan region: {0}")]
    InvalidRegion(String),

    #[error("Invalid monitor parameters: {0}")]
    InvalidMonitor(String),

    #[error("Restart index {given} is out of range for a {total}-point sequence")]
    InvalidResumeIndex { given: usize, total: usize },

    #[error("Positioner did not converge on {target} within {elapsed:?}")]
    MotionTimeout {
        /// Commanded target position (logical frame).
        target: Coordinate,
        /// Time spent polling before giving up.
        elapsed: Duration,
    },

    #[error("Probe read failed: {0}")]
    ProbeRead(String),

    #[error("Output sink error: {0}")]
    OutputSink(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Serial support not enabled. Rebuild with --features {0}")]
    FeatureDisabled(&'static str),
}
