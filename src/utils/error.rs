//! Error types shared across the monitoring subsystem.
//!
//! Periodic ticks never surface these to the scheduler; they are handled in place
//! and reported through `log`. Construction-time and lifecycle calls return them.

use std::io;
use thiserror::Error;

/// A single HAL read that failed. Carries the signal name so the monitor can
/// isolate the failure to that signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("hal read failed for `{signal}`: {reason}")]
pub struct HalError {
    pub signal: &'static str,
    pub reason: String,
}

impl HalError {
    pub fn new(signal: &'static str, reason: impl Into<String>) -> Self {
        Self {
            signal,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("periodic task `{0}` is already running")]
    AlreadyRunning(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
