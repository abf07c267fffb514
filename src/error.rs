//! Error Types
//!
//! Failures that can surface while tracking tasks. Sampling and
//! lifecycle paths never propagate these; they log and move on.

use std::io;

use thiserror::Error;

/// Errors raised by the monitoring core and the integration adapter.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The process backing a tracked task is gone.
    #[error("process {pid} no longer exists")]
    ProcessVanished { pid: u32 },

    /// Reading one process's stats failed for another reason.
    #[error("failed to sample process {pid}: {reason}")]
    Sample { pid: u32, reason: String },

    /// Socket setup or adapter input failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The StatsD client could not be set up.
    #[error("StatsD client error: {0}")]
    Statsd(#[from] cadence::MetricError),

    /// A task event line could not be decoded.
    #[error("invalid task event on line {line}: {source}")]
    Event {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MonitorError>;
