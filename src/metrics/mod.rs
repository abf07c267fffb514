//! Metrics Module
//!
//! Naming and transmission of per-task gauges.
//!
//! # Components
//!
//! - [`naming`]: sanitized, stable metric paths
//! - [`reporter`]: best-effort StatsD emission plus logging

pub mod naming;
pub mod reporter;

pub use naming::{build_name, sanitize, MetricKey, MetricType};
pub use reporter::{MetricSink, RecordingSink, Reporter, StatsdSink};
