//! TaskMetrics - Per-Task Resource Gauges
//!
//! Watches the CPU and memory of tasks run by a workflow orchestrator and
//! reports them as StatsD gauges. When a task stops, its gauges are reset
//! to zero so dashboards never show stale values for finished work.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`lifecycle`]: Task identities and the state-change listener
//! - [`monitoring`]: Task registry, process probe and periodic sampler
//! - [`metrics`]: Metric naming and StatsD reporting
//! - [`config`]: Environment-backed plugin configuration
//!
//! [`MetricsPlugin`] wires them together from one [`PluginConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use taskmetrics::lifecycle::{TaskIdentity, TaskState, TaskStateListener};
//! use taskmetrics::{MetricsPlugin, PluginConfig};
//!
//! fn main() {
//!     let plugin = MetricsPlugin::start(PluginConfig::from_env());
//!
//!     let task = TaskIdentity::new("prod1", "example_dag", "example_task.test");
//!     plugin
//!         .listener()
//!         .on_task_state_changed(&task, TaskState::Running { pid: 1234 });
//!
//!     // Gauges such as
//!     // custom_metrics_cpu_usage_percent.prod1.example_dag.example_task__test
//!     // are now reported every interval.
//!
//!     plugin.listener().on_task_state_changed(&task, TaskState::Failed);
//!     plugin.shutdown();
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod monitoring;
pub mod plugin;

// Re-export commonly used types
pub use config::PluginConfig;
pub use error::{MonitorError, Result};
pub use lifecycle::{TaskIdentity, TaskMonitorListener, TaskState, TaskStateListener};
pub use plugin::MetricsPlugin;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "TaskMetrics";
