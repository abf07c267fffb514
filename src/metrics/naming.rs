//! Metric Naming
//!
//! Builds the dotted StatsD path for a task's gauge:
//!
//! ```text
//! custom_metrics_cpu_usage_percent.<airflow_id>.<dag_id>.<task_id>
//! custom_metrics_memory_usage_bytes.<airflow_id>.<dag_id>.<task_id>
//! ```
//!
//! Dots inside `dag_id` and `task_id` are replaced with `__` so that each
//! identifier stays a single path segment in the sink.

use std::fmt;

use crate::lifecycle::TaskIdentity;

/// Path prefix of the CPU gauge.
pub const CPU_METRIC_PREFIX: &str = "custom_metrics_cpu_usage_percent";

/// Path prefix of the memory gauge.
pub const MEMORY_METRIC_PREFIX: &str = "custom_metrics_memory_usage_bytes";

/// Kind of gauge reported per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// CPU usage in percent
    Cpu,
    /// Resident memory in bytes
    Memory,
}

impl MetricType {
    /// Every metric type, in emission order.
    pub const ALL: [MetricType; 2] = [MetricType::Cpu, MetricType::Memory];

    /// Returns the fixed path prefix for this type.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Cpu => CPU_METRIC_PREFIX,
            Self::Memory => MEMORY_METRIC_PREFIX,
        }
    }
}

/// Replaces every `.` with `__`.
pub fn sanitize(segment: &str) -> String {
    segment.replace('.', "__")
}

/// Builds the full metric path for one gauge stream.
pub fn build_name(metric_type: MetricType, airflow_id: &str, dag_id: &str, task_id: &str) -> String {
    format!(
        "{}.{}.{}.{}",
        metric_type.prefix(),
        airflow_id,
        sanitize(dag_id),
        sanitize(task_id)
    )
}

/// Identifies one gauge stream: a metric type plus sanitized task labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub metric_type: MetricType,
    pub airflow_id: String,
    pub dag_id: String,
    pub task_id: String,
}

impl MetricKey {
    /// Derives the key of `metric_type` for a task.
    pub fn for_task(metric_type: MetricType, task: &TaskIdentity) -> Self {
        Self {
            metric_type,
            airflow_id: task.airflow_id.clone(),
            dag_id: sanitize(&task.dag_id),
            task_id: sanitize(&task.task_id),
        }
    }

    /// Returns the metric path for this key.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.metric_type.prefix(),
            self.airflow_id,
            self.dag_id,
            self.task_id
        )
    }
}
