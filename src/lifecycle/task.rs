//! Task Identity and State
//!
//! Value types describing one task instance as the orchestrator
//! reports it. The orchestrator owns the real task objects; the core
//! only ever sees these small copies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a task instance.
///
/// `airflow_id` names the orchestrator deployment so that several
/// workers reporting to one sink stay distinguishable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskIdentity {
    /// Orchestrator instance name
    pub airflow_id: String,
    /// Workflow (DAG) identifier
    pub dag_id: String,
    /// Task identifier within the DAG
    pub task_id: String,
}

impl TaskIdentity {
    /// Creates a new task identity.
    pub fn new(
        airflow_id: impl Into<String>,
        dag_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            airflow_id: airflow_id.into(),
            dag_id: dag_id.into(),
            task_id: task_id.into(),
        }
    }
}

impl fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.airflow_id, self.dag_id, self.task_id)
    }
}

/// Lifecycle state reported by the orchestrator.
///
/// `Running` carries the OS process id backing the attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Scheduled,
    Queued,
    Running { pid: u32 },
    Success,
    Failed,
    Skipped,
    UpstreamFailed,
    Deferred,
    UpForRetry,
    UpForReschedule,
    Removed,
    Restarting,
}

impl TaskState {
    /// Returns true for states that end the current attempt's process.
    ///
    /// `Deferred` counts as stopped: a resumed task arrives as a fresh
    /// `Running` notification with its new pid.
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::Failed
                | Self::Skipped
                | Self::UpstreamFailed
                | Self::Deferred
                | Self::UpForRetry
                | Self::UpForReschedule
                | Self::Removed
                | Self::Restarting
        )
    }

    /// Returns the snake_case state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Queued => "queued",
            Self::Running { .. } => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::UpstreamFailed => "upstream_failed",
            Self::Deferred => "deferred",
            Self::UpForRetry => "up_for_retry",
            Self::UpForReschedule => "up_for_reschedule",
            Self::Removed => "removed",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One state-change notification, as delivered by an integration adapter.
///
/// # Example JSON
///
/// ```json
/// {"airflow_id": "prod1", "dag_id": "etl", "task_id": "load", "state": "running", "pid": 1234}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    #[serde(flatten)]
    pub task: TaskIdentity,
    #[serde(flatten)]
    pub state: TaskState,
}
