//! Task Registry
//!
//! The set of task instances currently being tracked, with the OS
//! process backing each. Shared between the lifecycle listener and the
//! sampler thread; every access goes through one mutex.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::lifecycle::TaskIdentity;
use crate::metrics::naming::sanitize;

/// A tracked task and its process id, as returned by [`TaskRegistry::list_active`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTask {
    pub task: TaskIdentity,
    pub pid: u32,
}

/// Registry key: the labels that end up in the metric path.
///
/// Two identities that sanitize to the same labels would write the
/// same gauge stream, so they share one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricLabels {
    airflow_id: String,
    dag_id: String,
    task_id: String,
}

impl MetricLabels {
    fn of(task: &TaskIdentity) -> Self {
        Self {
            airflow_id: task.airflow_id.clone(),
            dag_id: sanitize(&task.dag_id),
            task_id: sanitize(&task.task_id),
        }
    }
}

/// Concurrency-safe set of tracked task instances.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<MetricLabels, TrackedTask>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MetricLabels, TrackedTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking `task` backed by `pid`.
    ///
    /// An existing entry is overwritten (retried attempts get a new pid).
    /// Returns the previous pid, if any.
    pub fn register(&self, task: TaskIdentity, pid: u32) -> Option<u32> {
        let labels = MetricLabels::of(&task);
        let previous = self.lock().insert(labels, TrackedTask { task: task.clone(), pid })?;

        if previous.task != task {
            warn!(
                "Task {} shares metric names with {}; replacing it",
                task, previous.task
            );
        }
        Some(previous.pid)
    }

    /// Stops tracking `task`. Returns its pid, or `None` if it was not tracked.
    pub fn unregister(&self, task: &TaskIdentity) -> Option<u32> {
        self.lock()
            .remove(&MetricLabels::of(task))
            .map(|tracked| tracked.pid)
    }

    /// Stops tracking `task` only if it is still backed by `pid`.
    ///
    /// Returns true if the entry was removed.
    pub fn unregister_pid(&self, task: &TaskIdentity, pid: u32) -> bool {
        let mut tasks = self.lock();
        let labels = MetricLabels::of(task);

        match tasks.get(&labels) {
            Some(tracked) if tracked.pid == pid => {
                tasks.remove(&labels);
                true
            }
            _ => false,
        }
    }

    /// Returns a snapshot of all tracked tasks.
    ///
    /// The snapshot is a copy; callers may iterate it while other threads
    /// register and unregister.
    pub fn list_active(&self) -> Vec<TrackedTask> {
        self.lock().values().cloned().collect()
    }

    /// Removes and returns every tracked task.
    pub fn drain(&self) -> Vec<TrackedTask> {
        self.lock().drain().map(|(_, tracked)| tracked).collect()
    }

    /// Returns the pid tracked for `task`.
    pub fn pid_of(&self, task: &TaskIdentity) -> Option<u32> {
        self.lock().get(&MetricLabels::of(task)).map(|tracked| tracked.pid)
    }

    /// Returns true if `task` is tracked.
    pub fn contains(&self, task: &TaskIdentity) -> bool {
        self.pid_of(task).is_some()
    }

    /// Returns the number of tracked tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
