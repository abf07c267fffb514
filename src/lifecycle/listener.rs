//! Task Lifecycle Listener
//!
//! Reacts to task state changes reported by the orchestrator. A task
//! entering `running` is registered with its pid; a task entering any
//! stopped state has both gauges zeroed and is unregistered.
//!
//! Callbacks run on the orchestrator's own thread, so they only touch
//! the registry and emit two datagrams. Sampling happens elsewhere.

use std::sync::Arc;

use log::{debug, info};

use crate::metrics::reporter::Reporter;
use crate::monitoring::TaskRegistry;

use super::task::{TaskEvent, TaskIdentity, TaskState};

/// Receiver of task state-change notifications.
pub trait TaskStateListener: Send + Sync {
    /// Called once per state transition of a task instance.
    fn on_task_state_changed(&self, task: &TaskIdentity, state: TaskState);

    /// Convenience for adapters that deliver whole events.
    fn on_event(&self, event: &TaskEvent) {
        self.on_task_state_changed(&event.task, event.state);
    }
}

/// Listener that keeps the task registry in sync with task lifecycles.
#[derive(Debug)]
pub struct TaskMonitorListener {
    enabled: bool,
    registry: Arc<TaskRegistry>,
    reporter: Reporter,
}

impl TaskMonitorListener {
    /// Creates a listener. A disabled listener ignores every notification.
    pub fn new(enabled: bool, registry: Arc<TaskRegistry>, reporter: Reporter) -> Self {
        Self {
            enabled,
            registry,
            reporter,
        }
    }

    /// Returns true if notifications are acted on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_running(&self, task: &TaskIdentity, pid: u32) {
        info!(
            "Task {} in DAG {} is starting (pid {})",
            task.task_id, task.dag_id, pid
        );

        if let Some(previous) = self.registry.register(task.clone(), pid) {
            debug!("Task {} re-registered, pid {} -> {}", task, previous, pid);
        }
    }

    fn finalize(&self, task: &TaskIdentity, state: TaskState) {
        self.registry.unregister(task);
        self.reporter.zero_task(task);

        info!(
            "Task {} in DAG {} completed ({})",
            task.task_id, task.dag_id, state
        );
    }

    /// Zeroes and unregisters every task still tracked.
    ///
    /// Called when the host shuts down. Returns the number of tasks swept.
    pub fn before_stopping(&self) -> usize {
        if !self.enabled {
            return 0;
        }

        let remaining = self.registry.drain();
        for tracked in &remaining {
            self.reporter.zero_task(&tracked.task);
        }

        if !remaining.is_empty() {
            info!("Finalized {} task(s) still tracked at shutdown", remaining.len());
        }
        remaining.len()
    }
}

impl TaskStateListener for TaskMonitorListener {
    fn on_task_state_changed(&self, task: &TaskIdentity, state: TaskState) {
        if !self.enabled {
            return;
        }

        match state {
            TaskState::Running { pid } => self.on_running(task, pid),
            state if state.is_stopped() => self.finalize(task, state),
            state => debug!("Ignoring state {} for task {}", state, task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::reporter::RecordingSink;

    const CPU_NAME: &str = "custom_metrics_cpu_usage_percent.prod1.example_dag.example_task__test";
    const MEMORY_NAME: &str = "custom_metrics_memory_usage_bytes.prod1.example_dag.example_task__test";

    fn setup(enabled: bool) -> (Arc<TaskRegistry>, Arc<RecordingSink>, TaskMonitorListener) {
        let registry = Arc::new(TaskRegistry::new());
        let sink = Arc::new(RecordingSink::new());
        let listener = TaskMonitorListener::new(enabled, Arc::clone(&registry), Reporter::new(sink.clone()));
        (registry, sink, listener)
    }

    fn example_task() -> TaskIdentity {
        TaskIdentity::new("prod1", "example_dag", "example_task.test")
    }

    #[test]
    fn test_running_registers_task() {
        let (registry, sink, listener) = setup(true);

        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 1234 });

        assert_eq!(registry.pid_of(&example_task()), Some(1234));
        assert!(sink.emissions().is_empty());
    }

    #[test]
    fn test_failed_zeroes_and_unregisters() {
        let (registry, sink, listener) = setup(true);
        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 1234 });

        listener.on_task_state_changed(&example_task(), TaskState::Failed);

        assert_eq!(sink.values_for(CPU_NAME), vec![0.0]);
        assert_eq!(sink.values_for(MEMORY_NAME), vec![0.0]);
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_every_stopped_state_finalizes() {
        for state in [
            TaskState::Success,
            TaskState::Failed,
            TaskState::Skipped,
            TaskState::UpstreamFailed,
            TaskState::Deferred,
            TaskState::UpForRetry,
            TaskState::UpForReschedule,
            TaskState::Removed,
            TaskState::Restarting,
        ] {
            assert!(state.is_stopped(), "{}", state);
            let (registry, sink, listener) = setup(true);
            listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 1 });
            listener.on_task_state_changed(&example_task(), state);

            assert!(registry.is_empty(), "{}", state);
            assert_eq!(sink.last_value(CPU_NAME), Some(0.0), "{}", state);
            assert_eq!(sink.last_value(MEMORY_NAME), Some(0.0), "{}", state);
        }
    }

    #[test]
    fn test_stop_without_start_still_zeroes() {
        let (registry, sink, listener) = setup(true);

        listener.on_task_state_changed(&example_task(), TaskState::Skipped);

        assert!(registry.is_empty());
        assert_eq!(sink.emissions().len(), 2);
    }

    #[test]
    fn test_repeated_stop_is_harmless() {
        let (_registry, sink, listener) = setup(true);
        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 1 });

        listener.on_task_state_changed(&example_task(), TaskState::Success);
        listener.on_task_state_changed(&example_task(), TaskState::Success);

        assert_eq!(sink.values_for(CPU_NAME), vec![0.0, 0.0]);
    }

    #[test]
    fn test_deferred_then_resumed_registers_new_pid() {
        let (registry, _sink, listener) = setup(true);
        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 10 });
        listener.on_task_state_changed(&example_task(), TaskState::Deferred);
        assert!(!registry.contains(&example_task()));

        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 20 });
        assert_eq!(registry.pid_of(&example_task()), Some(20));
    }

    #[test]
    fn test_queued_is_ignored() {
        let (registry, sink, listener) = setup(true);
        listener.on_task_state_changed(&example_task(), TaskState::Queued);
        assert!(registry.is_empty());
        assert!(sink.emissions().is_empty());
    }

    #[test]
    fn test_disabled_listener_is_noop() {
        let (registry, sink, listener) = setup(false);
        assert!(!listener.is_enabled());

        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 1 });
        listener.on_task_state_changed(&example_task(), TaskState::Failed);

        assert!(registry.is_empty());
        assert!(sink.emissions().is_empty());
        assert_eq!(listener.before_stopping(), 0);
    }

    #[test]
    fn test_before_stopping_sweeps_tracked_tasks() {
        let (registry, sink, listener) = setup(true);
        listener.on_task_state_changed(&example_task(), TaskState::Running { pid: 1 });
        listener.on_task_state_changed(&TaskIdentity::new("prod1", "other", "t"), TaskState::Running { pid: 2 });

        assert_eq!(listener.before_stopping(), 2);
        assert!(registry.is_empty());
        assert_eq!(sink.emissions().len(), 4);
        assert_eq!(sink.last_value(MEMORY_NAME), Some(0.0));
    }

    #[test]
    fn test_on_event_dispatches() {
        let (registry, _sink, listener) = setup(true);
        let event = TaskEvent {
            task: example_task(),
            state: TaskState::Running { pid: 99 },
        };
        listener.on_event(&event);
        assert_eq!(registry.pid_of(&example_task()), Some(99));
    }
}
