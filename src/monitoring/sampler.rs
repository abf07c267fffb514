//! Periodic Sampler
//!
//! A background thread that, every interval, reads CPU and memory for each
//! tracked task and reports both gauges. Failures are contained per task:
//! one unreadable process never stops the rest of the cycle.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::PluginConfig;
use crate::error::{MonitorError, Result};
use crate::metrics::naming::{MetricKey, MetricType};
use crate::metrics::reporter::{format_bytes, Reporter};

use super::process::{ProcessProbe, ProcessSample, SysinfoProbe};
use super::registry::{TaskRegistry, TrackedTask};

/// Longest uninterrupted sleep, so a stop request is noticed quickly.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome counts of one sampling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Tasks whose gauges were reported
    pub sampled: usize,
    /// Tasks whose process no longer exists
    pub vanished: usize,
    /// Tasks whose read failed for any other reason
    pub failed: usize,
}

/// Reads tracked processes and reports their gauges.
pub struct Sampler<P: ProcessProbe = SysinfoProbe> {
    registry: Arc<TaskRegistry>,
    reporter: Reporter,
    probe: P,
}

impl Sampler<SysinfoProbe> {
    /// Creates a sampler reading real processes through `sysinfo`.
    pub fn new(registry: Arc<TaskRegistry>, reporter: Reporter) -> Self {
        Self::with_probe(registry, reporter, SysinfoProbe::new())
    }
}

impl<P: ProcessProbe> Sampler<P> {
    /// Creates a sampler over a custom probe.
    pub fn with_probe(registry: Arc<TaskRegistry>, reporter: Reporter, probe: P) -> Self {
        Self {
            registry,
            reporter,
            probe,
        }
    }

    /// Runs one sampling cycle over a snapshot of the registry.
    ///
    /// A task whose process has vanished is unregistered (unless it was
    /// re-registered with another pid meanwhile) and its gauges are zeroed.
    /// State kept for pids no longer tracked is dropped first.
    pub fn sample_once(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let active = self.registry.list_active();
        let live: HashSet<u32> = active.iter().map(|tracked| tracked.pid).collect();
        self.probe.retain(&live);

        for tracked in active {
            match self.read(tracked.pid) {
                Ok(sample) => {
                    self.report(&tracked, &sample);
                    summary.sampled += 1;
                }
                Err(MonitorError::ProcessVanished { pid }) => {
                    debug!("Process {} of task {} is gone, skipping", pid, tracked.task);
                    if self.registry.unregister_pid(&tracked.task, pid) {
                        self.reporter.zero_task(&tracked.task);
                    }
                    summary.vanished += 1;
                }
                Err(e) => {
                    warn!("Sampling task {} failed: {}", tracked.task, e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Reads one process, turning a panicking probe into an error.
    fn read(&mut self, pid: u32) -> Result<ProcessSample> {
        let probe = &mut self.probe;
        panic::catch_unwind(AssertUnwindSafe(|| probe.sample(pid))).unwrap_or_else(|_| {
            Err(MonitorError::Sample {
                pid,
                reason: "probe panicked".to_string(),
            })
        })
    }

    fn report(&self, tracked: &TrackedTask, sample: &ProcessSample) {
        let cpu_name = MetricKey::for_task(MetricType::Cpu, &tracked.task).name();
        let memory_name = MetricKey::for_task(MetricType::Memory, &tracked.task).name();

        self.reporter.emit_gauge(&cpu_name, sample.cpu_percent);
        self.reporter
            .emit_gauge(&memory_name, sample.memory_bytes as f64);

        debug!(
            "Task {} memory usage: {}, CPU usage: {:.2}%",
            tracked.task,
            format_bytes(sample.memory_bytes),
            sample.cpu_percent
        );

        // A task finalized while we were emitting must still end at zero.
        if !self.registry.contains(&tracked.task) {
            self.reporter.zero_task(&tracked.task);
        }
    }
}

impl<P: ProcessProbe + 'static> Sampler<P> {
    /// Starts the sampling loop on a background thread.
    ///
    /// When the plugin is disabled no thread is started and the returned
    /// handle is inert.
    pub fn spawn(self, config: &PluginConfig) -> SamplerHandle {
        if !config.enabled {
            info!("Task metrics disabled, sampler not started");
            return SamplerHandle::inert();
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let interval = config.sleep_interval;
        let mut sampler = self;

        let spawned = thread::Builder::new()
            .name("taskmetrics-sampler".to_string())
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    let summary = sampler.sample_once();
                    if summary.vanished + summary.failed > 0 {
                        debug!("Sampling cycle: {:?}", summary);
                    }
                    sleep_while_running(&flag, interval);
                }
            });

        match spawned {
            Ok(thread) => {
                info!("Sampler started (interval: {:?})", interval);
                SamplerHandle {
                    running,
                    thread: Some(thread),
                }
            }
            Err(e) => {
                error!("Failed to start sampler thread: {}", e);
                SamplerHandle::inert()
            }
        }
    }
}

/// Sleeps for `interval`, waking early once `flag` is cleared.
fn sleep_while_running(flag: &AtomicBool, interval: Duration) {
    let deadline = Instant::now() + interval;
    while flag.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}

/// Owns the sampler thread. Stopping (or dropping) the handle ends the loop.
#[derive(Debug)]
pub struct SamplerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    fn inert() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Returns true while the sampling thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Sampler thread panicked");
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TaskIdentity;
    use crate::metrics::reporter::{RecordingSink, StatsdSink};
    use std::collections::HashMap;
    use std::net::UdpSocket;

    #[derive(Clone, Copy)]
    enum Scripted {
        Reading(ProcessSample),
        Vanished,
        Broken,
        Panics,
    }

    #[derive(Default)]
    struct ScriptedProbe {
        script: HashMap<u32, Scripted>,
    }

    impl ScriptedProbe {
        fn with(mut self, pid: u32, outcome: Scripted) -> Self {
            self.script.insert(pid, outcome);
            self
        }
    }

    impl ProcessProbe for ScriptedProbe {
        fn sample(&mut self, pid: u32) -> Result<ProcessSample> {
            match self.script.get(&pid).copied().unwrap_or(Scripted::Vanished) {
                Scripted::Reading(sample) => Ok(sample),
                Scripted::Vanished => Err(MonitorError::ProcessVanished { pid }),
                Scripted::Broken => Err(MonitorError::Sample {
                    pid,
                    reason: "permission denied".to_string(),
                }),
                Scripted::Panics => panic!("probe exploded"),
            }
        }
    }

    fn reading(cpu_percent: f64, memory_bytes: u64) -> Scripted {
        Scripted::Reading(ProcessSample {
            cpu_percent,
            memory_bytes,
        })
    }

    fn example_task() -> TaskIdentity {
        TaskIdentity::new("prod1", "example_dag", "example_task.test")
    }

    fn setup(probe: ScriptedProbe) -> (Arc<TaskRegistry>, Arc<RecordingSink>, Sampler<ScriptedProbe>) {
        let registry = Arc::new(TaskRegistry::new());
        let sink = Arc::new(RecordingSink::new());
        let sampler = Sampler::with_probe(Arc::clone(&registry), Reporter::new(sink.clone()), probe);
        (registry, sink, sampler)
    }

    #[test]
    fn test_cycle_reports_both_gauges() {
        let (registry, sink, mut sampler) = setup(ScriptedProbe::default().with(1234, reading(12.5, 2048)));
        registry.register(example_task(), 1234);

        let summary = sampler.sample_once();

        assert_eq!(summary.sampled, 1);
        assert_eq!(
            sink.emissions(),
            vec![
                (
                    "custom_metrics_cpu_usage_percent.prod1.example_dag.example_task__test".to_string(),
                    12.5
                ),
                (
                    "custom_metrics_memory_usage_bytes.prod1.example_dag.example_task__test".to_string(),
                    2048.0
                ),
            ]
        );
    }

    #[test]
    fn test_cycle_over_statsd_wire() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let sink = StatsdSink::bind(&receiver.local_addr().unwrap().to_string(), None).unwrap();

        let registry = Arc::new(TaskRegistry::new());
        let probe = ScriptedProbe::default().with(1234, reading(37.25, 1_048_576));
        let mut sampler = Sampler::with_probe(Arc::clone(&registry), Reporter::new(Arc::new(sink)), probe);
        registry.register(example_task(), 1234);

        sampler.sample_once();

        let mut buf = [0u8; 256];
        let mut lines = Vec::new();
        for _ in 0..2 {
            let (len, _) = receiver.recv_from(&mut buf).unwrap();
            lines.push(String::from_utf8_lossy(&buf[..len]).to_string());
        }
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "custom_metrics_cpu_usage_percent.prod1.example_dag.example_task__test:37.25|g",
                "custom_metrics_memory_usage_bytes.prod1.example_dag.example_task__test:1048576|g",
            ]
        );
    }

    /// Finalizes its task from inside the read, as a stop notification
    /// racing the cycle would.
    struct FinalizedDuringRead {
        registry: Arc<TaskRegistry>,
        task: TaskIdentity,
    }

    impl ProcessProbe for FinalizedDuringRead {
        fn sample(&mut self, _pid: u32) -> Result<ProcessSample> {
            self.registry.unregister(&self.task);
            Ok(ProcessSample {
                cpu_percent: 55.0,
                memory_bytes: 4096,
            })
        }
    }

    #[test]
    fn test_task_finalized_mid_cycle_ends_at_zero() {
        let registry = Arc::new(TaskRegistry::new());
        let sink = Arc::new(RecordingSink::new());
        let reader = FinalizedDuringRead {
            registry: Arc::clone(&registry),
            task: example_task(),
        };
        let mut sampler = Sampler::with_probe(Arc::clone(&registry), Reporter::new(sink.clone()), reader);
        registry.register(example_task(), 1234);

        assert_eq!(sampler.sample_once().sampled, 1);

        let cpu_name = "custom_metrics_cpu_usage_percent.prod1.example_dag.example_task__test";
        let memory_name = "custom_metrics_memory_usage_bytes.prod1.example_dag.example_task__test";
        assert_eq!(sink.values_for(cpu_name), vec![55.0, 0.0]);
        assert_eq!(sink.values_for(memory_name), vec![4096.0, 0.0]);
        assert_eq!(sink.last_value(cpu_name), Some(0.0));
        assert_eq!(sink.last_value(memory_name), Some(0.0));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregistered_pids_are_forgotten_next_cycle() {
        let registry = Arc::new(TaskRegistry::new());
        let sink = Arc::new(RecordingSink::new());
        let mut sampler = Sampler::new(Arc::clone(&registry), Reporter::new(sink));
        let task = TaskIdentity::new("prod1", "dag", "self");
        registry.register(task.clone(), std::process::id());

        assert_eq!(sampler.sample_once().sampled, 1);
        assert_eq!(sampler.probe.tracked_len(), 1);

        registry.unregister(&task);
        sampler.sample_once();
        assert_eq!(sampler.probe.tracked_len(), 0);
    }

    #[test]
    fn test_vanished_process_is_skipped_and_unregistered() {
        let probe = ScriptedProbe::default()
            .with(1, reading(5.0, 100))
            .with(2, Scripted::Vanished);
        let (registry, sink, mut sampler) = setup(probe);
        let alive = TaskIdentity::new("prod1", "dag", "alive");
        let gone = TaskIdentity::new("prod1", "dag", "gone");
        registry.register(alive.clone(), 1);
        registry.register(gone.clone(), 2);

        let summary = sampler.sample_once();

        assert_eq!(summary, CycleSummary { sampled: 1, vanished: 1, failed: 0 });
        assert!(registry.contains(&alive));
        assert!(!registry.contains(&gone));
        assert_eq!(sink.last_value("custom_metrics_cpu_usage_percent.prod1.dag.alive"), Some(5.0));
        assert_eq!(sink.values_for("custom_metrics_cpu_usage_percent.prod1.dag.gone"), vec![0.0]);
        assert_eq!(sink.values_for("custom_metrics_memory_usage_bytes.prod1.dag.gone"), vec![0.0]);
    }

    #[test]
    fn test_failures_do_not_stop_the_cycle() {
        let probe = ScriptedProbe::default()
            .with(1, Scripted::Broken)
            .with(2, Scripted::Panics)
            .with(3, reading(1.0, 10));
        let (registry, sink, mut sampler) = setup(probe);
        registry.register(TaskIdentity::new("prod1", "dag", "broken"), 1);
        registry.register(TaskIdentity::new("prod1", "dag", "panics"), 2);
        registry.register(TaskIdentity::new("prod1", "dag", "fine"), 3);

        let summary = sampler.sample_once();

        assert_eq!(summary, CycleSummary { sampled: 1, vanished: 0, failed: 2 });
        assert_eq!(registry.len(), 3);
        assert_eq!(sink.last_value("custom_metrics_memory_usage_bytes.prod1.dag.fine"), Some(10.0));
    }

    #[test]
    fn test_empty_registry_emits_nothing() {
        let (_registry, sink, mut sampler) = setup(ScriptedProbe::default());
        assert_eq!(sampler.sample_once(), CycleSummary::default());
        assert!(sink.emissions().is_empty());
    }

    #[test]
    fn test_spawn_samples_until_stopped() {
        let (registry, sink, sampler) = setup(ScriptedProbe::default().with(7, reading(3.0, 30)));
        registry.register(TaskIdentity::new("prod1", "dag", "task"), 7);

        let config = PluginConfig {
            enabled: true,
            sleep_interval: Duration::from_millis(20),
            ..PluginConfig::default()
        };
        let handle = sampler.spawn(&config);
        assert!(handle.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.values_for("custom_metrics_cpu_usage_percent.prod1.dag.task").len() < 2 {
            assert!(Instant::now() < deadline, "sampler never reported");
            thread::sleep(Duration::from_millis(10));
        }

        handle.stop();
        let after_stop = sink.emissions().len();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.emissions().len(), after_stop);
    }

    #[test]
    fn test_spawn_disabled_is_inert() {
        let (registry, sink, sampler) = setup(ScriptedProbe::default().with(7, reading(3.0, 30)));
        registry.register(TaskIdentity::new("prod1", "dag", "task"), 7);

        let handle = sampler.spawn(&PluginConfig::default());
        assert!(!handle.is_running());

        thread::sleep(Duration::from_millis(50));
        assert!(sink.emissions().is_empty());
    }

    #[test]
    fn test_sleep_returns_early_when_stopped() {
        let flag = AtomicBool::new(false);
        let started = Instant::now();
        sleep_while_running(&flag, Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
