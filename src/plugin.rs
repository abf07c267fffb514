//! Plugin Wiring
//!
//! Builds the registry, reporter, listener and sampler from one
//! [`PluginConfig`] and owns their lifetime.

use std::sync::Arc;

use log::{info, warn};

use crate::config::PluginConfig;
use crate::lifecycle::TaskMonitorListener;
use crate::metrics::reporter::{MetricSink, Reporter, StatsdSink};
use crate::monitoring::{ProcessProbe, Sampler, SamplerHandle, SysinfoProbe, TaskRegistry};

/// A running task-metrics plugin.
///
/// # Example
///
/// ```rust,no_run
/// use taskmetrics::lifecycle::{TaskIdentity, TaskState, TaskStateListener};
/// use taskmetrics::MetricsPlugin;
///
/// fn main() {
///     let plugin = MetricsPlugin::from_env();
///     let listener = plugin.listener();
///
///     let task = TaskIdentity::new("prod1", "example_dag", "example_task");
///     listener.on_task_state_changed(&task, TaskState::Running { pid: 1234 });
///     // ...
///     listener.on_task_state_changed(&task, TaskState::Success);
///
///     plugin.shutdown();
/// }
/// ```
pub struct MetricsPlugin {
    config: PluginConfig,
    registry: Arc<TaskRegistry>,
    listener: Arc<TaskMonitorListener>,
    sampler: Option<SamplerHandle>,
}

impl MetricsPlugin {
    /// Starts the plugin configured from the environment.
    pub fn from_env() -> Self {
        Self::start(PluginConfig::from_env())
    }

    /// Starts the plugin, reporting to the configured StatsD address.
    ///
    /// If the address cannot be resolved or bound, gauges are still
    /// sampled and logged but no datagrams are sent.
    pub fn start(config: PluginConfig) -> Self {
        let target = config.statsd_addr();
        let prefix = config.statsd_prefix.as_deref();

        let sink = StatsdSink::bind(&target, prefix).unwrap_or_else(|e| {
            warn!("StatsD target {} unavailable, gauges will only be logged: {}", target, e);
            StatsdSink::unconnected(prefix)
        });
        Self::with_sink(config, Arc::new(sink))
    }

    /// Starts the plugin over a custom sink, sampling real processes.
    pub fn with_sink(config: PluginConfig, sink: Arc<dyn MetricSink>) -> Self {
        Self::with_sink_and_probe(config, sink, SysinfoProbe::new())
    }

    /// Starts the plugin over a custom sink and probe.
    pub fn with_sink_and_probe<P>(config: PluginConfig, sink: Arc<dyn MetricSink>, probe: P) -> Self
    where
        P: ProcessProbe + 'static,
    {
        let registry = Arc::new(TaskRegistry::new());
        let reporter = Reporter::new(sink);

        let listener = Arc::new(TaskMonitorListener::new(
            config.enabled,
            Arc::clone(&registry),
            reporter.clone(),
        ));

        let sampler = Sampler::with_probe(Arc::clone(&registry), reporter, probe).spawn(&config);

        if config.enabled {
            info!(
                "Task metrics enabled, reporting to {} every {:?}",
                config.statsd_addr(),
                config.sleep_interval
            );
        }

        Self {
            config,
            registry,
            listener,
            sampler: Some(sampler),
        }
    }

    /// Returns the listener to hand to the orchestrator integration.
    pub fn listener(&self) -> Arc<TaskMonitorListener> {
        Arc::clone(&self.listener)
    }

    /// Returns the shared task registry.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Returns the configuration the plugin was started with.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Returns true while the sampler thread is alive.
    pub fn is_sampling(&self) -> bool {
        self.sampler.as_ref().is_some_and(SamplerHandle::is_running)
    }

    /// Stops sampling, then zeroes and unregisters every task still tracked.
    ///
    /// Returns the number of tasks swept.
    pub fn shutdown(mut self) -> usize {
        if let Some(sampler) = self.sampler.take() {
            sampler.stop();
        }
        self.listener.before_stopping()
    }
}
