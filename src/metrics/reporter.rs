//! Gauge Reporting
//!
//! Sends gauge values to a [`MetricSink`] and logs each emission.
//! The production sink speaks StatsD over UDP through `cadence`;
//! [`RecordingSink`] keeps emissions in memory for tests and embedding hosts.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};

use cadence::{Gauged, NopMetricSink, StatsdClient, UdpMetricSink};
use log::{info, warn};

use crate::error::Result;
use crate::lifecycle::TaskIdentity;

use super::naming::{MetricKey, MetricType};

/// Destination for gauge samples.
///
/// Implementations are best-effort: they must not block for long and
/// must swallow their own transport errors.
pub trait MetricSink: Send + Sync {
    /// Emits one gauge sample.
    fn emit(&self, name: &str, value: f64);
}

/// Fire-and-forget StatsD sink over UDP, built on a `cadence` client.
pub struct StatsdSink {
    client: StatsdClient,
    target: Option<SocketAddr>,
}

impl StatsdSink {
    /// Binds an ephemeral local socket that sends to `target` (`host:port`).
    ///
    /// The target is resolved once here, preferring IPv4. Every metric name
    /// is written as `prefix.name` when a prefix is given.
    pub fn bind(target: &str, prefix: Option<&str>) -> Result<Self> {
        let target = resolve(target)?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        let sink = UdpMetricSink::from(target, socket)?;

        Ok(Self {
            client: StatsdClient::from_sink(prefix.unwrap_or(""), sink),
            target: Some(target),
        })
    }

    /// Creates a sink with no destination; every gauge is discarded.
    pub fn unconnected(prefix: Option<&str>) -> Self {
        Self {
            client: StatsdClient::from_sink(prefix.unwrap_or(""), NopMetricSink),
            target: None,
        }
    }

    /// Returns the resolved StatsD address, if any.
    pub fn target(&self) -> Option<SocketAddr> {
        self.target
    }
}

fn resolve(target: &str) -> io::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = target.to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for StatsD target {}", target),
            )
        })
}

impl MetricSink for StatsdSink {
    fn emit(&self, name: &str, value: f64) {
        if let Err(e) = self.client.gauge(name, value) {
            warn!("Failed to send gauge {} to StatsD: {}", name, e);
        }
    }
}

impl std::fmt::Debug for StatsdSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdSink")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// In-memory sink that records every emission in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    emissions: Mutex<Vec<(String, f64)>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded `(name, value)` pairs.
    pub fn emissions(&self) -> Vec<(String, f64)> {
        self.emissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the values recorded for one metric name.
    pub fn values_for(&self, name: &str) -> Vec<f64> {
        self.emissions()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v)
            .collect()
    }

    /// Returns the last value recorded for a metric name.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.values_for(name).last().copied()
    }
}

impl MetricSink for RecordingSink {
    fn emit(&self, name: &str, value: f64) {
        self.emissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), value));
    }
}

/// Emits gauges to a sink and logs each one.
///
/// Cheap to clone; clones share the sink.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn MetricSink>,
}

impl Reporter {
    /// Creates a reporter over a shared sink.
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }

    /// Sends a gauge sample and logs it. Never fails.
    pub fn emit_gauge(&self, name: &str, value: f64) {
        self.sink.emit(name, value);
        info!("Gauge {} = {}", name, value);
    }

    /// Resets a gauge to zero. Safe to repeat.
    pub fn zero(&self, name: &str) {
        self.emit_gauge(name, 0.0);
    }

    /// Zeroes every gauge of a task.
    pub fn zero_task(&self, task: &TaskIdentity) {
        for metric_type in MetricType::ALL {
            self.zero(&MetricKey::for_task(metric_type, task).name());
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// Formats a byte count with binary units, e.g. `1.50 KB`.
///
/// Zero is rendered as `0B`; the largest unit is PB.
pub fn format_bytes(size_bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if size_bytes == 0 {
        return "0B".to_string();
    }

    let mut value = size_bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}
