//! Process Sampling
//!
//! Reads CPU and memory usage of arbitrary processes by pid.
//!
//! CPU is reported per-core summed: 100% is one fully busy core, so a
//! process saturating four cores reads 400%. The same convention is used
//! for every task.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};

use crate::error::{MonitorError, Result};

/// Number of logical CPUs, used as the upper bound for CPU readings.
static LOGICAL_CPUS: Lazy<usize> = Lazy::new(num_cpus::get);

/// A single resource usage reading from one process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSample {
    /// CPU usage in percent (0 to 100 × logical CPUs)
    pub cpu_percent: f64,
    /// Resident memory in bytes
    pub memory_bytes: u64,
}

/// Source of per-process resource readings.
pub trait ProcessProbe: Send {
    /// Reads the current usage of `pid`.
    ///
    /// Returns [`MonitorError::ProcessVanished`] if the process is gone.
    fn sample(&mut self, pid: u32) -> Result<ProcessSample>;

    /// Drops whatever is kept for pids outside `live`.
    fn retain(&mut self, _live: &HashSet<u32>) {}
}

/// Probe backed by `sysinfo`.
///
/// Each pid gets its own `System` with the CPU list already refreshed.
/// CPU usage is the delta since the previous read of the same pid, so the
/// first reading of a newly seen process is 0 and the second is real.
/// A pid is forgotten once it vanishes or is left out of [`retain`].
///
/// [`retain`]: ProcessProbe::retain
pub struct SysinfoProbe {
    processes: HashMap<u32, System>,
}

impl SysinfoProbe {
    /// Creates a probe tracking no processes.
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
        }
    }

    /// Returns the number of pids with kept state.
    pub fn tracked_len(&self) -> usize {
        self.processes.len()
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn sample(&mut self, pid: u32) -> Result<ProcessSample> {
        let system = self.processes.entry(pid).or_insert_with(|| {
            let mut system = System::new();
            system.refresh_cpu();
            system
        });

        let result = read_process(system, pid);
        if let Err(MonitorError::ProcessVanished { .. }) = result {
            self.processes.remove(&pid);
        }
        result
    }

    fn retain(&mut self, live: &HashSet<u32>) {
        self.processes.retain(|pid, _| live.contains(pid));
    }
}

fn read_process(system: &mut System, pid: u32) -> Result<ProcessSample> {
    let sys_pid = Pid::from_u32(pid);
    let refresh_kind = ProcessRefreshKind::new().with_cpu().with_memory();

    if !system.refresh_process_specifics(sys_pid, refresh_kind) {
        return Err(MonitorError::ProcessVanished { pid });
    }

    let process = system
        .process(sys_pid)
        .ok_or(MonitorError::ProcessVanished { pid })?;

    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return Err(MonitorError::ProcessVanished { pid });
    }

    Ok(ProcessSample {
        cpu_percent: normalize_cpu(process.cpu_usage() as f64, *LOGICAL_CPUS),
        memory_bytes: process.memory(),
    })
}

/// Clamps a raw CPU reading to `[0, 100 × cpus]` and rounds to two decimals.
pub fn normalize_cpu(raw: f64, cpus: usize) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let ceiling = 100.0 * cpus.max(1) as f64;
    (raw.clamp(0.0, ceiling) * 100.0).round() / 100.0
}
