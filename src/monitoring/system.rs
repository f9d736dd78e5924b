//! System Monitoring
//!
//! Process and system CPU/memory sampling built on `sysinfo`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// CPU and memory of the server process. Fields are `None` when the
/// platform cannot report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
}

/// Whole-machine snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    /// Average across cores (0–100)
    pub cpu_percent: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
}

/// Keeps one `System` alive so CPU usage is measured between consecutive samples
pub struct ResourceMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Sample this process. The first CPU reading after startup is 0.
    pub fn sample_process(&self) -> ProcessUsage {
        let Some(pid) = self.pid else {
            return ProcessUsage::default();
        };

        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match sys.process(pid) {
            Some(process) => ProcessUsage {
                cpu_percent: Some(process.cpu_usage() as f64).filter(|v| v.is_finite()),
                memory_mb: Some(process.memory() as f64 / BYTES_PER_MB),
            },
            None => ProcessUsage::default(),
        }
    }

    /// Sample global CPU and memory
    pub fn sample_system(&self) -> SystemSnapshot {
        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        SystemSnapshot {
            cpu_percent: sys.global_cpu_usage() as f64,
            memory_used_mb: sys.used_memory() as f64 / BYTES_PER_MB,
            memory_total_mb: sys.total_memory() as f64 / BYTES_PER_MB,
        }
    }
}
