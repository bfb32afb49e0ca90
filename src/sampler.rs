//! Point-in-time CPU and memory usage of a process.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::constants::BYTES_PER_MEGABYTE;
use crate::error::SamplingError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

impl ResourceUsage {
    pub fn from_bytes(cpu_percent: f64, memory_bytes: u64) -> Self {
        Self {
            cpu_percent,
            memory_mb: memory_bytes as f64 / BYTES_PER_MEGABYTE,
        }
    }
}

#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self, pid: u32) -> Result<ResourceUsage, SamplingError>;
}

/// Sampler backed by `sysinfo`. One `System` is kept across calls so CPU
/// usage is measured between consecutive samples; the first sample of a
/// process reports 0%.
#[derive(Clone)]
pub struct SysinfoSampler {
    system: Arc<Mutex<System>>,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceSampler for SysinfoSampler {
    async fn sample(&self, pid: u32) -> Result<ResourceUsage, SamplingError> {
        let system = Arc::clone(&self.system);

        tokio::task::spawn_blocking(move || -> Result<ResourceUsage, SamplingError> {
            let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
            let sys_pid = Pid::from_u32(pid);
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[sys_pid]),
                true,
                ProcessRefreshKind::nothing().with_cpu().with_memory(),
            );

            let process = system.process(sys_pid).ok_or(SamplingError::ProcessNotFound(pid))?;
            Ok(ResourceUsage::from_bytes(
                f64::from(process.cpu_usage()),
                process.memory(),
            ))
        })
        .await
        .map_err(|e| SamplingError::Unavailable(e.to_string()))?
    }
}
