//! Sampler: one consistent set of host readings per call.

use crate::metrics::accelerator::{
    estimate_cpu_power, AcceleratorProbe, AcceleratorReading, EstimatedGpu, EstimatedNpu,
    PowerProfile, CPU_POWER_FALLBACK_WATTS,
};
use crate::metrics::{
    cpu, disk, elapsed_secs, memory, network, system, DiskIoCounters, DiskIoRates, DiskUsage,
    MemoryReading, NetworkCounters, NetworkReading, ProcFs, RateTracker, SampleError,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Everything one full refresh produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readings {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub cpu_power_watts: f64,
    pub memory: MemoryReading,
    pub disk: DiskUsage,
    pub disk_io: DiskIoRates,
    pub network: NetworkReading,
    pub gpu: AcceleratorReading,
    pub npu: AcceleratorReading,
    pub uptime_secs: f64,
}

/// The counter-only subset, cheap enough to take on every scrape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterReadings {
    pub memory: MemoryReading,
    pub disk: DiskUsage,
    pub disk_io: DiskIoRates,
    pub network: NetworkReading,
    pub uptime_secs: f64,
}

pub struct Sampler {
    procfs: ProcFs,
    disk_path: PathBuf,
    cpu_window: Duration,
    power_profile: PowerProfile,
    disk_io: RateTracker<DiskIoCounters>,
    network: RateTracker<NetworkCounters>,
    gpu: Mutex<Box<dyn AcceleratorProbe>>,
    npu: Mutex<Box<dyn AcceleratorProbe>>,
}

impl Sampler {
    pub fn new(procfs: ProcFs, disk_path: PathBuf, cpu_window: Duration, power_profile: PowerProfile) -> Self {
        Self::with_probes(
            procfs,
            disk_path,
            cpu_window,
            power_profile,
            Box::new(EstimatedGpu::new(power_profile)),
            Box::new(EstimatedNpu::new(power_profile)),
        )
    }

    pub fn with_probes(
        procfs: ProcFs,
        disk_path: PathBuf,
        cpu_window: Duration,
        power_profile: PowerProfile,
        gpu: Box<dyn AcceleratorProbe>,
        npu: Box<dyn AcceleratorProbe>,
    ) -> Self {
        Self {
            procfs,
            disk_path,
            cpu_window,
            power_profile,
            disk_io: RateTracker::new(),
            network: RateTracker::new(),
            gpu: Mutex::new(gpu),
            npu: Mutex::new(npu),
        }
    }

    pub fn power_profile(&self) -> PowerProfile {
        self.power_profile
    }

    /// CPU utilization over the measurement window. Blocks for the window.
    pub fn sample_cpu(&self) -> Result<f64, SampleError> {
        cpu::sample_utilization(&self.procfs, self.cpu_window)
    }

    pub fn sample_memory(&self) -> Result<MemoryReading, SampleError> {
        memory::sample(&self.procfs)
    }

    pub fn sample_disk(&self, path: &Path) -> Result<DiskUsage, SampleError> {
        disk::usage(path)
    }

    /// Disk throughput since the previous call; zeros on the first call
    pub fn sample_disk_io(&self) -> Result<DiskIoRates, SampleError> {
        let (current, previous) = self.disk_io.advance(|| disk::read_io_counters(&self.procfs))?;
        Ok(previous
            .map(|prev| DiskIoRates::between(&prev.counters, &current.counters, elapsed_secs(&prev, &current)))
            .unwrap_or_default())
    }

    /// Network totals and throughput since the previous call
    pub fn sample_network(&self) -> Result<NetworkReading, SampleError> {
        let (current, previous) = self.network.advance(|| network::read_counters(&self.procfs))?;
        let elapsed = previous.as_ref().map(|prev| elapsed_secs(prev, &current)).unwrap_or(0.0);
        Ok(NetworkReading {
            seq: current.seq,
            ..NetworkReading::from_counters(&current.counters, previous.as_ref().map(|prev| &prev.counters), elapsed)
        })
    }

    pub fn sample_uptime(&self) -> Result<f64, SampleError> {
        system::uptime(&self.procfs)
    }

    pub fn sample_gpu(&self, cpu_percent: f64) -> AcceleratorReading {
        sample_probe(&mut **self.gpu.lock(), cpu_percent)
    }

    pub fn sample_npu(&self, cpu_percent: f64) -> AcceleratorReading {
        sample_probe(&mut **self.npu.lock(), cpu_percent)
    }

    /// Estimated CPU package power; falls back to a constant on bad input
    pub fn sample_cpu_power(&self, cpu_percent: f64) -> f64 {
        match estimate_cpu_power(self.power_profile, cpu_percent) {
            Ok(watts) => watts.max(0.0),
            Err(e) => {
                warn!("Error estimating CPU power: {}", e);
                CPU_POWER_FALLBACK_WATTS
            }
        }
    }

    /// Counter readings only: no measurement window and no estimates
    pub fn sample_counters(&self) -> Result<CounterReadings, SampleError> {
        Ok(CounterReadings {
            memory: self.sample_memory()?,
            disk: self.sample_disk(&self.disk_path)?,
            disk_io: self.sample_disk_io()?,
            network: self.sample_network()?,
            uptime_secs: self.sample_uptime()?,
        })
    }

    /// Full bundle. Blocks for the CPU measurement window; the CPU figure is
    /// reused by the accelerator and power estimators.
    pub fn sample_all(&self) -> Result<Readings, SampleError> {
        let cpu_percent = self.sample_cpu()?;
        let counters = self.sample_counters()?;

        Ok(Readings {
            timestamp: Utc::now(),
            cpu_percent,
            cpu_power_watts: self.sample_cpu_power(cpu_percent),
            memory: counters.memory,
            disk: counters.disk,
            disk_io: counters.disk_io,
            network: counters.network,
            gpu: self.sample_gpu(cpu_percent),
            npu: self.sample_npu(cpu_percent),
            uptime_secs: counters.uptime_secs,
        })
    }
}

fn sample_probe(probe: &mut dyn AcceleratorProbe, cpu_percent: f64) -> AcceleratorReading {
    match probe.sample(cpu_percent) {
        Ok(reading) => reading.clamped(),
        Err(e) => {
            warn!("Error getting {} metrics: {}", probe.name().to_uppercase(), e);
            probe.fallback().clamped()
        }
    }
}
