//! Shared exporter context: sampler, registry and refresh bookkeeping.
//!
//! One `Exporter` is shared (behind an `Arc`) by the background loop and the
//! HTTP handlers. It owns all mutable state; there are no globals.

use crate::metrics::{PowerProfile, ProcFs, SampleError, SystemInfo};
use crate::registry::MetricsRegistry;
use crate::sampler::{CounterReadings, Readings, Sampler};
use crate::units::{format_bytes, mb_per_sec};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, Level};

/// A detailed log line is written every this many refresh cycles
pub const DETAILED_LOG_EVERY: u64 = 5;

#[derive(Debug, Clone)]
pub struct ExporterSettings {
    pub proc_root: PathBuf,
    pub disk_path: PathBuf,
    pub cpu_window: Duration,
    pub power_profile: PowerProfile,
    /// Re-read counters on every scrape instead of serving loop values only
    pub scrape_refresh: bool,
}

pub struct Exporter {
    system: SystemInfo,
    sampler: Sampler,
    registry: MetricsRegistry,
    scrape_refresh: bool,
    cycles: AtomicU64,
}

impl Exporter {
    pub fn new(settings: ExporterSettings, system: SystemInfo) -> prometheus::Result<Self> {
        let sampler = Sampler::new(
            ProcFs::new(&settings.proc_root),
            settings.disk_path,
            settings.cpu_window,
            settings.power_profile,
        );
        Self::with_sampler(sampler, system, settings.scrape_refresh)
    }

    pub fn with_sampler(sampler: Sampler, system: SystemInfo, scrape_refresh: bool) -> prometheus::Result<Self> {
        let registry = MetricsRegistry::new(&system)?;
        info!("System Monitor initialized on {}", system.hostname);
        info!(
            "Platform: {} {} ({}), power profile: {:?}",
            system.platform,
            system.platform_release,
            system.architecture,
            sampler.power_profile()
        );

        Ok(Self {
            system,
            sampler,
            registry,
            scrape_refresh,
            cycles: AtomicU64::new(0),
        })
    }

    pub fn system(&self) -> &SystemInfo {
        &self.system
    }

    pub fn scrape_refresh(&self) -> bool {
        self.scrape_refresh
    }

    /// Number of refresh cycles attempted so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Sample everything once and publish it. Blocks for the CPU window.
    ///
    /// On error the registry keeps its previous values.
    pub fn refresh(&self) -> Result<Readings, SampleError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let readings = match self.sampler.sample_all() {
            Ok(readings) => readings,
            Err(e) => {
                self.registry.record_refresh_error();
                return Err(e);
            }
        };
        self.registry.apply(&readings);

        info!(
            "CPU: {:.1}% | Memory: {:.1}% | GPU: {:.1}% | NPU: {:.1}%",
            readings.cpu_percent, readings.memory.percent, readings.gpu.usage_percent, readings.npu.usage_percent
        );

        if cycle % DETAILED_LOG_EVERY == 0 {
            info!(
                "[DETAILED] CPU Power: {:.2}W | GPU Power: {:.2}W | NPU Power: {:.2}W | \
                 Memory: {} / {} | Disk: {:.1}% | Network: Sent {:.2}MB/s, Received {:.2}MB/s",
                readings.cpu_power_watts,
                readings.gpu.power_watts,
                readings.npu.power_watts,
                format_bytes(readings.memory.used),
                format_bytes(readings.memory.total),
                readings.disk.percent,
                mb_per_sec(readings.network.bytes_sent_per_sec),
                mb_per_sec(readings.network.bytes_recv_per_sec),
            );
        }

        if tracing::enabled!(Level::DEBUG) {
            if let Ok(json) = serde_json::to_string(&readings) {
                debug!(cycle, readings = %json, "Refresh complete");
            }
        }

        Ok(readings)
    }

    /// Re-read the counter metrics without blocking on the CPU window
    pub fn refresh_counters(&self) -> Result<CounterReadings, SampleError> {
        let readings = self.sampler.sample_counters()?;
        self.registry.apply_counters(&readings);
        debug!(
            "Scrape refresh: memory {:.1}%, disk {:.1}%",
            readings.memory.percent, readings.disk.percent
        );
        Ok(readings)
    }

    /// Current registry contents in the text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        self.registry.encode()
    }
}
