//! Prometheus registry holding the latest readings.

use crate::metrics::{NetworkReading, ReadingSource, SystemInfo};
use crate::sampler::{CounterReadings, Readings};
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Prefix applied to every exported name
pub const NAMESPACE: &str = "webai";

/// Content-Type of the text exposition format
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

pub struct MetricsRegistry {
    registry: Registry,
    // Capture order of the last network totals applied. Held across the
    // read-then-increment on the network counters.
    network_seq: Mutex<u64>,

    cpu_usage: Gauge,
    cpu_power: Gauge,

    memory_total: Gauge,
    memory_available: Gauge,
    memory_used: Gauge,
    memory_free: Gauge,
    memory_percent: Gauge,

    disk_total: Gauge,
    disk_used: Gauge,
    disk_free: Gauge,
    disk_percent: Gauge,

    disk_read_bytes: Gauge,
    disk_write_bytes: Gauge,
    disk_read_iops: Gauge,
    disk_write_iops: Gauge,

    network_bytes_sent: IntCounter,
    network_bytes_recv: IntCounter,
    network_packets_sent: IntCounter,
    network_packets_recv: IntCounter,
    net_sent_per_sec: Gauge,
    net_recv_per_sec: Gauge,

    uptime: Gauge,

    gpu_usage: Gauge,
    gpu_power: Gauge,
    npu_usage: Gauge,
    npu_power: Gauge,

    refresh_errors: IntCounter,
}

impl MetricsRegistry {
    pub fn new(system: &SystemInfo) -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), None)?;

        let info = IntGaugeVec::new(
            Opts::new("system_info", "Host identity, value is always 1"),
            &["platform", "release", "architecture", "hostname"],
        )?;
        info.with_label_values(&[
            system.platform.as_str(),
            system.platform_release.as_str(),
            system.architecture.as_str(),
            system.hostname.as_str(),
        ])
        .set(1);
        registry.register(Box::new(info))?;

        let estimated = ReadingSource::Estimated.as_str();

        Ok(Self {
            cpu_usage: gauge(&registry, "cpu_usage_percent", "CPU usage in percent", None)?,
            cpu_power: gauge(
                &registry,
                "cpu_power_watts",
                "CPU power usage in watts (estimated from load)",
                Some(estimated),
            )?,

            memory_total: gauge(&registry, "memory_total_bytes", "Total memory in bytes", None)?,
            memory_available: gauge(&registry, "memory_available_bytes", "Available memory in bytes", None)?,
            memory_used: gauge(&registry, "memory_used_bytes", "Used memory in bytes", None)?,
            memory_free: gauge(&registry, "memory_free_bytes", "Free memory in bytes", None)?,
            memory_percent: gauge(&registry, "memory_usage_percent", "Memory usage in percent", None)?,

            disk_total: gauge(&registry, "disk_total_bytes", "Total disk space in bytes", None)?,
            disk_used: gauge(&registry, "disk_used_bytes", "Used disk space in bytes", None)?,
            disk_free: gauge(&registry, "disk_free_bytes", "Free disk space in bytes", None)?,
            disk_percent: gauge(&registry, "disk_usage_percent", "Disk usage in percent", None)?,

            disk_read_bytes: gauge(&registry, "disk_read_bytes_per_sec", "Disk read bytes per second", None)?,
            disk_write_bytes: gauge(&registry, "disk_write_bytes_per_sec", "Disk write bytes per second", None)?,
            disk_read_iops: gauge(&registry, "disk_read_iops", "Disk read operations per second", None)?,
            disk_write_iops: gauge(&registry, "disk_write_iops", "Disk write operations per second", None)?,

            network_bytes_sent: counter(&registry, "network_bytes_sent", "Network bytes sent")?,
            network_bytes_recv: counter(&registry, "network_bytes_recv", "Network bytes received")?,
            network_packets_sent: counter(&registry, "network_packets_sent", "Network packets sent")?,
            network_packets_recv: counter(&registry, "network_packets_recv", "Network packets received")?,
            net_sent_per_sec: gauge(&registry, "net_sent_bytes_per_sec", "Network bytes sent per second", None)?,
            net_recv_per_sec: gauge(&registry, "net_recv_bytes_per_sec", "Network bytes received per second", None)?,

            uptime: gauge(&registry, "system_uptime_seconds", "System uptime in seconds", None)?,

            gpu_usage: gauge(&registry, "gpu_usage_percent", "GPU usage in percent (simulated)", Some(estimated))?,
            gpu_power: gauge(&registry, "gpu_power_watts", "GPU power usage in watts (simulated)", Some(estimated))?,
            npu_usage: gauge(&registry, "npu_usage_percent", "NPU usage in percent (simulated)", Some(estimated))?,
            npu_power: gauge(&registry, "npu_power_watts", "NPU power usage in watts (simulated)", Some(estimated))?,

            refresh_errors: counter(&registry, "refresh_errors_total", "Sampling cycles that failed to read OS counters")?,

            registry,
            network_seq: Mutex::new(0),
        })
    }

    /// Write a full refresh into the registry
    pub fn apply(&self, readings: &Readings) {
        self.cpu_usage.set(readings.cpu_percent);
        self.cpu_power.set(readings.cpu_power_watts);

        self.gpu_usage.set(readings.gpu.usage_percent);
        self.gpu_power.set(readings.gpu.power_watts);
        self.npu_usage.set(readings.npu.usage_percent);
        self.npu_power.set(readings.npu.power_watts);

        self.apply_counters(&CounterReadings {
            memory: readings.memory,
            disk: readings.disk,
            disk_io: readings.disk_io,
            network: readings.network,
            uptime_secs: readings.uptime_secs,
        });
    }

    /// Write the counter-only subset
    pub fn apply_counters(&self, readings: &CounterReadings) {
        let memory = &readings.memory;
        self.memory_total.set(memory.total as f64);
        self.memory_available.set(memory.available as f64);
        self.memory_used.set(memory.used as f64);
        self.memory_free.set(memory.free as f64);
        self.memory_percent.set(memory.percent);

        let disk = &readings.disk;
        self.disk_total.set(disk.total as f64);
        self.disk_used.set(disk.used as f64);
        self.disk_free.set(disk.free as f64);
        self.disk_percent.set(disk.percent);

        let io = &readings.disk_io;
        self.disk_read_bytes.set(io.read_bytes_per_sec);
        self.disk_write_bytes.set(io.write_bytes_per_sec);
        self.disk_read_iops.set(io.read_ops_per_sec);
        self.disk_write_iops.set(io.write_ops_per_sec);

        self.apply_network(&readings.network);

        self.uptime.set(readings.uptime_secs);
    }

    /// Network totals and throughput. Totals captured before the ones already
    /// exported are dropped, so a lower total only counts as an OS counter
    /// reset when it is the newer capture.
    fn apply_network(&self, network: &NetworkReading) {
        let mut applied_seq = self.network_seq.lock();
        if network.seq < *applied_seq {
            debug!(seq = network.seq, applied = *applied_seq, "Skipping stale network totals");
            return;
        }
        *applied_seq = network.seq;

        set_total(&self.network_bytes_sent, network.bytes_sent);
        set_total(&self.network_bytes_recv, network.bytes_recv);
        set_total(&self.network_packets_sent, network.packets_sent);
        set_total(&self.network_packets_recv, network.packets_recv);
        self.net_sent_per_sec.set(network.bytes_sent_per_sec);
        self.net_recv_per_sec.set(network.bytes_recv_per_sec);
    }

    pub fn record_refresh_error(&self) {
        self.refresh_errors.inc();
    }

    /// Render every registered metric in the text exposition format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge(registry: &Registry, name: &str, help: &str, source: Option<&str>) -> prometheus::Result<Gauge> {
    let mut opts = Opts::new(name, help);
    if let Some(source) = source {
        opts = opts.const_label("source", source);
    }
    let gauge = Gauge::with_opts(opts)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Move a counter to an absolute OS total. A total below the exported value
/// means the OS counter restarted, so the exported counter restarts too.
fn set_total(counter: &IntCounter, total: u64) {
    let exported = counter.get();
    if total >= exported {
        counter.inc_by(total - exported);
    } else {
        counter.reset();
        counter.inc_by(total);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metrics::{AcceleratorReading, DiskIoRates, DiskUsage, MemoryReading};
    use chrono::Utc;

    const DECLARED: &[(&str, &str)] = &[
        ("webai_cpu_usage_percent", "gauge"),
        ("webai_cpu_power_watts", "gauge"),
        ("webai_memory_total_bytes", "gauge"),
        ("webai_memory_available_bytes", "gauge"),
        ("webai_memory_used_bytes", "gauge"),
        ("webai_memory_free_bytes", "gauge"),
        ("webai_memory_usage_percent", "gauge"),
        ("webai_disk_total_bytes", "gauge"),
        ("webai_disk_used_bytes", "gauge"),
        ("webai_disk_free_bytes", "gauge"),
        ("webai_disk_usage_percent", "gauge"),
        ("webai_disk_read_bytes_per_sec", "gauge"),
        ("webai_disk_write_bytes_per_sec", "gauge"),
        ("webai_disk_read_iops", "gauge"),
        ("webai_disk_write_iops", "gauge"),
        ("webai_network_bytes_sent", "counter"),
        ("webai_network_bytes_recv", "counter"),
        ("webai_network_packets_sent", "counter"),
        ("webai_network_packets_recv", "counter"),
        ("webai_net_sent_bytes_per_sec", "gauge"),
        ("webai_net_recv_bytes_per_sec", "gauge"),
        ("webai_system_uptime_seconds", "gauge"),
        ("webai_gpu_usage_percent", "gauge"),
        ("webai_gpu_power_watts", "gauge"),
        ("webai_npu_usage_percent", "gauge"),
        ("webai_npu_power_watts", "gauge"),
        ("webai_system_info", "gauge"),
        ("webai_refresh_errors_total", "counter"),
    ];

    pub(crate) fn test_system() -> SystemInfo {
        SystemInfo {
            platform: "Linux".into(),
            platform_release: "6.1.0".into(),
            platform_version: "#1 SMP".into(),
            architecture: "x86_64".into(),
            hostname: "box-1".into(),
        }
    }

    fn readings(bytes_sent: u64) -> Readings {
        readings_at(bytes_sent, 0)
    }

    fn readings_at(bytes_sent: u64, seq: u64) -> Readings {
        let estimated = AcceleratorReading {
            usage_percent: 12.5,
            power_watts: 2.25,
            source: ReadingSource::Estimated,
        };
        Readings {
            timestamp: Utc::now(),
            cpu_percent: 42.0,
            cpu_power_watts: 21.22,
            memory: MemoryReading { total: 1024, available: 512, used: 256, free: 128, percent: 50.0 },
            disk: DiskUsage { total: 4096, used: 1024, free: 3072, percent: 25.0 },
            disk_io: DiskIoRates { read_bytes_per_sec: 1000.0, ..Default::default() },
            network: NetworkReading {
                bytes_sent,
                bytes_recv: 77,
                packets_sent: 3,
                packets_recv: 4,
                bytes_sent_per_sec: 10.0,
                bytes_recv_per_sec: 0.0,
                seq,
            },
            gpu: estimated,
            npu: estimated,
            uptime_secs: 99.0,
        }
    }

    fn value_line<'a>(text: &'a str, name: &str) -> Option<&'a str> {
        text.lines()
            .find(|line| !line.starts_with('#') && (line.starts_with(&format!("{name} ")) || line.starts_with(&format!("{name}{{"))))
    }

    #[test]
    fn every_declared_metric_is_rendered_before_any_refresh() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        let text = registry.encode().unwrap();

        for (name, kind) in DECLARED {
            assert!(text.contains(&format!("# HELP {name} ")), "missing HELP for {name}");
            assert!(text.contains(&format!("# TYPE {name} {kind}")), "missing TYPE for {name}");
            assert!(value_line(&text, name).is_some(), "missing value for {name}");
        }
        assert_eq!(value_line(&text, "webai_cpu_usage_percent"), Some("webai_cpu_usage_percent 0"));
    }

    #[test]
    fn estimates_carry_source_label() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        let text = registry.encode().unwrap();

        assert!(text.contains("webai_gpu_usage_percent{source=\"estimated\"} 0"));
        assert!(text.contains("webai_cpu_power_watts{source=\"estimated\"} 0"));
        assert!(value_line(&text, "webai_memory_total_bytes").unwrap().ends_with(" 0"));
    }

    #[test]
    fn system_info_labels() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        let text = registry.encode().unwrap();
        let line = value_line(&text, "webai_system_info").unwrap();
        assert!(line.contains("hostname=\"box-1\""));
        assert!(line.contains("platform=\"Linux\""));
        assert!(line.ends_with(" 1"));
    }

    #[test]
    fn apply_sets_values() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        registry.apply(&readings(500));
        let text = registry.encode().unwrap();

        assert_eq!(value_line(&text, "webai_cpu_usage_percent"), Some("webai_cpu_usage_percent 42"));
        assert_eq!(value_line(&text, "webai_memory_total_bytes"), Some("webai_memory_total_bytes 1024"));
        assert_eq!(value_line(&text, "webai_disk_read_bytes_per_sec"), Some("webai_disk_read_bytes_per_sec 1000"));
        assert_eq!(value_line(&text, "webai_network_bytes_sent"), Some("webai_network_bytes_sent 500"));
        assert_eq!(value_line(&text, "webai_system_uptime_seconds"), Some("webai_system_uptime_seconds 99"));
    }

    #[test]
    fn counters_follow_os_totals() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        registry.apply(&readings(500));
        registry.apply(&readings(800));
        assert_eq!(registry.network_bytes_sent.get(), 800);

        // OS counter restarted
        registry.apply(&readings(30));
        assert_eq!(registry.network_bytes_sent.get(), 30);
    }

    #[test]
    fn older_capture_never_moves_counters_back() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        registry.apply(&readings_at(900, 2));
        registry.apply(&readings_at(500, 1));
        assert_eq!(registry.network_bytes_sent.get(), 900);

        // Other values are still last-writer-wins
        let text = registry.encode().unwrap();
        assert_eq!(value_line(&text, "webai_cpu_usage_percent"), Some("webai_cpu_usage_percent 42"));

        // A newer capture with a lower total is a genuine reset
        registry.apply(&readings_at(40, 3));
        assert_eq!(registry.network_bytes_sent.get(), 40);
    }

    #[test]
    fn refresh_errors_are_counted() {
        let registry = MetricsRegistry::new(&test_system()).unwrap();
        registry.record_refresh_error();
        registry.record_refresh_error();
        let text = registry.encode().unwrap();
        assert_eq!(value_line(&text, "webai_refresh_errors_total"), Some("webai_refresh_errors_total 2"));
    }
}
