//! Memory metrics collection from /proc/meminfo.

use super::{percent, ProcFs, SampleError};
use serde::{Deserialize, Serialize};

/// Virtual memory statistics captured from a single read of /proc/meminfo
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryReading {
    /// Total system RAM in bytes
    pub total: u64,
    /// Memory available to new workloads without swapping, in bytes
    pub available: u64,
    /// Used memory in bytes (excluding buffers/cache)
    pub used: u64,
    /// Completely unused memory in bytes
    pub free: u64,
    /// Share of memory not available, in percent
    pub percent: f64,
}

/// Collect current memory statistics
pub fn sample(procfs: &ProcFs) -> Result<MemoryReading, SampleError> {
    let meminfo = procfs.read("meminfo")?;
    parse_meminfo(&meminfo).ok_or_else(|| procfs.parse_error("meminfo", "MemTotal missing"))
}

fn parse_meminfo(meminfo: &str) -> Option<MemoryReading> {
    let mut total: Option<u64> = None;
    let mut free: u64 = 0;
    let mut available: Option<u64> = None;
    let mut buffers: u64 = 0;
    let mut cached: u64 = 0;

    for line in meminfo.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let value: u64 = parts[1].parse::<u64>().unwrap_or(0).saturating_mul(1024); // Convert from KB to bytes

        match parts[0] {
            "MemTotal:" => total = Some(value),
            "MemFree:" => free = value,
            "MemAvailable:" => available = Some(value),
            "Buffers:" => buffers = value,
            "Cached:" => cached = value,
            _ => {}
        }
    }

    let total = total?;
    let reclaimable = free.saturating_add(buffers).saturating_add(cached);
    // Kernels before 3.14 have no MemAvailable
    let available = available.unwrap_or(reclaimable).min(total);
    let used = total.saturating_sub(reclaimable);

    Some(MemoryReading {
        total,
        available,
        used,
        free,
        percent: percent(total - available, total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:        16000000 kB
MemFree:          4000000 kB
MemAvailable:    10000000 kB
Buffers:           500000 kB
Cached:           3500000 kB
SwapCached:             0 kB
";

    #[test]
    fn parses_core_fields() {
        let reading = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(reading.total, 16_000_000 * 1024);
        assert_eq!(reading.free, 4_000_000 * 1024);
        assert_eq!(reading.available, 10_000_000 * 1024);
        assert_eq!(reading.used, 8_000_000 * 1024);
        assert!((reading.percent - 37.5).abs() < 1e-9);
    }

    #[test]
    fn falls_back_when_available_missing() {
        let reading = parse_meminfo("MemTotal: 1000 kB\nMemFree: 200 kB\nCached: 300 kB\n").unwrap();
        assert_eq!(reading.available, 500 * 1024);
        assert_eq!(reading.percent, 50.0);
    }

    #[test]
    fn oversized_values_saturate() {
        let reading = parse_meminfo(
            "MemTotal: 18446744073709551615 kB\nMemFree: 18446744073709551615 kB\nCached: 5 kB\n",
        )
        .unwrap();
        assert_eq!(reading.total, u64::MAX);
        assert_eq!(reading.available, u64::MAX);
        assert_eq!(reading.used, 0);
    }

    #[test]
    fn missing_total_is_none() {
        assert!(parse_meminfo("MemFree: 200 kB\n").is_none());
    }

    #[test]
    fn sample_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meminfo"), "garbage\n").unwrap();
        let err = sample(&ProcFs::new(dir.path())).unwrap_err();
        assert!(err.to_string().contains("meminfo"));
    }
}
