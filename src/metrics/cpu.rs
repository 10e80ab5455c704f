//! CPU utilization from /proc/stat.

use super::{ProcFs, SampleError};
use std::thread;
use std::time::Duration;

/// Raw CPU time values from the aggregate `cpu` line of /proc/stat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn idle_all(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Read the aggregate CPU times
pub fn read_cpu_times(procfs: &ProcFs) -> Result<CpuTimes, SampleError> {
    let content = procfs.read("stat")?;
    content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .map(parse_cpu_line)
        .ok_or_else(|| procfs.parse_error("stat", "no aggregate cpu line"))
}

/// Utilization over a blocking measurement window.
///
/// Blocks the calling thread for `window`; callers on an async runtime should
/// run this on a blocking thread.
pub fn sample_utilization(procfs: &ProcFs, window: Duration) -> Result<f64, SampleError> {
    let before = read_cpu_times(procfs)?;
    if !window.is_zero() {
        thread::sleep(window);
    }
    let after = read_cpu_times(procfs)?;
    Ok(utilization(&before, &after))
}

fn parse_cpu_line(line: &str) -> CpuTimes {
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1) // Skip "cpu"
        .filter_map(|s| s.parse().ok())
        .collect();

    CpuTimes {
        user: *parts.first().unwrap_or(&0),
        nice: *parts.get(1).unwrap_or(&0),
        system: *parts.get(2).unwrap_or(&0),
        idle: *parts.get(3).unwrap_or(&0),
        iowait: *parts.get(4).unwrap_or(&0),
        irq: *parts.get(5).unwrap_or(&0),
        softirq: *parts.get(6).unwrap_or(&0),
        steal: *parts.get(7).unwrap_or(&0),
    }
}

/// Busy percentage between two readings, clamped to [0, 100]
pub fn utilization(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }

    let idle_delta = curr.idle_all().saturating_sub(prev.idle_all());
    let busy = 100.0 * (1.0 - (idle_delta as f64 / total_delta as f64));
    busy.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_aggregate_line() {
        let times = parse_cpu_line("cpu  4705 150 1120 16250 520 0 30 0 0 0");
        assert_eq!(times.user, 4705);
        assert_eq!(times.idle, 16250);
        assert_eq!(times.iowait, 520);
        assert_eq!(times.total(), 4705 + 150 + 1120 + 16250 + 520 + 30);
    }

    #[test]
    fn short_line_defaults_missing_fields() {
        let times = parse_cpu_line("cpu 10 0 5 85");
        assert_eq!(times.total(), 100);
        assert_eq!(times.steal, 0);
    }

    #[test]
    fn half_busy_between_readings() {
        let prev = CpuTimes { user: 100, idle: 100, ..Default::default() };
        let curr = CpuTimes { user: 150, idle: 150, ..Default::default() };
        assert_eq!(utilization(&prev, &curr), 50.0);
    }

    #[test]
    fn identical_readings_are_idle() {
        let times = CpuTimes { user: 7, idle: 9, ..Default::default() };
        assert_eq!(utilization(&times, &times), 0.0);
    }

    #[test]
    fn iowait_counts_as_idle() {
        let prev = CpuTimes::default();
        let curr = CpuTimes { system: 25, iowait: 75, ..Default::default() };
        assert_eq!(utilization(&prev, &curr), 25.0);
    }

    #[test]
    fn reads_from_procfs_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("stat"),
            "cpu  10 0 10 80 0 0 0 0 0 0\ncpu0 10 0 10 80 0 0 0 0 0 0\nctxt 1\n",
        )
        .unwrap();
        let procfs = ProcFs::new(dir.path());

        let times = read_cpu_times(&procfs).unwrap();
        assert_eq!(times.total(), 100);
        assert_eq!(sample_utilization(&procfs, Duration::ZERO).unwrap(), 0.0);
    }

    #[test]
    fn missing_aggregate_line_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stat"), "ctxt 1\n").unwrap();
        let procfs = ProcFs::new(dir.path());

        assert!(matches!(read_cpu_times(&procfs), Err(SampleError::Parse { .. })));
    }
}
