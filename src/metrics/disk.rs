//! Disk space via statvfs and disk I/O counters from /proc/diskstats.

use super::{percent, rate_per_sec, ProcFs, SampleError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bytes per sector as reported by /proc/diskstats
const SECTOR_SIZE: u64 = 512;

/// Space usage of one mount point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    /// Space available to unprivileged users
    pub free: u64,
    pub percent: f64,
}

/// Cumulative I/O counters summed over whole disks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

/// Disk throughput derived from two counter snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskIoRates {
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub read_ops_per_sec: f64,
    pub write_ops_per_sec: f64,
}

impl DiskIoRates {
    pub fn between(prev: &DiskIoCounters, curr: &DiskIoCounters, elapsed_secs: f64) -> Self {
        Self {
            read_bytes_per_sec: rate_per_sec(prev.read_bytes, curr.read_bytes, elapsed_secs),
            write_bytes_per_sec: rate_per_sec(prev.write_bytes, curr.write_bytes, elapsed_secs),
            read_ops_per_sec: rate_per_sec(prev.read_ops, curr.read_ops, elapsed_secs),
            write_ops_per_sec: rate_per_sec(prev.write_ops, curr.write_ops, elapsed_secs),
        }
    }
}

/// Read and sum the whole-disk rows of /proc/diskstats
pub fn read_io_counters(procfs: &ProcFs) -> Result<DiskIoCounters, SampleError> {
    let diskstats = procfs.read("diskstats")?;
    Ok(parse_diskstats(&diskstats))
}

fn parse_diskstats(diskstats: &str) -> DiskIoCounters {
    let mut counters = DiskIoCounters::default();

    for line in diskstats.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }

        let device = parts[2];
        if !is_whole_disk(device) {
            continue;
        }

        let field = |i: usize| parts[i].parse::<u64>().unwrap_or(0);
        counters.read_ops = counters.read_ops.saturating_add(field(3));
        counters.read_bytes = counters.read_bytes.saturating_add(field(5).saturating_mul(SECTOR_SIZE));
        counters.write_ops = counters.write_ops.saturating_add(field(7));
        counters.write_bytes = counters.write_bytes.saturating_add(field(9).saturating_mul(SECTOR_SIZE));
    }

    counters
}

/// Skip partitions, loop devices, ram disks and device-mapper targets so
/// that I/O is not counted twice.
fn is_whole_disk(device: &str) -> bool {
    if device.starts_with("loop") || device.starts_with("ram") || device.starts_with("dm-") {
        return false;
    }

    let ends_with_digit = device
        .chars()
        .last()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);

    // nvme0n1p2 / mmcblk0p1 style partitions carry a 'p' before the number
    if device.starts_with("nvme") || device.starts_with("mmcblk") {
        let tail = device.trim_end_matches(|c: char| c.is_ascii_digit());
        return !(tail.ends_with('p') && ends_with_digit);
    }

    !ends_with_digit
}

/// Space usage of the filesystem containing `path`
#[cfg(unix)]
pub fn usage(path: &Path) -> Result<DiskUsage, SampleError> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(path.to_string_lossy().as_bytes()).map_err(|e| SampleError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut statvfs = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), statvfs.as_mut_ptr()) };
    if result != 0 {
        return Err(SampleError::Statvfs {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    let statvfs = unsafe { statvfs.assume_init() };
    let block_size = statvfs.f_frsize as u64;
    let total = statvfs.f_blocks as u64 * block_size;
    let free = statvfs.f_bavail as u64 * block_size;
    let used = total.saturating_sub(statvfs.f_bfree as u64 * block_size);

    Ok(DiskUsage {
        total,
        used,
        free,
        percent: percent(used, used + free),
    })
}

#[cfg(not(unix))]
pub fn usage(path: &Path) -> Result<DiskUsage, SampleError> {
    Err(SampleError::Statvfs {
        path: path.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::Unsupported),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
   8       0 sda 100 0 2000 50 40 0 800 30 0 60 80 0 0 0 0
   8       1 sda1 90 0 1800 45 35 0 700 25 0 55 70 0 0 0 0
 259       0 nvme0n1 10 0 20 1 4 0 8 1 0 2 2 0 0 0 0
 259       1 nvme0n1p1 9 0 18 1 3 0 6 1 0 2 2 0 0 0 0
   7       0 loop0 500 0 5000 5 0 0 0 0 0 5 5 0 0 0 0
 253       0 dm-0 70 0 900 20 30 0 600 20 0 40 40 0 0 0 0
";

    #[test]
    fn sums_whole_disks_only() {
        let counters = parse_diskstats(DISKSTATS);
        assert_eq!(counters.read_ops, 110);
        assert_eq!(counters.write_ops, 44);
        assert_eq!(counters.read_bytes, 2020 * SECTOR_SIZE);
        assert_eq!(counters.write_bytes, 808 * SECTOR_SIZE);
    }

    #[test]
    fn corrupt_counters_saturate() {
        let diskstats = "\
   8       0 sda 18446744073709551615 0 18446744073709551615 0 1 0 2 0 0 0 0 0 0 0 0
   8      16 sdb 5 0 10 0 1 0 2 0 0 0 0 0 0 0 0
";
        let counters = parse_diskstats(diskstats);
        assert_eq!(counters.read_ops, u64::MAX);
        assert_eq!(counters.read_bytes, u64::MAX);
        assert_eq!(counters.write_ops, 2);
        assert_eq!(counters.write_bytes, 4 * SECTOR_SIZE);
    }

    #[test]
    fn classifies_devices() {
        assert!(is_whole_disk("sda"));
        assert!(is_whole_disk("vdb"));
        assert!(is_whole_disk("nvme0n1"));
        assert!(is_whole_disk("mmcblk0"));
        assert!(!is_whole_disk("sda3"));
        assert!(!is_whole_disk("nvme1n1p3"));
        assert!(!is_whole_disk("mmcblk0p2"));
        assert!(!is_whole_disk("loop7"));
        assert!(!is_whole_disk("dm-1"));
    }

    #[test]
    fn rates_between_snapshots() {
        let prev = DiskIoCounters { read_bytes: 1000, write_bytes: 0, read_ops: 10, write_ops: 4 };
        let curr = DiskIoCounters { read_bytes: 3000, write_bytes: 512, read_ops: 14, write_ops: 4 };

        let rates = DiskIoRates::between(&prev, &curr, 2.0);
        assert_eq!(rates.read_bytes_per_sec, 1000.0);
        assert_eq!(rates.write_bytes_per_sec, 256.0);
        assert_eq!(rates.read_ops_per_sec, 2.0);
        assert_eq!(rates.write_ops_per_sec, 0.0);

        assert_eq!(DiskIoRates::between(&prev, &curr, 0.0), DiskIoRates::default());
    }

    #[test]
    fn root_filesystem_usage_is_consistent() {
        let usage = usage(Path::new("/")).unwrap();
        assert!(usage.total > 0);
        assert!(usage.used <= usage.total);
        assert!((0.0..=100.0).contains(&usage.percent));
    }

    #[test]
    fn missing_mount_point_is_statvfs_error() {
        let err = usage(Path::new("/no/such/mount/point")).unwrap_err();
        assert!(matches!(err, SampleError::Statvfs { .. }));
    }
}
