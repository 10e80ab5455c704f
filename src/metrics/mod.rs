//! Metrics collection modules for host resource sampling.

pub mod accelerator;
pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
pub mod system;

pub use accelerator::{AcceleratorProbe, AcceleratorReading, PowerProfile, ReadingSource};
pub use disk::{DiskIoCounters, DiskIoRates, DiskUsage};
pub use memory::MemoryReading;
pub use network::{NetworkCounters, NetworkReading};
pub use system::SystemInfo;

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Failure to read a genuine OS counter
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
    #[error("statvfs failed for {path}: {source}")]
    Statvfs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle to a procfs mount, `/proc` in production
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Read a file relative to the procfs root
    pub fn read(&self, name: &str) -> Result<String, SampleError> {
        let path = self.path(name);
        fs::read_to_string(&path).map_err(|source| SampleError::Read { path, source })
    }

    pub fn parse_error(&self, name: &str, detail: impl Into<String>) -> SampleError {
        SampleError::Parse {
            path: self.path(name),
            detail: detail.into(),
        }
    }
}

/// Immutable capture of cumulative counters and when they were taken
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot<T> {
    pub counters: T,
    pub taken_at: Instant,
    /// Capture order within one tracker, starting at 1
    pub seq: u64,
}

/// Per-second rate between two cumulative counter values.
///
/// Returns 0 when no time has passed (or the clock went backwards) and when the
/// counter itself went backwards.
pub fn rate_per_sec(prev: u64, curr: u64, elapsed_secs: f64) -> f64 {
    if !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
        return 0.0;
    }
    curr.saturating_sub(prev) as f64 / elapsed_secs
}

/// Keeps the previous snapshot of one counter family for rate calculations.
///
/// The counter read and the baseline swap happen under one lock, so concurrent
/// callers always observe snapshots in capture order.
pub struct RateTracker<T> {
    baseline: Mutex<Option<CounterSnapshot<T>>>,
}

impl<T: Copy> RateTracker<T> {
    pub fn new() -> Self {
        Self {
            baseline: Mutex::new(None),
        }
    }

    /// Read fresh counters and swap them in as the new baseline.
    ///
    /// Returns the fresh snapshot and the one it replaced, if any.
    pub fn advance<E, F>(&self, read: F) -> Result<(CounterSnapshot<T>, Option<CounterSnapshot<T>>), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut baseline = self.baseline.lock();
        let current = CounterSnapshot {
            counters: read()?,
            taken_at: Instant::now(),
            seq: baseline.as_ref().map_or(1, |prev| prev.seq + 1),
        };
        let previous = baseline.replace(current);
        Ok((current, previous))
    }
}

impl<T: Copy> Default for RateTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds between two snapshots, 0 when `current` is not after `previous`
pub fn elapsed_secs<T>(previous: &CounterSnapshot<T>, current: &CounterSnapshot<T>) -> f64 {
    current
        .taken_at
        .checked_duration_since(previous.taken_at)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Percentage of `part` in `whole`, 0 for an empty whole
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
