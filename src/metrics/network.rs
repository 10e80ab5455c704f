//! Network I/O counters from /proc/net/dev.

use super::{rate_per_sec, ProcFs, SampleError};
use serde::{Deserialize, Serialize};

/// Cumulative counters summed over all non-loopback interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// Network totals plus throughput since the previous sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkReading {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub bytes_sent_per_sec: f64,
    pub bytes_recv_per_sec: f64,
    /// Capture order of the totals; 0 when not taken through a tracker
    #[serde(skip)]
    pub seq: u64,
}

impl NetworkReading {
    /// Reading for `curr`, with rates against `prev` when a baseline exists
    pub fn from_counters(curr: &NetworkCounters, prev: Option<&NetworkCounters>, elapsed_secs: f64) -> Self {
        let (sent_rate, recv_rate) = match prev {
            Some(prev) => (
                rate_per_sec(prev.bytes_sent, curr.bytes_sent, elapsed_secs),
                rate_per_sec(prev.bytes_recv, curr.bytes_recv, elapsed_secs),
            ),
            None => (0.0, 0.0),
        };

        Self {
            bytes_sent: curr.bytes_sent,
            bytes_recv: curr.bytes_recv,
            packets_sent: curr.packets_sent,
            packets_recv: curr.packets_recv,
            bytes_sent_per_sec: sent_rate,
            bytes_recv_per_sec: recv_rate,
            seq: 0,
        }
    }
}

/// Read and sum interface counters
pub fn read_counters(procfs: &ProcFs) -> Result<NetworkCounters, SampleError> {
    let netdev = procfs.read("net/dev")?;
    Ok(parse_netdev(&netdev))
}

fn parse_netdev(netdev: &str) -> NetworkCounters {
    let mut counters = NetworkCounters::default();

    for line in netdev.lines().skip(2) {
        // Older kernels print "eth0:123" without a space after the colon
        let Some((interface, fields)) = line.split_once(':') else {
            continue;
        };
        let interface = interface.trim();
        if interface == "lo" {
            continue;
        }

        let parts: Vec<u64> = fields
            .split_whitespace()
            .map(|s| s.parse().unwrap_or(0))
            .collect();
        if parts.len() < 16 {
            continue;
        }

        counters.bytes_recv = counters.bytes_recv.saturating_add(parts[0]);
        counters.packets_recv = counters.packets_recv.saturating_add(parts[1]);
        counters.bytes_sent = counters.bytes_sent.saturating_add(parts[8]);
        counters.packets_sent = counters.packets_sent.saturating_add(parts[9]);
    }

    counters
}
