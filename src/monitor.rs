//! Background sampling loop.

use crate::exporter::Exporter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

/// Why the loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    DurationReached,
}

/// Refresh every `interval` until shutdown is signalled or `duration` passes.
///
/// Each refresh runs on a blocking thread since CPU sampling sleeps for its
/// measurement window. A failed cycle is logged and the loop carries on.
pub async fn run(
    exporter: Arc<Exporter>,
    interval: Duration,
    duration: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> LoopExit {
    let start_time = Instant::now();

    loop {
        if *shutdown.borrow() {
            info!("Monitoring stopped by user");
            return LoopExit::Shutdown;
        }

        let cycle_exporter = Arc::clone(&exporter);
        match tokio::task::spawn_blocking(move || cycle_exporter.refresh()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Error during monitoring: {}", e),
            Err(e) => error!("Sampling task failed: {}", e),
        }

        if let Some(limit) = duration {
            if start_time.elapsed() >= limit {
                info!("Monitoring completed after {} seconds", limit.as_secs_f64());
                return LoopExit::DurationReached;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                // A dropped sender also means nobody will ever ask again
                if changed.is_err() || *shutdown.borrow() {
                    info!("Monitoring stopped by user");
                    return LoopExit::Shutdown;
                }
            }
        }
    }
}
