//! WebAI Monitor - host metrics exporter.
//!
//! Samples CPU, memory, disk, network and estimated accelerator load on a
//! fixed interval and serves the latest readings in Prometheus text format.

mod exporter;
mod logging;
mod metrics;
mod monitor;
mod registry;
mod sampler;
mod server;
mod units;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use exporter::{Exporter, ExporterSettings};
use metrics::{PowerProfile, SystemInfo};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Host metrics exporter for Prometheus
#[derive(Parser, Debug)]
#[command(name = "webai-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to serve /metrics on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Sampling interval in seconds
    #[arg(short = 'i', long, default_value = "10")]
    interval: f64,

    /// Stop sampling after this many seconds (server keeps running)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Log file (default: ~/webai_monitoring.log)
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Mount point whose space usage is reported
    #[arg(long, default_value = "/")]
    disk_path: PathBuf,

    /// procfs mount to read counters from
    #[arg(long, default_value = "/proc")]
    proc_root: PathBuf,

    /// CPU measurement window in seconds
    #[arg(long, default_value = "1.0")]
    cpu_window: f64,

    /// Power profile for the CPU/GPU/NPU estimates
    #[arg(long, value_enum, default_value_t = ProfileArg::Auto)]
    power_profile: ProfileArg,

    /// Re-read memory, disk and network counters on every scrape
    #[arg(long)]
    scrape_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    /// Detect from the host
    Auto,
    AppleSilicon,
    Generic,
}

impl ProfileArg {
    fn resolve(self, system: &SystemInfo) -> PowerProfile {
        match self {
            ProfileArg::Auto if system.is_apple_silicon() => PowerProfile::AppleSilicon,
            ProfileArg::Auto => PowerProfile::Generic,
            ProfileArg::AppleSilicon => PowerProfile::AppleSilicon,
            ProfileArg::Generic => PowerProfile::Generic,
        }
    }
}

fn seconds(value: f64, name: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {}: {}", name, value))
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let interval = seconds(args.interval, "interval")?;
    let cpu_window = seconds(args.cpu_window, "cpu window")?;
    let duration = args.duration.map(Duration::from_secs);

    let log_path = args.log_file.clone().unwrap_or_else(logging::default_log_path);
    let _log_guard = logging::init(&log_path)?;

    let system = SystemInfo::detect();
    let settings = ExporterSettings {
        proc_root: args.proc_root.clone(),
        disk_path: args.disk_path.clone(),
        cpu_window,
        power_profile: args.power_profile.resolve(&system),
        scrape_refresh: args.scrape_refresh,
    };
    let exporter = Arc::new(Exporter::new(settings, system).context("Failed to build metrics registry")?);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {} - is the port already in use?", addr))?;

    let system = exporter.system();
    eprintln!("WebAI System Monitoring Exporter");
    eprintln!("--------------------------------");
    eprintln!(
        "Monitoring system: {} {} ({})",
        system.platform, system.platform_version, system.architecture
    );
    eprintln!("Data is being logged to {}", log_path.display());
    eprintln!("Metrics are available at http://{}/metrics", addr);
    info!("Serving metrics on {}", addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampling = tokio::spawn(monitor::run(Arc::clone(&exporter), interval, duration, shutdown_rx));

    let served = axum::serve(listener, server::create_router(Arc::clone(&exporter)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sampling.await {
        error!("Sampling loop panicked: {}", e);
    }

    served.context("HTTP server failed")?;
    info!("Exporter shut down after {} refresh cycles", exporter.cycles());
    eprintln!("Shutting down");
    Ok(())
}
