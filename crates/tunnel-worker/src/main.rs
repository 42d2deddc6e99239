//! Tunnel worker entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tunnel_telemetry::{init_logging, TelemetryConfig};
use tunnel_worker::{connect, WorkerRelay};

#[derive(Parser, Debug)]
#[command(name = "tunnel-worker")]
#[command(about = "Answer requests forwarded by a tunnel broker")]
#[command(version)]
struct Args {
    /// Broker tunnel endpoint
    #[arg(short, long, default_value = "ws://127.0.0.1:9000/ws")]
    url: String,

    /// Log filter, e.g. "debug"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env("tunnel-worker");
    if let Some(level) = &args.log_level {
        telemetry = telemetry.with_log_level(level.clone());
    }
    init_logging(&telemetry)?;

    info!(url = %args.url, "Connecting to broker");
    let (sink, source) = connect(&args.url).await?;
    let relay = WorkerRelay::new();

    tokio::select! {
        result = relay.run(sink, source) => {
            let summary = result.context("tunnel transport failed")?;
            info!(answered = summary.answered, "Worker finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
