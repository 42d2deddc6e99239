//! # Tunnel Broker
//!
//! Public entry point of the reverse tunnel.
//!
//! ## Startup Sequence
//!
//! 1. Install structured logging (env-driven)
//! 2. Load configuration (TOML file if given, then env, then flags)
//! 3. Validate and build the service
//! 4. Serve the public and admin listeners until Ctrl+C

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use tunnel_broker::{BrokerConfig, BrokerService};
use tunnel_telemetry::{init_logging, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "tunnel-broker")]
#[command(about = "Forward public HTTP requests to a worker over a single WebSocket")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Public HTTP port (overrides config and INLETS_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// How long a caller waits for the worker, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log filter, e.g. "debug" or "tunnel_broker=trace"
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<BrokerConfig> {
    let mut config = match &args.config {
        Some(path) => BrokerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BrokerConfig::default(),
    };

    config.apply_env();

    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(ms) = args.timeout_ms {
        config.ingress.timeout = Duration::from_millis(ms);
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env("tunnel-broker");
    if let Some(level) = &args.log_level {
        telemetry = telemetry.with_log_level(level.clone());
    }
    init_logging(&telemetry)?;

    let config = load_config(&args)?;
    info!(
        http = %config.http_addr(),
        tunnel_path = %config.tunnel.path,
        timeout_ms = config.ingress.timeout.as_millis() as u64,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    let service = BrokerService::new(config)?;

    info!("Broker is running. Press Ctrl+C to stop.");
    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
