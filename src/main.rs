// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use session_pulse::config::AppConfig;
use session_pulse::emitter::{Emitter, EmitterInstruments};
use session_pulse::session::{JsonSerializer, SyntheticSource};
use session_pulse::telemetry::init_telemetry;
use tokio::sync::watch;
use tracing::{info, warn};

/// How long to wait for the in-flight cycle after a stop signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "session-pulse",
    version,
    about = "Emit synthetic session records as OpenTelemetry logs and metrics"
)]
struct Cli {
    /// Path to the telemetry configuration file
    #[arg(short, long, default_value = "./otel.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let telemetry = init_telemetry(&config).context("initializing telemetry")?;

    info!(
        interval_secs = config.emitter.interval_secs,
        endpoint = %config.exporter.endpoint,
        "session generator started"
    );

    let instruments = EmitterInstruments::new(&opentelemetry::global::meter("session-pulse"));
    let emitter = Emitter::new(
        config.emitter.interval(),
        SyntheticSource,
        JsonSerializer,
        instruments,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(emitter.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "emitter task failed"),
        Err(_) => warn!("emitter did not stop within the grace period"),
    }

    telemetry.shutdown()?;
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
