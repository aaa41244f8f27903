//! `getting-started` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Resolve the OTLP settings and assemble the telemetry pipeline.
//! 3. Publish the pipeline, install the tracing subscriber, and register the
//!    runtime observers.
//! 4. Build the Axum router and serve until Ctrl-C / SIGTERM.
//! 5. Flush telemetry.

mod config;
mod server;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::server::state::AppState;
use telemetry::env::{Properties, Resolver};
use telemetry::{PipelineConfig, TelemetryPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry pipeline
    // -----------------------------------------------------------------------
    let resolver = Resolver::from_process(Properties::from_args(std::env::args()));
    let pipeline_cfg =
        PipelineConfig::from_resolver(&resolver).context("invalid telemetry configuration")?;
    let pipeline =
        TelemetryPipeline::assemble(&pipeline_cfg).context("failed to assemble telemetry")?;

    // -----------------------------------------------------------------------
    // 3. Registration
    // -----------------------------------------------------------------------
    let telemetry = telemetry::global::install(pipeline).context("failed to publish telemetry")?;
    telemetry::subscriber::init(&telemetry, &cfg.log_level)
        .context("failed to initialise tracing subscriber")?;
    let observers = telemetry::runtime::register(&telemetry);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.port,
        otlp_endpoint = %pipeline_cfg.endpoint(),
        runtime_instruments = observers.names().len(),
        "getting-started starting"
    );

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(AppState::new(telemetry.clone()));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // -----------------------------------------------------------------------
    // 5. Telemetry flush
    // -----------------------------------------------------------------------
    info!("shutting down");
    if let Some(pipeline) = telemetry.pipeline().cloned() {
        tokio::task::spawn_blocking(move || pipeline.shutdown())
            .await
            .context("telemetry shutdown task panicked")?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
