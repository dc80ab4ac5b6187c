//! Somatel demo server
//!
//! Usage:
//! ```bash
//! # With the default telemetry config
//! somatel-server
//!
//! # With an explicit config and downstream address
//! somatel-server --config telemetry.yaml --downstream http://localhost:8082
//! ```
//!
//! Test with:
//! ```bash
//! curl 'http://localhost:8085/soma?a=3&b=4'
//! ```

use clap::Parser;
use somatel_server::app::{self, AppState};
use somatel_telemetry::{health_router, TelemetryClient, TelemetryOptions, TelemetrySettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Somatel Server - Instrumented sum service
#[derive(Parser)]
#[command(name = "somatel-server")]
#[command(about = "Instrumented sum service with tracing, metrics and correlated logs", long_about = None)]
struct Cli {
    /// Path to the telemetry configuration file (YAML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "SOMATEL_CONFIG",
        default_value = "telemetry.yaml"
    )]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, env = "SOMATEL_LISTEN", default_value = "127.0.0.1:8085")]
    listen: SocketAddr,

    /// Base URL of the downstream calculation service
    #[arg(
        short,
        long,
        env = "SOMATEL_DOWNSTREAM",
        default_value = "http://localhost:8082"
    )]
    downstream: String,

    /// Service name override
    #[arg(long, env = "SERVICE_NAME")]
    service_name: Option<String>,

    /// Environment tag override (dev, staging, prod)
    #[arg(long, env = "ENVIRONMENT")]
    environment: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("📁 Loading telemetry configuration from: {}", cli.config.display());
    let mut options = TelemetryOptions::new(&cli.config)
        .with_service_version(env!("CARGO_PKG_VERSION"));
    if let Some(service_name) = cli.service_name {
        options = options.with_service_name(service_name);
    }
    if let Some(environment) = cli.environment {
        options = options.with_environment(environment);
    }
    let settings = TelemetrySettings::load(&options)?;

    info!("📊 Initializing telemetry (traces, metrics, correlated logs)");
    let client = Arc::new(TelemetryClient::new(settings)?);
    let metrics = Arc::new(client.http_metrics()?);
    client.register_runtime_metrics()?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;
    let state = Arc::new(AppState {
        client: client.clone(),
        metrics,
        http,
        downstream: cli.downstream.trim_end_matches('/').to_string(),
    });

    let registry = client.registry();
    let app = app::router(state).merge(health_router(registry));

    let listener = TcpListener::bind(cli.listen).await?;

    info!("");
    info!("✅ {} listening on http://{}", client.service_name(), cli.listen);
    info!("   - Sum endpoint:       http://{}/soma?a=1&b=2", cli.listen);
    info!("   - Downstream service: {}", cli.downstream);
    info!("   Observability:");
    info!("   - Health check:       http://{}/healthz", cli.listen);
    info!("   - Prometheus metrics: http://{}/metrics", cli.listen);
    info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    client.shutdown()?;

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
