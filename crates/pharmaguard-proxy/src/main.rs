//! PharmaGuard Proxy
//!
//! Compliance audit proxy for pharmacy web services.
//!
//! Every call passing through is classified, risk-scored and written to a
//! hash-chained audit store before being forwarded to the protected backend.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use pharmaguard_proxy::{create_router, AppState, ProxyConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pharmaguard-proxy")]
#[command(about = "PharmaGuard compliance audit proxy", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pharmaguard.yaml")]
    config: PathBuf,

    /// Backend application URL
    #[arg(short, long, env = "PHARMAGUARD_BACKEND")]
    backend: Option<String>,

    /// Audit directory
    #[arg(short, long)]
    audit_dir: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8080")]
    port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    info!("Starting PharmaGuard Proxy");

    let config = load_config(&cli)?;
    info!("Configuration loaded successfully");
    info!("Audit dir: {:?}", config.persistence.audit_dir);
    info!("Configured routes: {}", config.routes.len());
    if config.admin_token.is_none() {
        warn!("No admin token configured, audit API disabled");
    }

    let metrics_handle = init_metrics()?;

    let state = AppState::new(config, metrics_handle)?;
    info!("Application state initialized successfully");

    let purge_task = state.audit_service.spawn_purge_task();

    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Proxy listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    })
    .await?;

    purge_task.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// File and environment configuration with CLI overrides applied
fn load_config(cli: &Cli) -> Result<ProxyConfig> {
    let mut config = ProxyConfig::load(&cli.config)?;

    if let Some(backend) = &cli.backend {
        config.backend_url = Some(backend.clone());
    }
    if let Some(dir) = &cli.audit_dir {
        config.persistence.audit_dir = dir.clone();
    }

    Ok(config)
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("pharmaguard=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pharmaguard=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    pharmaguard_telemetry::metrics::describe();

    info!("Metrics exporter initialized");
    Ok(handle)
}
