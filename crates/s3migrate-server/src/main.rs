use clap::Parser;
use tracing_subscriber::EnvFilter;

use s3migrate_server::{ApiConfig, ApiServer};

/// Waits for SIGINT or SIGTERM, then asks every in-flight engine to stop.
/// Each engine's own pipeline still drains its workers and runs the
/// verification pass; this only stops new bytes moving and lets the
/// in-flight `axum::serve` future's graceful shutdown close listeners.
async fn shutdown_signal(state: s3migrate_server::AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping in-flight migrations");
    state.orchestrator.shutdown().await;
}

/// Run the S3 migration engine's HTTP surface.
#[derive(Parser)]
#[command(name = "s3migrate-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP surface for submitting and tracking S3-compatible migrations")]
struct Cli {
    /// Address to bind to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port).parse()?;
    let config = ApiConfig::default().with_addr(addr);

    let server = ApiServer::new(config);
    let state = server.state().clone();
    server.run_until(shutdown_signal(state)).await?;

    Ok(())
}
