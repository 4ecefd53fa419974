//! autograd-server: liveness endpoint for the grading service.

mod router;

use clap::Parser;
use tracing::{info, warn};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "autograd-server", version, about)]
struct Cli {
    /// Bind address, overriding the configured HOST.
    #[arg(long, env = "AUTOGRAD_HOST")]
    host: Option<String>,

    /// Bind port, overriding the configured PORT.
    #[arg(long, env = "AUTOGRAD_PORT")]
    port: Option<u16>,
}

fn load_config(cli: &Cli) -> autograd_core::Config {
    autograd_core::config::load_dotenv();
    let mut config = autograd_core::Config::from_env();
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "unable to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    config.log_summary();

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening");

    axum::serve(listener, router::build_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server exited cleanly");
    Ok(())
}
