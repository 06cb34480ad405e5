use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use estoque_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use estoque_server::{Service, ServiceContext};

/// Upper bound for a graceful stop once a signal arrives.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Cache-coherence agent for one inventory service.
#[derive(Debug, Parser)]
#[command(name = "estoque-node", version, about)]
struct Cli {
    /// Service to run (auth, usuarios, unidades, categorias, produtos,
    /// movimentacoes, relatorios). Overrides `service` from the config.
    #[arg(long, env = "ESTOQUE_SERVICE")]
    service: Option<Service>,

    /// Configuration file
    #[arg(long, env = "ESTOQUE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    estoque_server::observability::init_tracing();

    let cli = Cli::parse();

    let cfg = load_config(Some(&cli.config)).context("configuration error")?;
    estoque_server::observability::apply_logging_level(&cfg.logging.level);

    let service = match (cli.service, cfg.service.as_deref()) {
        (Some(service), _) => service,
        (None, Some(name)) => name.parse::<Service>()?,
        (None, None) => anyhow::bail!("no service selected, pass --service or set `service`"),
    };

    tracing::info!(
        path = %cli.config,
        service = %service,
        host = %estoque_server::observability::instance_name(),
        "Configuration loaded"
    );

    let context = ServiceContext::start(&cfg, service)
        .await
        .with_context(|| format!("failed to start {service}"))?;

    shutdown_signal().await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, context.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
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
    tracing::info!("shutdown signal received");
}
