use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use sendlimit::config::{LogFormat, SendlimitConfig};
use sendlimit::policy::PolicyServer;
use sendlimit::ratelimit::{TokenRegistry, WindowController};

/// Sender-based sliding window rate limiting for Postfix.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the policy server listens on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Messages per window for senders without a domain override
    #[arg(long)]
    default_limit: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    interval: Option<String>,

    /// Text appended to deferral replies
    #[arg(long)]
    defer_message: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SendlimitConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    init_tracing(config.logging.format);

    info!("Starting Sendlimit policy service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        default_limit = config.limits.default_limit,
        interval_secs = config.limits.interval_secs,
        lock_strategy = ?config.limits.lock_strategy,
        "Configuration loaded"
    );

    let tokens = Arc::new(TokenRegistry::new());
    let controller = config.limits.build_controller(tokens)?;

    if let Some(limit) = args.default_limit {
        controller.set_default_limit(limit);
    }
    if let Some(interval) = args.interval.as_deref() {
        controller.set_interval_secs(interval);
    }
    if let Some(message) = args.defer_message {
        controller.set_defer_message(message);
    }

    let controller = Arc::new(controller);

    if let Some(every) = config.eviction.sweep_interval() {
        info!(interval_secs = every.as_secs(), "Idle token eviction enabled");
        tokio::spawn(sweep_idle_tokens(Arc::clone(&controller), every));
    }

    let server = PolicyServer::new(config.server.listen_addr, controller);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Sendlimit policy service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Periodically drop tokens for senders that have gone quiet.
async fn sweep_idle_tokens(controller: Arc<WindowController>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let evicted = controller.sweep_idle();
        debug!(
            evicted = evicted,
            remaining = controller.tokens().len(),
            "Idle token sweep finished"
        );
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
