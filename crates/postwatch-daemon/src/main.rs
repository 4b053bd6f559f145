//! Postwatch daemon - notifies you when chosen Bluesky accounts post
//!
//! The daemon provides:
//! - Startup resolution of watched handles to DIDs
//! - A firehose subscription filtered to new posts from those DIDs
//! - Chat direct messages (or stdout in dry-run mode) per new post
//! - Fixed-delay reconnects until interrupted

mod error;
mod notifier;
mod session;
mod supervisor;
mod transport;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use libpostwatch_atproto::{ChatClient, ProfileClient, XrpcClient, XrpcIdentityResolver};
use libpostwatch_core::{Config, EventFilter, Handle};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use error::DaemonError;
use notifier::{ChatNotifier, LogNotifier, PostNotifier};
use supervisor::{Supervisor, SupervisorConfig};
use transport::WebSocketTransport;

#[derive(Parser)]
#[command(
    name = "postwatch-daemon",
    about = "Watch the Bluesky firehose for new posts from chosen accounts",
    version
)]
struct Cli {
    /// Handle to watch (repeatable, e.g. --handle alice.bsky.social)
    #[arg(long = "handle", required = true, value_parser = parse_handle)]
    handles: Vec<Handle>,

    /// Config file (defaults to ./postwatch.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print matches instead of sending chat messages
    #[arg(long)]
    dry_run: bool,
}

fn parse_handle(s: &str) -> Result<Handle, String> {
    Handle::parse(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("postwatch-daemon starting");

    match run(cli).await {
        Ok(()) => {
            info!("postwatch-daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            if let DaemonError::Config(config_error) = &e {
                for hint in config_error.suggestions() {
                    info!("hint: {}", hint);
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), DaemonError> {
    let config = Config::load(cli.config.as_deref())?;
    let profiles = ProfileClient::new(XrpcClient::new(&config.appview.url));

    let notifier: Arc<dyn PostNotifier> = if cli.dry_run {
        info!("Dry run: matches are printed, not sent");
        Arc::new(LogNotifier::new(Some(profiles)))
    } else {
        let credentials = config.chat_credentials()?;
        let recipient = credentials.recipient.clone();
        let chat = tokio::task::spawn_blocking(move || ChatClient::login(&credentials))
            .await?
            .map_err(DaemonError::ChatLogin)?;
        info!(account = %chat.account(), recipient = %recipient, "Logged in for chat delivery");
        Arc::new(ChatNotifier::new(Arc::new(chat), recipient, profiles))
    };

    let resolver = Arc::new(XrpcIdentityResolver::new(XrpcClient::new(&config.appview.url)));
    let transport = Arc::new(
        WebSocketTransport::new(config.firehose.url.clone())
            .with_ping_interval(config.idle_timeout() / 3),
    );
    let supervisor = Supervisor::new(
        transport,
        EventFilter::new(config.firehose.collection.clone()),
        notifier,
        SupervisorConfig::from(&config),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        stop_tx.send_replace(true);
    });

    let stats = supervisor.start(resolver, cli.handles, stop_rx).await?;
    info!(
        sessions = stats.sessions_started,
        decode_failures = stats.decode_failures,
        delivered = stats.posts_delivered,
        delivery_failures = stats.delivery_failures,
        "Firehose monitoring finished"
    );
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
