//! notaryd - cross-coordinator buyer reputation notary daemon
//!
//! Ingests coordinator-signed success receipts and scam reports, links
//! buyer ephemeral pubkeys to master identities via a gift-wrapped
//! handshake, and republishes reputation badges and encrypted stats
//! responses.

use notaryd::config::NotaryConfig;
use notaryd::service::Supervisor;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match NotaryConfig::load() {
        Ok(config) => config,
        Err(err) => {
            // Logging isn't initialized yet (it depends on NOTARY_DEBUG),
            // so a config failure goes straight to stderr.
            eprintln!("notaryd: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("notaryd={default_level}").parse().unwrap()),
        )
        .init();

    info!("notaryd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(error = %err, "failed to initialize notary service");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = supervisor.start().await {
        error!(error = %err, "failed to start notary service");
        return ExitCode::FAILURE;
    }

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sig) => sig,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            supervisor.stop().await;
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }

    supervisor.stop().await;
    ExitCode::SUCCESS
}
