mod agent;
mod config;
mod sender;

use agent::Agent;
use anyhow::{Context, Result};
use config::AgentConfig;
use sender::MetricsSender;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse=info".parse()?))
        .init();

    let cfg = AgentConfig::load();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %cfg.address,
        poll_secs = cfg.poll_interval.as_secs(),
        report_secs = cfg.report_interval.as_secs(),
        rate_limit = cfg.rate_limit,
        signing = cfg.hmac_key.is_some(),
        encryption = cfg.crypto_key_path.is_some(),
        "pulse-agent starting"
    );

    // A bad key file is a startup failure, not something to limp past.
    let public_key = match &cfg.crypto_key_path {
        Some(path) => Some(
            pulse_common::rsacrypto::load_public_key(Path::new(path))
                .with_context(|| format!("load RSA public key from {path}"))?,
        ),
        None => None,
    };

    let sender = MetricsSender::new(&cfg.address, cfg.hmac_key.clone(), public_key)
        .context("build HTTP client")?;
    let agent = Agent::new(
        cfg.poll_interval,
        cfg.report_interval,
        cfg.rate_limit,
        sender,
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_token.cancel();
    });

    agent.run(token).await?;
    tracing::info!("agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
