use clap::Parser;
use pulse_common::configio::{non_empty, parse_duration, IntervalValue};
use serde::Deserialize;
use std::time::Duration;

/// Command-line flags; every value optional so the layered resolution
/// (flags > environment > JSON file > defaults) can tell "set" from "unset".
#[derive(Debug, Default, Parser)]
#[command(name = "pulse-agent", about = "Telemetry collection agent")]
pub struct AgentFlags {
    /// Path to JSON configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    /// Server endpoint address
    #[arg(short = 'a', long)]
    pub address: Option<String>,
    /// Poll interval in seconds
    #[arg(short = 'p', long)]
    pub poll_interval: Option<u64>,
    /// Report interval in seconds
    #[arg(short = 'r', long)]
    pub report_interval: Option<u64>,
    /// Key for request signing
    #[arg(short = 'k', long)]
    pub key: Option<String>,
    /// Path to the RSA public key for request encryption
    #[arg(long = "crypto-key")]
    pub crypto_key: Option<String>,
    /// Max concurrent outbound sends
    #[arg(short = 'l', long)]
    pub rate_limit: Option<usize>,
}

/// JSON configuration file shape.
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub report_interval: Option<IntervalValue>,
    #[serde(default)]
    pub poll_interval: Option<IntervalValue>,
    #[serde(default)]
    pub crypto_key: Option<String>,
}

/// Fully resolved agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub hmac_key: Option<String>,
    pub crypto_key_path: Option<String>,
    pub rate_limit: usize,
}

impl AgentConfig {
    pub fn load() -> Self {
        Self::resolve(AgentFlags::parse())
    }

    pub fn resolve(flags: AgentFlags) -> Self {
        let file = load_file_config(flags.config.clone().or_else(|| env_var("CONFIG")));

        let address = flags
            .address
            .or_else(|| env_var("ADDRESS"))
            .or_else(|| file.address.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "localhost:8080".to_string());

        let poll_interval = flags
            .poll_interval
            .map(Duration::from_secs)
            .or_else(|| env_var("POLL_INTERVAL").and_then(|v| parse_duration(&v)))
            .or_else(|| file.poll_interval.as_ref().and_then(IntervalValue::as_duration))
            .unwrap_or(Duration::from_secs(2));

        let report_interval = flags
            .report_interval
            .map(Duration::from_secs)
            .or_else(|| env_var("REPORT_INTERVAL").and_then(|v| parse_duration(&v)))
            .or_else(|| file.report_interval.as_ref().and_then(IntervalValue::as_duration))
            .unwrap_or(Duration::from_secs(10));

        let hmac_key = non_empty(flags.key.or_else(|| env_var("KEY")));

        let crypto_key_path = non_empty(
            flags
                .crypto_key
                .or_else(|| env_var("CRYPTO_KEY"))
                .or_else(|| file.crypto_key.clone()),
        );

        let rate_limit = flags
            .rate_limit
            .or_else(|| env_var("RATE_LIMIT").and_then(|v| v.parse().ok()))
            .unwrap_or(4)
            .max(1);

        Self {
            address,
            poll_interval,
            report_interval,
            hmac_key,
            crypto_key_path,
            rate_limit,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn load_file_config(path: Option<String>) -> AgentFileConfig {
    let Some(path) = non_empty(path) else {
        return AgentFileConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to parse JSON config, ignoring");
                AgentFileConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "failed to read JSON config, ignoring");
            AgentFileConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let cfg = AgentConfig::resolve(AgentFlags::default());
        assert_eq!(cfg.address, "localhost:8080");
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.report_interval, Duration::from_secs(10));
        assert_eq!(cfg.rate_limit, 4);
    }

    #[test]
    fn rate_limit_has_a_floor_of_one() {
        let flags = AgentFlags::parse_from(["pulse-agent", "-l", "0"]);
        assert_eq!(AgentConfig::resolve(flags).rate_limit, 1);
    }

    #[test]
    fn json_config_fills_gaps_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(
            &path,
            r#"{"address":"filed:9","poll_interval":"1s","report_interval":5}"#,
        )
        .unwrap();

        let flags = AgentFlags::parse_from([
            "pulse-agent",
            "-c",
            path.to_str().unwrap(),
            "-p",
            "3",
        ]);
        let cfg = AgentConfig::resolve(flags);
        assert_eq!(cfg.address, "filed:9");
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.report_interval, Duration::from_secs(5));
    }
}
