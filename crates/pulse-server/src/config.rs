use clap::Parser;
use pulse_common::configio::{non_empty, parse_duration, IntervalValue};
use serde::Deserialize;
use std::time::Duration;

/// Command-line flags. Every value is optional so the layered resolution
/// (flags > environment > JSON file > defaults) can tell "set" from "unset".
#[derive(Debug, Default, Parser)]
#[command(name = "pulse-server", about = "Telemetry ingestion server")]
pub struct ServerFlags {
    /// Path to JSON configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    /// HTTP server endpoint address
    #[arg(short = 'a', long)]
    pub address: Option<String>,
    /// Store interval in seconds (0 = flush after every write)
    #[arg(short = 'i', long)]
    pub store_interval: Option<u64>,
    /// Snapshot file path (empty string disables snapshots)
    #[arg(short = 'f', long)]
    pub file_storage_path: Option<String>,
    /// Restore metrics from the snapshot file at startup
    #[arg(short = 'r', long)]
    pub restore: bool,
    /// SQLite database path; unset selects the in-memory store
    #[arg(short = 'd', long)]
    pub database_dsn: Option<String>,
    /// Key for request/response signing
    #[arg(short = 'k', long)]
    pub key: Option<String>,
    /// Path to the RSA private key for request decryption
    #[arg(long = "crypto-key")]
    pub crypto_key: Option<String>,
    /// Audit log file path
    #[arg(long = "audit-file")]
    pub audit_file: Option<String>,
    /// Audit log URL endpoint
    #[arg(long = "audit-url")]
    pub audit_url: Option<String>,
}

/// JSON configuration file shape.
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub restore: Option<bool>,
    #[serde(default)]
    pub store_interval: Option<IntervalValue>,
    #[serde(default)]
    pub store_file: Option<String>,
    #[serde(default)]
    pub database_dsn: Option<String>,
    #[serde(default)]
    pub crypto_key: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub store_interval: Duration,
    pub file_storage_path: Option<String>,
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub hmac_key: Option<String>,
    pub crypto_key_path: Option<String>,
    pub audit_file: Option<String>,
    pub audit_url: Option<String>,
}

impl ServerConfig {
    pub fn load() -> Self {
        Self::resolve(ServerFlags::parse())
    }

    pub fn resolve(flags: ServerFlags) -> Self {
        let file = load_file_config(flags.config.clone().or_else(|| env_var("CONFIG")));

        let address = flags
            .address
            .or_else(|| env_var("ADDRESS"))
            .or_else(|| file.address.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "localhost:8080".to_string());

        let store_interval = flags
            .store_interval
            .map(Duration::from_secs)
            .or_else(|| env_var("STORE_INTERVAL").and_then(|v| parse_duration(&v)))
            .or_else(|| file.store_interval.as_ref().and_then(IntervalValue::as_duration))
            .unwrap_or(Duration::from_secs(300));

        let file_storage_path = flags
            .file_storage_path
            .or_else(|| env_var("FILE_STORAGE_PATH"))
            .or_else(|| file.store_file.clone())
            .map_or_else(|| Some("/tmp/pulse-metrics.json".to_string()), |s| non_empty(Some(s)));

        let restore = if flags.restore {
            true
        } else {
            env_var("RESTORE")
                .and_then(|v| v.parse::<bool>().ok())
                .or(file.restore)
                .unwrap_or(false)
        };

        let database_dsn = non_empty(
            flags
                .database_dsn
                .or_else(|| env_var("DATABASE_DSN"))
                .or_else(|| file.database_dsn.clone()),
        );

        let hmac_key = non_empty(flags.key.or_else(|| env_var("KEY")));

        let crypto_key_path = non_empty(
            flags
                .crypto_key
                .or_else(|| env_var("CRYPTO_KEY"))
                .or_else(|| file.crypto_key.clone()),
        );

        let audit_file = non_empty(flags.audit_file.or_else(|| env_var("AUDIT_FILE")));
        let audit_url = non_empty(flags.audit_url.or_else(|| env_var("AUDIT_URL")));

        Self {
            address,
            store_interval,
            file_storage_path,
            restore,
            database_dsn,
            hmac_key,
            crypto_key_path,
            audit_file,
            audit_url,
        }
    }
}

fn load_file_config(path: Option<String>) -> ServerFileConfig {
    let Some(path) = non_empty(path) else {
        return ServerFileConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to parse JSON config, ignoring");
                ServerFileConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "failed to read JSON config, ignoring");
            ServerFileConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let cfg = ServerConfig::resolve(ServerFlags::default());
        assert_eq!(cfg.address, "localhost:8080");
        assert_eq!(cfg.store_interval, Duration::from_secs(300));
        assert_eq!(
            cfg.file_storage_path.as_deref(),
            Some("/tmp/pulse-metrics.json")
        );
        assert!(!cfg.restore);
        assert!(cfg.database_dsn.is_none());
    }

    #[test]
    fn flags_win() {
        let flags = ServerFlags::parse_from([
            "pulse-server",
            "-a",
            "0.0.0.0:9999",
            "-i",
            "0",
            "-r",
            "-k",
            "secret",
        ]);
        let cfg = ServerConfig::resolve(flags);
        assert_eq!(cfg.address, "0.0.0.0:9999");
        assert!(cfg.store_interval.is_zero());
        assert!(cfg.restore);
        assert_eq!(cfg.hmac_key.as_deref(), Some("secret"));
    }

    #[test]
    fn empty_snapshot_path_disables_snapshots() {
        let flags = ServerFlags::parse_from(["pulse-server", "-f", ""]);
        let cfg = ServerConfig::resolve(flags);
        assert!(cfg.file_storage_path.is_none());
    }

    #[test]
    fn json_config_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"address":"127.0.0.1:7070","store_interval":"30s","restore":true}"#,
        )
        .unwrap();

        let flags = ServerFlags::parse_from([
            "pulse-server",
            "-c",
            path.to_str().unwrap(),
            "-a",
            "flagged:1",
        ]);
        let cfg = ServerConfig::resolve(flags);
        // The flag beats the file, the file beats the default.
        assert_eq!(cfg.address, "flagged:1");
        assert_eq!(cfg.store_interval, Duration::from_secs(30));
        assert!(cfg.restore);
    }
}
