use anyhow::{Context, Result};
use pulse_audit::file::FileSink;
use pulse_audit::http::HttpSink;
use pulse_audit::AuditPublisher;
use pulse_server::config::ServerConfig;
use pulse_server::service::MetricsService;
use pulse_server::state::AppState;
use pulse_server::app;
use pulse_storage::memory::MemoryStore;
use pulse_storage::snapshot::SnapshotManager;
use pulse_storage::sql::SqlStore;
use pulse_storage::{Prober, Store};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse=info".parse()?))
        .init();

    let cfg = ServerConfig::load();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %cfg.address,
        store_interval_secs = cfg.store_interval.as_secs(),
        snapshot_path = cfg.file_storage_path.as_deref().unwrap_or("<disabled>"),
        restore = cfg.restore,
        database = cfg.database_dsn.as_deref().unwrap_or("<memory>"),
        signing = cfg.hmac_key.is_some(),
        decryption = cfg.crypto_key_path.is_some(),
        "pulse-server starting"
    );

    // Startup failures (bad key file, bind failure) exit non-zero.
    let private_key = match &cfg.crypto_key_path {
        Some(path) => {
            let key = pulse_common::rsacrypto::load_private_key(Path::new(path))
                .with_context(|| format!("load RSA private key from {path}"))?;
            tracing::info!(path = %path, "loaded RSA private key");
            Some(Arc::new(key))
        }
        None => None,
    };

    // SQLite when a database path is configured (falling back to memory on
    // open failure), the in-memory store otherwise.
    let (store, prober): (Arc<dyn Store>, Option<Arc<dyn Prober>>) = match &cfg.database_dsn {
        Some(dsn) => match SqlStore::open(Path::new(dsn)) {
            Ok(sql) => {
                let sql = Arc::new(sql);
                (sql.clone(), Some(sql))
            }
            Err(e) => {
                tracing::warn!(dsn = %dsn, error = %e, "sqlite open failed, falling back to the in-memory store");
                (Arc::new(MemoryStore::new()), None)
            }
        },
        None => (Arc::new(MemoryStore::new()), None),
    };
    tracing::info!(backend = store.kind_tag(), "storage ready");

    let snapshot = Arc::new(SnapshotManager::new(
        cfg.file_storage_path.clone().map(PathBuf::from),
        cfg.store_interval,
    ));

    if cfg.restore && snapshot.enabled() {
        match snapshot.restore(store.as_ref()).await {
            Ok(()) => tracing::info!("snapshot restored"),
            Err(e) => tracing::warn!(error = %e, "snapshot restore failed, starting empty"),
        }
    }

    let snapshot_task = if snapshot.enabled() && !cfg.store_interval.is_zero() {
        Some(tokio::spawn(snapshot.clone().run(store.clone())))
    } else {
        if snapshot.is_sync() {
            // Sync mode starts from a fresh snapshot of the restored state.
            snapshot.sync_save(store.as_ref()).await;
        }
        None
    };

    let audit = Arc::new(AuditPublisher::new());
    if let Some(path) = &cfg.audit_file {
        let sink = FileSink::open(Path::new(path))
            .with_context(|| format!("open audit file {path}"))?;
        audit.register(Arc::new(sink));
        tracing::info!(path = %path, "file audit sink registered");
    }
    if let Some(url) = &cfg.audit_url {
        audit.register(Arc::new(HttpSink::new(url.clone()).context("build audit HTTP client")?));
        tracing::info!(url = %url, "http audit sink registered");
    }

    let timeout = (!cfg.store_interval.is_zero()).then_some(cfg.store_interval);
    let service = Arc::new(MetricsService::new(store.clone(), timeout, prober));

    let state = AppState {
        service,
        store: store.clone(),
        snapshot: snapshot.clone(),
        audit: audit.clone(),
        hmac_key: cfg.hmac_key.clone(),
        private_key,
    };
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.address)
        .await
        .with_context(|| format!("bind {}", cfg.address))?;
    tracing::info!(address = %cfg.address, "server started");

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            drain_rx.await.ok();
        })
        .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight requests");

    let _ = drain_tx.send(());
    match tokio::time::timeout(Duration::from_secs(10), server).await {
        Ok(joined) => joined.context("server task")??,
        Err(_) => tracing::warn!("drain deadline exceeded, aborting in-flight requests"),
    }

    if let Some(task) = snapshot_task {
        snapshot.close(store.as_ref()).await;
        task.await.ok();
    } else {
        snapshot.close(store.as_ref()).await;
    }
    audit.close().await;
    tracing::info!("server stopped");

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
