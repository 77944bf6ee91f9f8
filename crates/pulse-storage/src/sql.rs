use crate::{Store, StoreError};
use async_trait::async_trait;
use pulse_common::retry;
use pulse_common::types::{Metric, MetricKind};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gauges (
    id    TEXT PRIMARY KEY,
    value REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS counters (
    id    TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const UPSERT_GAUGE: &str = "INSERT INTO gauges (id, value) VALUES (?1, ?2)
     ON CONFLICT(id) DO UPDATE SET value = excluded.value";

const UPSERT_COUNTER: &str = "INSERT INTO counters (id, value) VALUES (?1, ?2)
     ON CONFLICT(id) DO UPDATE SET value = counters.value + excluded.value";

/// SQLite-backed store. Gauge writes are plain upserts, counter writes are
/// additive upserts, and batches run inside one transaction. Each operation
/// is retried on the shared backoff ladder while the error is transient
/// (busy/locked); constraint violations and other errors are terminal.
pub struct SqlStore {
    conn: Mutex<Connection>,
}

impl SqlStore {
    /// Opens (creating if needed) the database at `path` and installs the
    /// per-kind tables.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=1000;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory SQLite database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Backend reachability probe for `/ping`.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    async fn with_retry<T>(
        &self,
        op: impl Fn(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let store = self;
        let op = &op;
        retry::with_backoff(
            move || async move { op(&store.lock()) },
            StoreError::is_transient,
        )
        .await
    }

    fn apply_batch_tx(conn: &Connection, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut gauges: Vec<(&str, f64)> = Vec::new();
        let mut counters: Vec<(&str, i64)> = Vec::new();
        for m in metrics {
            match m.kind {
                MetricKind::Gauge => {
                    if let Some(v) = m.value {
                        gauges.push((&m.id, v));
                    }
                }
                MetricKind::Counter => {
                    if let Some(d) = m.delta {
                        counters.push((&m.id, d));
                    }
                }
            }
        }

        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_GAUGE)?;
            for (id, value) in &gauges {
                stmt.execute(rusqlite::params![id, value])?;
            }
            let mut stmt = tx.prepare_cached(UPSERT_COUNTER)?;
            for (id, delta) in &counters {
                stmt.execute(rusqlite::params![id, delta])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn set_gauge(&self, id: &str, value: f64) -> Result<(), StoreError> {
        self.with_retry(|conn| {
            conn.execute(UPSERT_GAUGE, rusqlite::params![id, value])?;
            Ok(())
        })
        .await
    }

    async fn increment_counter(&self, id: &str, delta: i64) -> Result<(), StoreError> {
        self.with_retry(|conn| {
            conn.execute(UPSERT_COUNTER, rusqlite::params![id, delta])?;
            Ok(())
        })
        .await
    }

    async fn gauge(&self, id: &str) -> Option<f64> {
        let conn = self.lock();
        match conn.query_row("SELECT value FROM gauges WHERE id = ?1", [id], |row| {
            row.get::<_, f64>(0)
        }) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                tracing::error!(id = %id, error = %e, "gauge read failed");
                None
            }
        }
    }

    async fn counter(&self, id: &str) -> Option<i64> {
        let conn = self.lock();
        match conn.query_row("SELECT value FROM counters WHERE id = ?1", [id], |row| {
            row.get::<_, i64>(0)
        }) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                tracing::error!(id = %id, error = %e, "counter read failed");
                None
            }
        }
    }

    async fn gauges(&self) -> HashMap<String, f64> {
        let conn = self.lock();
        let mut out = HashMap::new();
        let result: Result<(), rusqlite::Error> = (|| {
            let mut stmt = conn.prepare_cached("SELECT id, value FROM gauges")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (id, value) = row?;
                out.insert(id, value);
            }
            Ok(())
        })();
        if let Err(e) = result {
            tracing::error!(error = %e, "gauge listing failed");
        }
        out
    }

    async fn counters(&self) -> HashMap<String, i64> {
        let conn = self.lock();
        let mut out = HashMap::new();
        let result: Result<(), rusqlite::Error> = (|| {
            let mut stmt = conn.prepare_cached("SELECT id, value FROM counters")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (id, value) = row?;
                out.insert(id, value);
            }
            Ok(())
        })();
        if let Err(e) = result {
            tracing::error!(error = %e, "counter listing failed");
        }
        out
    }

    async fn apply_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        self.with_retry(|conn| Self::apply_batch_tx(conn, metrics)).await
    }

    fn kind_tag(&self) -> &'static str {
        "sqlite"
    }
}

impl crate::Prober for SqlStore {
    fn probe(&self) -> Result<(), StoreError> {
        self.ping()
    }
}
