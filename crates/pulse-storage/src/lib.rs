//! Metric storage layer.
//!
//! One contract ([`Store`]) shared by the in-memory backend
//! ([`memory::MemoryStore`]) and the SQLite backend ([`sql::SqlStore`]),
//! plus the durable snapshot manager ([`snapshot::SnapshotManager`]).

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod sql;


use async_trait::async_trait;
use pulse_common::types::Metric;
use std::collections::HashMap;

pub use error::StoreError;

/// Persistence backend for gauges and counters.
///
/// Implementations must be safe to share across request handlers
/// (`Send + Sync`). Single operations are linearizable within one process;
/// `apply_batch` is atomic with respect to concurrent readers and crash
/// recovery. Deadlines are applied by callers (`tokio::time::timeout`), and
/// a dropped call future aborts any in-flight retry.
#[async_trait]
pub trait Store: Send + Sync {
    /// Sets a gauge to `value`, replacing any previous value.
    async fn set_gauge(&self, id: &str, value: f64) -> Result<(), StoreError>;

    /// Adds `delta` to a counter, creating it at `delta` when absent.
    async fn increment_counter(&self, id: &str, delta: i64) -> Result<(), StoreError>;

    /// Returns the current gauge value, `None` when never written.
    async fn gauge(&self, id: &str) -> Option<f64>;

    /// Returns the current counter absolute, `None` when never written.
    async fn counter(&self, id: &str) -> Option<i64>;

    /// Returns an independent copy of all gauges.
    async fn gauges(&self) -> HashMap<String, f64>;

    /// Returns an independent copy of all counters.
    async fn counters(&self) -> HashMap<String, i64>;

    /// Applies a batch atomically: readers observe all of it or none of it.
    /// Callers validate the records first; entries without a payload are
    /// skipped here rather than failing the batch.
    async fn apply_batch(&self, metrics: &[Metric]) -> Result<(), StoreError>;

    /// Short backend self-description for logs ("memory", "sqlite").
    fn kind_tag(&self) -> &'static str;
}

/// Backend reachability probe behind the health endpoint. Implemented by
/// backends with a real connection to check; the memory store has none.
pub trait Prober: Send + Sync {
    fn probe(&self) -> Result<(), StoreError>;
}
