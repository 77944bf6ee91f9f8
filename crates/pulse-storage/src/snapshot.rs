use crate::{Store, StoreError};
use pulse_common::types::{Metric, MetricKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Durable snapshotting of the complete store state.
///
/// Three modes, driven by the configured interval:
/// * interval > 0: [`run`](Self::run) writes a full snapshot on every tick,
///   and [`close`](Self::close) writes the final one;
/// * interval == 0 with a path: synchronous mode, callers invoke
///   [`sync_save`](Self::sync_save) after each successful write;
/// * no path: disabled, everything is a no-op.
///
/// The snapshot file is a JSON array of metric records with absolute values:
/// counters carry their current total in `delta`, gauges their value.
pub struct SnapshotManager {
    path: Option<PathBuf>,
    interval: Duration,
    done: CancellationToken,
    closed: AtomicBool,
}

impl SnapshotManager {
    pub fn new(path: Option<PathBuf>, interval: Duration) -> Self {
        Self {
            path,
            interval,
            done: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Synchronous mode: flush after every successful write.
    pub fn is_sync(&self) -> bool {
        self.path.is_some() && self.interval.is_zero()
    }

    /// Writes the full store state to the snapshot file.
    pub async fn save(&self, store: &dyn Store) -> Result<(), StoreError> {
        let path = self.path.as_ref().ok_or(StoreError::NoSnapshotPath)?;

        let mut records: Vec<Metric> = Vec::new();
        for (id, value) in store.counters().await {
            records.push(Metric::counter(id, value));
        }
        for (id, value) in store.gauges().await {
            records.push(Metric::gauge(id, value));
        }

        let data = serde_json::to_vec(&records)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Loads the snapshot file and replays it into the store. Gauges are
    /// assigned; counters are driven to the persisted absolute by
    /// incrementing with `persisted - current`, so the post-restore value
    /// matches the file even over non-empty in-memory state.
    pub async fn restore(&self, store: &dyn Store) -> Result<(), StoreError> {
        let path = self.path.as_ref().ok_or(StoreError::NoSnapshotPath)?;
        let data = std::fs::read(path)?;
        let records: Vec<Metric> = serde_json::from_slice(&data)?;

        for m in &records {
            match m.kind {
                MetricKind::Gauge => {
                    if let Some(value) = m.value {
                        store.set_gauge(&m.id, value).await?;
                    }
                }
                MetricKind::Counter => {
                    let Some(want) = m.delta else { continue };
                    let current = store.counter(&m.id).await.unwrap_or(0);
                    let inc = want - current;
                    if inc != 0 {
                        store.increment_counter(&m.id, inc).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Periodic persistence loop; returns when [`close`](Self::close) fires.
    /// Save errors are logged and swallowed, the in-memory state stays
    /// authoritative.
    pub async fn run(self: Arc<Self>, store: Arc<dyn Store>) {
        if self.path.is_none() || self.interval.is_zero() {
            return;
        }
        let mut tick = tokio::time::interval(self.interval);
        tick.tick().await; // the first tick fires immediately
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.save(store.as_ref()).await {
                        tracing::error!(error = %e, "periodic snapshot failed");
                    }
                }
                _ = self.done.cancelled() => return,
            }
        }
    }

    /// Flush for synchronous mode; no-op otherwise. Errors are logged and
    /// swallowed.
    pub async fn sync_save(&self, store: &dyn Store) {
        if !self.is_sync() {
            return;
        }
        if let Err(e) = self.save(store).await {
            tracing::error!(error = %e, "synchronous snapshot failed");
        }
    }

    /// Stops the periodic loop and writes the final snapshot. Idempotent:
    /// only the first call does anything.
    pub async fn close(&self, store: &dyn Store) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.done.cancel();
        if self.enabled() {
            if let Err(e) = self.save(store).await {
                tracing::error!(error = %e, "final snapshot failed");
            }
        }
    }
}
