use crate::{Store, StoreError};
use async_trait::async_trait;
use pulse_common::types::{Metric, MetricKind};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Map-backed store guarded by a single readers-writer lock. Writes and
/// batches hold the write lock for the whole operation, so readers never
/// observe a half-applied batch.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Maps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_gauge(&self, id: &str, value: f64) -> Result<(), StoreError> {
        self.write().gauges.insert(id.to_string(), value);
        Ok(())
    }

    async fn increment_counter(&self, id: &str, delta: i64) -> Result<(), StoreError> {
        *self.write().counters.entry(id.to_string()).or_insert(0) += delta;
        Ok(())
    }

    async fn gauge(&self, id: &str) -> Option<f64> {
        self.read().gauges.get(id).copied()
    }

    async fn counter(&self, id: &str) -> Option<i64> {
        self.read().counters.get(id).copied()
    }

    async fn gauges(&self) -> HashMap<String, f64> {
        self.read().gauges.clone()
    }

    async fn counters(&self) -> HashMap<String, i64> {
        self.read().counters.clone()
    }

    async fn apply_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut maps = self.write();
        for m in metrics {
            match m.kind {
                MetricKind::Gauge => {
                    let Some(value) = m.value else {
                        tracing::warn!(id = %m.id, "gauge without value skipped in batch");
                        continue;
                    };
                    maps.gauges.insert(m.id.clone(), value);
                }
                MetricKind::Counter => {
                    let Some(delta) = m.delta else {
                        tracing::warn!(id = %m.id, "counter without delta skipped in batch");
                        continue;
                    };
                    *maps.counters.entry(m.id.clone()).or_insert(0) += delta;
                }
            }
        }
        Ok(())
    }

    fn kind_tag(&self) -> &'static str {
        "memory"
    }
}
