use pulse_common::types::{Metric, MetricKind};
use pulse_storage::{Prober, Store, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or malformed payload for the declared kind.
    #[error("bad metric value")]
    BadValue,
    /// Read of a metric that was never written.
    #[error("metric not found")]
    NotFound,
    /// The configured deadline fired before the store answered.
    #[error("storage deadline exceeded")]
    Timeout,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Thin typed layer over the store: validates payloads, applies the
/// configured deadline to every call, and re-reads after writes so callers
/// see the post-update state (counters echo the new absolute).
pub struct MetricsService {
    store: Arc<dyn Store>,
    timeout: Option<Duration>,
    prober: Option<Arc<dyn Prober>>,
}

impl MetricsService {
    pub fn new(
        store: Arc<dyn Store>,
        timeout: Option<Duration>,
        prober: Option<Arc<dyn Prober>>,
    ) -> Self {
        let timeout = timeout.filter(|d| !d.is_zero());
        Self {
            store,
            timeout,
            prober,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn bounded<T>(&self, fut: impl Future<Output = T>) -> Result<T, ServiceError> {
        match self.timeout {
            Some(d) => tokio::time::timeout(d, fut)
                .await
                .map_err(|_| ServiceError::Timeout),
            None => Ok(fut.await),
        }
    }

    /// Probes the backend; trivially healthy when no prober is injected.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        let prober = self.prober.clone();
        self.bounded(async move {
            match prober {
                Some(p) => p.probe().map_err(ServiceError::from),
                None => Ok(()),
            }
        })
        .await?
    }

    /// Returns copies of all gauges and counters.
    pub async fn list(&self) -> Result<(HashMap<String, f64>, HashMap<String, i64>), ServiceError> {
        self.bounded(async {
            let gauges = self.store.gauges().await;
            let counters = self.store.counters().await;
            (gauges, counters)
        })
        .await
    }

    /// Applies a single write and returns the record refreshed from the
    /// store.
    pub async fn update(&self, mut m: Metric) -> Result<Metric, ServiceError> {
        if m.id.is_empty() {
            return Err(ServiceError::BadValue);
        }
        self.bounded(async {
            match m.kind {
                MetricKind::Gauge => {
                    let Some(value) = m.value else {
                        return Err(ServiceError::BadValue);
                    };
                    self.store.set_gauge(&m.id, value).await?;
                    if let Some(fresh) = self.store.gauge(&m.id).await {
                        m.value = Some(fresh);
                    }
                }
                MetricKind::Counter => {
                    let Some(delta) = m.delta else {
                        return Err(ServiceError::BadValue);
                    };
                    self.store.increment_counter(&m.id, delta).await?;
                    if let Some(fresh) = self.store.counter(&m.id).await {
                        m.delta = Some(fresh);
                    }
                }
            }
            Ok(m)
        })
        .await?
    }

    /// Reads the current value of one metric.
    pub async fn get(&self, kind: MetricKind, id: &str) -> Result<Metric, ServiceError> {
        self.bounded(async {
            match kind {
                MetricKind::Gauge => match self.store.gauge(id).await {
                    Some(v) => Ok(Metric::gauge(id, v)),
                    None => Err(ServiceError::NotFound),
                },
                MetricKind::Counter => match self.store.counter(id).await {
                    Some(v) => Ok(Metric::counter(id, v)),
                    None => Err(ServiceError::NotFound),
                },
            }
        })
        .await?
    }

    /// Validates every record, then applies the batch atomically. Nothing is
    /// written when any record is invalid.
    pub async fn update_batch(&self, items: &[Metric]) -> Result<(), ServiceError> {
        for item in items {
            if item.id.is_empty() || !item.has_payload() {
                return Err(ServiceError::BadValue);
            }
        }
        self.bounded(self.store.apply_batch(items)).await??;
        Ok(())
    }
}
