//! Best-effort audit trail of successful writes.
//!
//! The publisher fans every event out to its registered sinks in detached
//! tasks; sink failures are logged and never affect the write path.

pub mod file;
pub mod http;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit: io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit: json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("audit: http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("audit: endpoint returned status {0}")]
    BadStatus(u16),
}

/// One event per successful write handler: when, which metric ids, and who.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: i64,
    pub metrics: Vec<String>,
    pub ip_address: String,
}

impl AuditEvent {
    pub fn now(metrics: Vec<String>, ip_address: String) -> Self {
        Self {
            ts: Utc::now().timestamp(),
            metrics,
            ip_address,
        }
    }
}

/// A destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError>;
    async fn close(&self) -> Result<(), AuditError>;
}

/// In-process pub-sub over the registered sinks.
#[derive(Default)]
pub struct AuditPublisher {
    sinks: RwLock<Vec<Arc<dyn AuditSink>>>,
}

impl AuditPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn AuditSink>) {
        self.sinks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Fans `event` out to every sink, one detached task per sink. Failures
    /// are logged; the caller never waits on delivery.
    pub fn notify_all(&self, event: AuditEvent) {
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for sink in sinks.iter() {
            let sink = Arc::clone(sink);
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.notify(&event).await {
                    tracing::error!(error = %e, "audit sink notification failed");
                }
            });
        }
    }

    /// Closes every registered sink.
    pub async fn close(&self) {
        let sinks: Vec<Arc<dyn AuditSink>> = {
            let guard = self
                .sinks
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clone()
        };
        for sink in sinks {
            if let Err(e) = sink.close().await {
                tracing::error!(error = %e, "audit sink close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        notified: AtomicUsize,
        closed: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AuditSink for CountingSink {
        async fn notify(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            self.notified.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuditError::BadStatus(500));
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), AuditError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_sink_even_on_failure() {
        let publisher = AuditPublisher::new();
        let ok = Arc::new(CountingSink {
            notified: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            fail: false,
        });
        let failing = Arc::new(CountingSink {
            notified: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            fail: true,
        });
        publisher.register(ok.clone());
        publisher.register(failing.clone());

        publisher.notify_all(AuditEvent::now(vec!["m".into()], "127.0.0.1".into()));

        // Delivery happens in detached tasks.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(ok.notified.load(Ordering::SeqCst), 1);
        assert_eq!(failing.notified.load(Ordering::SeqCst), 1);

        publisher.close().await;
        assert_eq!(ok.closed.load(Ordering::SeqCst), 1);
        assert_eq!(failing.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_json_shape() {
        let event = AuditEvent {
            ts: 1700000000,
            metrics: vec!["a".into(), "b".into()],
            ip_address: "10.0.0.1".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"ts":1700000000,"metrics":["a","b"],"ip_address":"10.0.0.1"}"#
        );
    }
}
