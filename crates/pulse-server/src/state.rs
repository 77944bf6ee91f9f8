use crate::service::MetricsService;
use pulse_audit::AuditPublisher;
use pulse_storage::snapshot::SnapshotManager;
use pulse_storage::Store;
use rsa::RsaPrivateKey;
use std::sync::Arc;

/// Shared handles threaded through every request handler. Handlers borrow;
/// the composition root owns construction and teardown.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetricsService>,
    pub store: Arc<dyn Store>,
    pub snapshot: Arc<SnapshotManager>,
    pub audit: Arc<AuditPublisher>,
    pub hmac_key: Option<String>,
    pub private_key: Option<Arc<RsaPrivateKey>>,
}
