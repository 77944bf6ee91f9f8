//! Shared building blocks of the pulse telemetry pipeline: the metric value
//! model, the transport codecs (HMAC signing, gzip, chunked RSA), and the
//! retry schedule used by both the agent and the SQL storage backend.

pub mod configio;
pub mod gzip;
pub mod retry;
pub mod rsacrypto;
pub mod sign;
pub mod types;
