use pulse_common::gzip;
use pulse_common::retry;
use pulse_common::rsacrypto::{self, CryptoError, ENCRYPTED_HEADER};
use pulse_common::sign::{self, HASH_HEADER};
use pulse_common::types::Metric;
use reqwest::header;
use rsa::RsaPublicKey;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("http status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compress(#[from] std::io::Error),
    #[error("encryption error: {0}")]
    Encrypt(#[from] CryptoError),
}

impl SendError {
    /// The retry set: transport failures (timeouts, refused connections)
    /// and the retryable status codes. Local encode failures are terminal,
    /// and cancellation never reaches here: a fired deadline drops the
    /// in-flight future instead of surfacing as an error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Status(code) => matches!(*code, 408 | 425 | 429 | 500 | 502 | 503 | 504),
            SendError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Assembles and delivers signed, gzipped (optionally RSA-encrypted) JSON
/// posts. The signature always covers the uncompressed JSON.
pub struct MetricsSender {
    base_url: String,
    client: reqwest::Client,
    hmac_key: Option<String>,
    public_key: Option<RsaPublicKey>,
}

impl MetricsSender {
    pub fn new(
        address: &str,
        hmac_key: Option<String>,
        public_key: Option<RsaPublicKey>,
    ) -> Result<Self, SendError> {
        let address = address.trim();
        let base_url = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        Ok(Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?,
            hmac_key,
            public_key,
        })
    }

    async fn post_once(&self, path: &str, json: &[u8]) -> Result<(), SendError> {
        let mut body = gzip::compress(json)?;

        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "gzip");

        if let Some(key) = &self.hmac_key {
            req = req.header(HASH_HEADER, sign::sign(json, key));
        }
        if let Some(public_key) = &self.public_key {
            body = rsacrypto::encrypt_chunked(&body, public_key)?;
            req = req.header(ENCRYPTED_HEADER, "true");
        }

        let resp = req.body(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SendError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Posts the batch to `/updates/`, retrying on the shared ladder. When
    /// the batch endpoint stays down, falls back to per-record posts so one
    /// bad record cannot poison the whole batch; the first single-send
    /// failure is reported after all records were attempted.
    pub async fn send_batch(&self, batch: &[Metric]) -> Result<(), SendError> {
        if batch.is_empty() {
            return Ok(());
        }

        let json = serde_json::to_vec(batch)?;
        let json_ref: &[u8] = &json;
        let batch_err = match retry::with_backoff(
            move || self.post_once("/updates/", json_ref),
            SendError::is_retryable,
        )
        .await
        {
            Ok(()) => {
                tracing::debug!(count = batch.len(), "batch delivered");
                return Ok(());
            }
            Err(e) => e,
        };
        tracing::warn!(error = %batch_err, "batch endpoint failed, falling back to single updates");

        let mut first_err = None;
        for metric in batch {
            let json = serde_json::to_vec(metric)?;
            let json_ref: &[u8] = &json;
            if let Err(e) = retry::with_backoff(
                move || self.post_once("/update", json_ref),
                SendError::is_retryable,
            )
            .await
            {
                tracing::warn!(id = %metric.id, error = %e, "single update failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
