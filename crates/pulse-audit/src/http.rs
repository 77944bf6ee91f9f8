use crate::{AuditError, AuditEvent, AuditSink};
use async_trait::async_trait;
use std::time::Duration;

/// Posts each event as JSON to a remote collector. Any 2xx reply counts as
/// delivered; everything else is an error for the publisher to log.
pub struct HttpSink {
    url: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Result<Self, AuditError> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?,
        })
    }
}

#[async_trait]
impl AuditSink for HttpSink {
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let resp = self.client.post(&self.url).json(event).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AuditError::BadStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn spawn_sink_server(
        status: axum::http::StatusCode,
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let app = Router::new().route(
            "/audit",
            post(move || {
                let hits = hits_clone.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    status
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{addr}/audit"), hits)
    }

    #[tokio::test]
    async fn delivers_on_2xx() {
        let (url, hits) = spawn_sink_server(axum::http::StatusCode::OK).await;
        let sink = HttpSink::new(url).unwrap();
        sink.notify(&AuditEvent::now(vec!["m".into()], "ip".into()))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_2xx_is_an_error() {
        let (url, _hits) = spawn_sink_server(axum::http::StatusCode::INTERNAL_SERVER_ERROR).await;
        let sink = HttpSink::new(url).unwrap();
        let res = sink
            .notify(&AuditEvent::now(vec!["m".into()], "ip".into()))
            .await;
        assert!(matches!(res, Err(AuditError::BadStatus(500))));
    }
}
