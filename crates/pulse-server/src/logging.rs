use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::time::Instant;

/// Caller address as resolved by [`request_logging`], available to handlers
/// as an extension.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub String);

/// Resolves the client address: `X-Real-IP`, else the first token of
/// `X-Forwarded-For`, else the peer address with the port stripped.
fn client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !ip.is_empty() {
            return ip.trim().to_string();
        }
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// Request/response logging middleware. Sits inside the codec layers and
/// outside the HMAC guard, so integrity rejections show up with their
/// status.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ip = client_ip(req.headers(), req.extensions());
    req.extensions_mut().insert(ClientIp(ip.clone()));

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();

    let status = response.status();
    if status.is_server_error() {
        tracing::error!(%method, %path, %ip, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "request failed");
    } else {
        tracing::info!(%method, %path, %ip, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "request");
    }
    response
}
