//! Transport codec layers, outermost first: RSA decrypt, gzip, then (around
//! the write/read POST routes) the HMAC integrity guard. The decrypt layer
//! must run before gunzip because the encrypted envelope is not gzip, and
//! the signature is always over the plain JSON, so the guard sits innermost.

use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pulse_common::gzip;
use pulse_common::rsacrypto::{self, ENCRYPTED_HEADER};
use pulse_common::sign;

/// Wire name of the signature header (headers are case-insensitive; the
/// agent sends it spelled `HashSHA256`).
static HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");

/// Upper bound on buffered request/response bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn bad_request(msg: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, msg).into_response()
}

/// Decrypts request bodies flagged with `X-Encrypted: true`, then strips the
/// header so downstream layers see a plain body.
pub async fn rsa_decrypt(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let encrypted = req
        .headers()
        .get(ENCRYPTED_HEADER)
        .and_then(|v| v.to_str().ok())
        == Some("true");
    if !encrypted {
        return next.run(req).await;
    }

    let Some(private_key) = state.private_key.clone() else {
        tracing::warn!("encrypted request received but no private key is configured");
        return bad_request("server not configured to decrypt encrypted requests");
    };

    let (mut parts, body) = req.into_parts();
    let Ok(sealed) = to_bytes(body, MAX_BODY_BYTES).await else {
        return bad_request("failed to read encrypted body");
    };
    let plain = match rsacrypto::decrypt_chunked(&sealed, &private_key) {
        Ok(plain) => plain,
        Err(e) => {
            tracing::warn!(error = %e, "request body decryption failed");
            return bad_request("failed to decrypt body");
        }
    };
    tracing::debug!(
        encrypted_bytes = sealed.len(),
        plain_bytes = plain.len(),
        "request body decrypted"
    );

    parts.headers.remove(ENCRYPTED_HEADER);
    parts.headers.remove(header::CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

/// Transparent gzip on both directions: decompresses request bodies sent
/// with `Content-Encoding: gzip`, and compresses JSON/HTML responses for
/// clients that advertised gzip support.
pub async fn gzip_codec(req: Request, next: Next) -> Response {
    let client_accepts_gzip = req
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let request_is_gzip = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let req = if request_is_gzip {
        let (mut parts, body) = req.into_parts();
        let Ok(packed) = to_bytes(body, MAX_BODY_BYTES).await else {
            return bad_request("failed to read request body");
        };
        let Ok(plain) = gzip::decompress(&packed) else {
            return bad_request("unable to read gzip data");
        };
        parts.headers.remove(header::CONTENT_ENCODING);
        parts.headers.remove(header::CONTENT_LENGTH);
        Request::from_parts(parts, Body::from(plain))
    } else {
        req
    };

    let response = next.run(req).await;
    if !client_accepts_gzip {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let compressible = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.starts_with("text/html"));

    let Ok(bytes) = to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "response buffering failed").into_response();
    };

    if !compressible || bytes.is_empty() {
        return Response::from_parts(parts, Body::from(bytes));
    }

    match gzip::compress(&bytes) {
        Ok(packed) => {
            parts.headers.insert(
                header::CONTENT_ENCODING,
                axum::http::HeaderValue::from_static("gzip"),
            );
            parts.headers.insert(
                header::VARY,
                axum::http::HeaderValue::from_static("Accept-Encoding"),
            );
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(packed))
        }
        Err(e) => {
            tracing::error!(error = %e, "response compression failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "compression error").into_response()
        }
    }
}

/// Integrity guard for the signed routes. With a key configured: a request
/// carrying `HashSHA256` is verified against the plain body (mismatch →
/// 400), and the response body is signed with the same key.
pub async fn hmac_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.hmac_key.as_deref() else {
        return next.run(req).await;
    };

    let received = req
        .headers()
        .get(&HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let req = if let Some(received) = received.filter(|h| !h.is_empty()) {
        let (parts, body) = req.into_parts();
        let Ok(bytes) = to_bytes(body, MAX_BODY_BYTES).await else {
            return (StatusCode::INTERNAL_SERVER_ERROR, "unable to read request body")
                .into_response();
        };
        if !sign::verify(&bytes, key, &received) {
            tracing::warn!("request signature mismatch");
            return bad_request("invalid hash");
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        req
    };

    let response = next.run(req).await;

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "response buffering failed").into_response();
    };
    if !bytes.is_empty() {
        if let Ok(value) = sign::sign(&bytes, key).parse() {
            parts.headers.insert(HASH_HEADER.clone(), value);
        }
    }
    Response::from_parts(parts, Body::from(bytes))
}
