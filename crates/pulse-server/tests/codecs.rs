mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{build_test_context, get_text, plain_context, send, TestContextOptions};
use pulse_common::{gzip, rsacrypto, sign};
use serde_json::json;

const KEY: &str = "test-signing-key";

fn signed_context() -> common::TestContext {
    build_test_context(TestContextOptions {
        hmac_key: Some(KEY.to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn valid_signature_is_accepted_and_response_is_signed() {
    let ctx = signed_context();
    let body = json!({"id": "t", "type": "gauge", "value": 1.0}).to_string();

    let req = Request::builder()
        .method("POST")
        .uri("/update")
        .header("Content-Type", "application/json")
        .header("HashSHA256", sign::sign(body.as_bytes(), KEY))
        .body(Body::from(body))
        .unwrap();
    let resp = tower::util::ServiceExt::oneshot(ctx.app.clone(), req)
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echoed_sig = resp
        .headers()
        .get("HashSHA256")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("response must carry a signature");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(sign::verify(&bytes, KEY, &echoed_sig));
}

#[tokio::test]
async fn tampered_body_is_rejected_and_store_untouched() {
    let ctx = signed_context();
    let body = json!({"id": "t", "type": "gauge", "value": 1.0}).to_string();
    // Signature over a truncated body: one flipped/missing byte must 400.
    let truncated = &body[..body.len() - 1];

    let req = Request::builder()
        .method("POST")
        .uri("/update")
        .header("Content-Type", "application/json")
        .header("HashSHA256", sign::sign(truncated.as_bytes(), KEY))
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&ctx.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_text(&ctx.app, "/value/gauge/t").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsigned_request_passes_when_key_is_configured() {
    // The guard only engages when the header is present.
    let ctx = signed_context();
    let (status, _) = common::post_json(
        &ctx.app,
        "/update",
        json!({"id": "t", "type": "gauge", "value": 2.0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn gzip_request_body_is_decompressed() {
    let ctx = plain_context();
    let body = json!([{"id": "z", "type": "counter", "delta": 4}]).to_string();
    let packed = gzip::compress(body.as_bytes()).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body(Body::from(packed))
        .unwrap();
    let (status, _) = send(&ctx.app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, value) = get_text(&ctx.app, "/value/counter/z").await;
    assert_eq!(value, "4");
}

#[tokio::test]
async fn corrupt_gzip_body_is_rejected() {
    let ctx = plain_context();
    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Encoding", "gzip")
        .body(Body::from("not gzip at all"))
        .unwrap();
    let (status, _) = send(&ctx.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_response_is_compressed_only_for_gzip_clients() {
    let ctx = plain_context();
    common::post_json(&ctx.app, "/update", json!({"id": "g", "type": "gauge", "value": 5.0})).await;

    let req = Request::builder()
        .method("POST")
        .uri("/value")
        .header("Accept-Encoding", "gzip")
        .body(Body::from(json!({"id": "g", "type": "gauge"}).to_string()))
        .unwrap();
    let resp = tower::util::ServiceExt::oneshot(ctx.app.clone(), req)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Content-Encoding").map(|v| v.as_bytes()),
        Some(b"gzip".as_ref())
    );
    assert_eq!(
        resp.headers().get("Vary").map(|v| v.as_bytes()),
        Some(b"Accept-Encoding".as_ref())
    );
    let packed = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let plain = gzip::decompress(&packed).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&plain).unwrap();
    assert_eq!(value["value"], 5.0);

    // Without Accept-Encoding the reply stays uncompressed.
    let req = Request::builder()
        .method("POST")
        .uri("/value")
        .body(Body::from(json!({"id": "g", "type": "gauge"}).to_string()))
        .unwrap();
    let resp = tower::util::ServiceExt::oneshot(ctx.app.clone(), req)
        .await
        .unwrap();
    assert!(resp.headers().get("Content-Encoding").is_none());
}

#[tokio::test]
async fn plain_text_responses_are_never_compressed() {
    let ctx = plain_context();
    common::post_json(&ctx.app, "/update", json!({"id": "c", "type": "counter", "delta": 1})).await;

    let req = Request::builder()
        .uri("/value/counter/c")
        .header("Accept-Encoding", "gzip")
        .body(Body::empty())
        .unwrap();
    let resp = tower::util::ServiceExt::oneshot(ctx.app.clone(), req)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("Content-Encoding").is_none());
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"1");
}

#[tokio::test]
async fn encrypted_gzip_signed_request_end_to_end() {
    let mut rng = rand::thread_rng();
    let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public_key = rsa::RsaPublicKey::from(&private_key);

    let ctx = build_test_context(TestContextOptions {
        hmac_key: Some(KEY.to_string()),
        private_key: Some(private_key),
        ..Default::default()
    });

    // Agent-side assembly: sign plain JSON, gzip it, then encrypt.
    let body = json!([{"id": "sealed", "type": "gauge", "value": 9.5}]).to_string();
    let signature = sign::sign(body.as_bytes(), KEY);
    let packed = gzip::compress(body.as_bytes()).unwrap();
    let sealed = rsacrypto::encrypt_chunked(&packed, &public_key).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .header("X-Encrypted", "true")
        .header("HashSHA256", signature)
        .body(Body::from(sealed))
        .unwrap();
    let (status, _) = send(&ctx.app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, value) = get_text(&ctx.app, "/value/gauge/sealed").await;
    assert_eq!(value, "9.5");
}

#[tokio::test]
async fn encrypted_request_without_key_is_rejected() {
    let ctx = plain_context();
    let req = Request::builder()
        .method("POST")
        .uri("/update")
        .header("X-Encrypted", "true")
        .body(Body::from(vec![1u8, 2, 3]))
        .unwrap();
    let (status, _) = send(&ctx.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn garbage_ciphertext_is_rejected() {
    let mut rng = rand::thread_rng();
    let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let ctx = build_test_context(TestContextOptions {
        private_key: Some(private_key),
        ..Default::default()
    });

    let req = Request::builder()
        .method("POST")
        .uri("/update")
        .header("X-Encrypted", "true")
        .body(Body::from(vec![0u8; 64]))
        .unwrap();
    let (status, _) = send(&ctx.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
