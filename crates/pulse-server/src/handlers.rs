use crate::logging::ClientIp;
use crate::service::ServiceError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use pulse_audit::AuditEvent;
use pulse_common::types::{format_gauge, Metric, MetricKind};
use std::collections::BTreeMap;

fn error_response(e: ServiceError, context: &'static str) -> Response {
    match e {
        ServiceError::BadValue => {
            tracing::warn!(context, "bad metric in request");
            (StatusCode::BAD_REQUEST, "Bad request").into_response()
        }
        ServiceError::NotFound => {
            tracing::warn!(context, "metric not found");
            (StatusCode::NOT_FOUND, "Metric not found").into_response()
        }
        ServiceError::Timeout | ServiceError::Store(_) => {
            tracing::error!(context, error = %e, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Publishes the audit event and flushes the snapshot in synchronous mode.
/// Called only after the service reported success.
async fn after_write(state: &AppState, ids: Vec<String>, ip: &ClientIp) {
    state.snapshot.sync_save(state.store.as_ref()).await;
    state.audit.notify_all(AuditEvent::now(ids, ip.0.clone()));
}

/// GET /: HTML listing of everything stored.
pub async fn home(State(state): State<AppState>) -> Response {
    let (gauges, counters) = match state.service.list().await {
        Ok(pair) => pair,
        Err(e) => return error_response(e, "home"),
    };

    // Sort for a stable page.
    let gauges: BTreeMap<_, _> = gauges.into_iter().collect();
    let counters: BTreeMap<_, _> = counters.into_iter().collect();

    let mut page = String::with_capacity(64 + (gauges.len() + counters.len()) * 32);
    page.push_str("<h4>Gauges</h4>");
    for (name, value) in &gauges {
        page.push_str(name);
        page.push_str(": ");
        page.push_str(&format_gauge(*value));
        page.push_str("</br>");
    }
    page.push_str("<h4>Counters</h4>");
    for (name, value) in &counters {
        page.push_str(name);
        page.push_str(": ");
        page.push_str(&value.to_string());
        page.push_str("</br>");
    }

    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        page,
    )
        .into_response()
}

/// GET /ping: backend reachability probe.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.service.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "ping failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /update/{type}/{name}/{value}: write via URL tokens.
pub async fn update_path(
    State(state): State<AppState>,
    Extension(ip): Extension<ClientIp>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        tracing::warn!(kind = %kind, "invalid metric type in path");
        return (StatusCode::BAD_REQUEST, "Invalid metric type").into_response();
    };

    let metric = match kind {
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(v) => Metric::gauge(name, v),
            Err(_) => {
                tracing::warn!(value = %value, "bad gauge value in path");
                return (StatusCode::BAD_REQUEST, "Bad request").into_response();
            }
        },
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(d) => Metric::counter(name, d),
            Err(_) => {
                tracing::warn!(value = %value, "bad counter delta in path");
                return (StatusCode::BAD_REQUEST, "Bad request").into_response();
            }
        },
    };

    let id = metric.id.clone();
    match state.service.update(metric).await {
        Ok(_) => {
            after_write(&state, vec![id], &ip).await;
            StatusCode::OK.into_response()
        }
        Err(e) => error_response(e, "update_path"),
    }
}

/// GET /value/{type}/{name}: read as a plain-text scalar.
pub async fn get_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        tracing::warn!(kind = %kind, "invalid metric type in path");
        return (StatusCode::BAD_REQUEST, "Invalid metric type").into_response();
    };

    match state.service.get(kind, &name).await {
        Ok(m) => {
            let body = match m.kind {
                MetricKind::Gauge => format_gauge(m.value.unwrap_or_default()),
                MetricKind::Counter => m.delta.unwrap_or_default().to_string(),
            };
            ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
        }
        Err(e) => error_response(e, "get_path"),
    }
}

/// POST /update: JSON write, echoes the post-update record.
pub async fn update_json(
    State(state): State<AppState>,
    Extension(ip): Extension<ClientIp>,
    body: Bytes,
) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "update body decode error");
            return (StatusCode::BAD_REQUEST, "Bad request").into_response();
        }
    };

    match state.service.update(metric).await {
        Ok(fresh) => {
            after_write(&state, vec![fresh.id.clone()], &ip).await;
            Json(fresh).into_response()
        }
        Err(e) => error_response(e, "update_json"),
    }
}

/// POST /value: JSON read of one metric.
pub async fn value_json(State(state): State<AppState>, body: Bytes) -> Response {
    let req: Metric = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "value body decode error");
            return (StatusCode::BAD_REQUEST, "Bad request").into_response();
        }
    };

    match state.service.get(req.kind, &req.id).await {
        Ok(m) => Json(m).into_response(),
        Err(e) => error_response(e, "value_json"),
    }
}

/// POST /updates: atomic JSON batch write.
pub async fn updates_json(
    State(state): State<AppState>,
    Extension(ip): Extension<ClientIp>,
    body: Bytes,
) -> Response {
    let batch: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "batch body decode error");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match state.service.update_batch(&batch).await {
        Ok(()) => {
            let ids = batch.into_iter().map(|m| m.id).collect();
            after_write(&state, ids, &ip).await;
            StatusCode::OK.into_response()
        }
        Err(e) => error_response(e, "updates_json"),
    }
}
