use crate::state::AppState;
use crate::{handlers, logging, middleware};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

/// Builds the full router with the codec chain. Layer order matters: the
/// decrypt layer is outermost (the encrypted envelope is not gzip), gunzip
/// runs before signature checks (the signature covers plain JSON), and the
/// logger wraps the HMAC guard so its rejections are logged.
pub fn build_router(state: AppState) -> Router {
    let signed = Router::new()
        .route("/update", post(handlers::update_json))
        .route("/update/", post(handlers::update_json))
        .route(
            "/update/{type}/{name}/{value}",
            post(handlers::update_path),
        )
        .route("/updates", post(handlers::updates_json))
        .route("/updates/", post(handlers::updates_json))
        .route("/value", post(handlers::value_json))
        .route("/value/", post(handlers::value_json))
        .route_layer(from_fn_with_state(state.clone(), middleware::hmac_guard));

    Router::new()
        .route("/", get(handlers::home))
        .route("/ping", get(handlers::ping))
        .route("/value/{type}/{name}", get(handlers::get_path))
        .merge(signed)
        .with_state(state.clone())
        .layer(from_fn(logging::request_logging))
        .layer(from_fn(middleware::gzip_codec))
        .layer(from_fn_with_state(state, middleware::rsa_decrypt))
}
