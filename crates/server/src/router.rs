//! HTTP router construction.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

pub fn build_router() -> Router {
    Router::new().route("/ping", get(ping))
}

async fn ping() -> (StatusCode, &'static str) {
    (StatusCode::OK, "pong")
}
