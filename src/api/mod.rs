//! HTTP API for social-scheduler.
//!
//! Mounts all endpoint groups under /v1/:
//! - /v1/status    health check
//! - /v1/providers registered providers
//! - /v1/accounts  connected accounts
//! - /v1/posts     post queue and publish-now

pub mod routes;

use crate::SharedState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/v1", routes::v1_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
