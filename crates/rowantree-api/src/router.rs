//! Axum router construction.
//!
//! Two routers share one [`AppState`]: the public user API and the
//! operator API. The server binds them to different ports.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;

/// Build the public user router.
///
/// CORS allows any origin so browser clients on other hosts can reach
/// the API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health/plain", get(handlers::health_plain))
        .route(
            "/v1/user/{user_id}",
            post(handlers::create_user).delete(handlers::delete_user),
        )
        .route(
            "/v1/user/{user_id}/active",
            get(handlers::get_active).post(handlers::set_active),
        )
        .route("/v1/user/{user_id}/stores", get(handlers::get_stores))
        .route(
            "/v1/user/{user_id}/income",
            get(handlers::get_income).post(handlers::set_income),
        )
        .route("/v1/user/{user_id}/features", get(handlers::get_features))
        .route(
            "/v1/user/{user_id}/features/active",
            get(handlers::get_active_features),
        )
        .route(
            "/v1/user/{user_id}/merchant",
            get(handlers::get_merchants).post(handlers::transform),
        )
        .route("/v1/user/{user_id}/population", get(handlers::get_population))
        .route("/v1/user/{user_id}/transport", post(handlers::transport))
        .route("/v1/user/{user_id}/state", get(handlers::get_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the operator router.
pub fn build_operator_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health/plain", get(handlers::health_plain))
        .route("/v1/world", get(operator::world_status))
        .route("/v1/world/queue", post(operator::process_queue))
        .route("/v1/world/queue/{user_id}", post(operator::enqueue_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
