use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all REST endpoints.
pub fn build_router(state: AppState, permissive_cors: bool) -> Router {
    let router = Router::new()
        .route("/api/health", get(handler::health_handler))
        .route("/api/kv", post(handler::put_value))
        .route("/api/kv/:key", get(handler::get_value))
        .route(
            "/api/kv/private",
            post(handler::put_private_message).get(handler::get_value_named_private),
        )
        .route(
            "/api/kv/private/verify",
            post(handler::verify_private_message).get(handler::get_private_message_named_verify),
        )
        .route("/api/kv/private/:collection", get(handler::get_private_message))
        .fallback(handler::not_found_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
