//! Router assembly for the fnterm HTTP API.
//!
//! [`build_router`] wires the handlers to their routes. The function and
//! database APIs sit behind the session gate; the auth routes do not.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::session::{attach_context, require_session};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api", any(handlers::api::api_root))
        .route("/api/", any(handlers::api::api_root))
        .route("/api/{*command}", any(handlers::api::api_command))
        .route("/database", any(handlers::database::database_command))
        .route_layer(middleware::from_fn(require_session));

    let mut router = Router::new()
        .merge(protected)
        .route("/auth/status", get(handlers::auth::status))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout));

    if let Some(dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), attach_context))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
