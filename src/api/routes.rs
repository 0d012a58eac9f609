use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{cors, panic_response, request_timeout};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;

    let routes = Router::new()
        // Web page
        .route("/", get(handlers::index).fallback(handlers::not_found))
        // Files
        .route(
            "/api/files",
            get(handlers::list_files).fallback(handlers::not_found),
        )
        .route(
            "/api/files/:id",
            get(handlers::download_file)
                .delete(handlers::delete_file)
                .fallback(handlers::not_found),
        )
        .route(
            "/api/upload",
            post(handlers::upload_file)
                .fallback(handlers::not_found)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Status
        .route(
            "/api/status",
            get(handlers::status).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found);

    with_middleware(routes, state)
}

/// Wrap `routes` in the layers every endpoint shares: panic recovery, the
/// request timeout, CORS and request tracing.
pub fn with_middleware(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            request_timeout,
        ))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
