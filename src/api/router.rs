//! HTTP routing configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::app::AppState;

use super::handlers::{
    create_user_handler, delete_user_handler, get_user_handler, health_check_handler,
    list_users_handler, liveness_handler, metrics_handler, readiness_handler,
    update_user_handler,
};

/// Requests running longer than this are answered with 408.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router with tracing and timeout middleware.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ));

    let user_routes = Router::new()
        .route("/", get(list_users_handler).post(create_user_handler))
        .route(
            "/{id}",
            get(get_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        );

    let health_routes = Router::new()
        .route("/", get(health_check_handler))
        .route("/live", get(liveness_handler))
        .route("/ready", get(readiness_handler));

    Router::new()
        .nest("/users", user_routes)
        .nest("/health", health_routes)
        .route("/metrics", get(metrics_handler))
        .layer(middleware)
        .with_state(app_state)
}
