//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application:
//! the health check, the inbound-call webhook and the media stream endpoint.

use crate::{
    handlers,
    models::{ErrorResponse, HealthResponse},
    state::AppState,
    ws::media_stream_handler,
};

use axum::{
    Router,
    routing::{any, get},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::incoming_call),
    components(schemas(HealthResponse, ErrorResponse)),
    tags(
        (name = "Call Relay", description = "Telephony media stream relay for a realtime speech model")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        // The telephony provider may be configured to call the webhook with any method.
        .route("/incoming-call", any(handlers::incoming_call))
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
