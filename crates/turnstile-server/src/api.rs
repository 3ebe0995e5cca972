//! HTTP API routes and handlers.
//!
//! - `access_codes` - Issuing, displaying, rotating, and revoking codes
//! - `check_ins` - Entry and exit scanning, presence, and daily counters
//! - `directory` - Owner and entitlement feed
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod access_codes;
pub mod check_ins;
pub mod directory;
pub mod error;
pub mod health;
pub mod openapi;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /access-codes      - Issue, display, refresh, list, revoke
/// ├── /check-ins         - Scan entry, exit, status, live, stats
/// ├── /directory         - Owner and entitlement feed
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.service.config().server.cors_origins);

    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/access-codes", access_codes::router())
                .nest("/check-ins", check_ins::router())
                .nest("/directory", directory::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// CORS for the configured origins; unparseable origins are skipped with a warning.
/// An empty list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_origins(origins))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}
