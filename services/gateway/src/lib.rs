//! Warpify Gateway
//!
//! REST front end for the engine. Every `/api/*` route requires an HS256
//! bearer token; `/health` is open.
//!
//! ## Layers (outermost first)
//!
//! 1. request id (`cf-ray` or a new UUID)
//! 2. HTTP tracing
//! 3. CORS for the configured origin
//! 4. secure response headers
//! 5. bearer auth (API routes only)

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod request_id;
pub mod routes;
pub mod state;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::warn;

use crate::routes::{automation, domain, health, storage, warmup};
use crate::state::{AppState, DEFAULT_CORS_ORIGIN};

pub use config::Config;

fn cors_layer(origin: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| {
        warn!("Invalid CORS origin {:?}, using {}", origin, DEFAULT_CORS_ORIGIN);
        HeaderValue::from_static(DEFAULT_CORS_ORIGIN)
    });

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/setup-domain", post(domain::setup_domain))
        .route("/api/domain/verify", get(domain::verify))
        .route("/api/domain/setup", post(domain::setup))
        .route("/api/domain/verify-setup", get(domain::verify_setup))
        .route("/api/domain/redirect", put(domain::upsert_redirect))
        .route("/api/domain/redirects", get(domain::list_redirects))
        .route(
            "/api/domain/redirects/:rule_id",
            delete(domain::delete_redirect),
        )
        .route("/api/automation/process", post(automation::process))
        .route("/api/warmup/process", post(warmup::process))
        .route("/api/warmup/reconnect", post(warmup::reconnect))
        .route("/api/storage/upload", post(storage::upload))
        .route("/api/storage/files", get(storage::list_files))
        .route(
            "/api/storage/files/:key",
            get(storage::get_file).delete(storage::delete_file),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors_layer(&state.cors_origin))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::assign_request_id))
        .with_state(state)
}
