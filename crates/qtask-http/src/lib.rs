//! # qtask-http
//!
//! The thin axum HTTP surface over the coordinator and store (spec §4.6):
//! submit, query, health. Request/response shapes and status codes follow
//! spec §6 exactly; everything else (validation, persistence, publish) is
//! delegated to `qtask-coordinator` and `qtask-store`.

pub mod correlation;
pub mod error;
pub mod routes;
pub mod state;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the full router: routes, correlation-ID middleware, CORS, and
/// request tracing (spec §4.6's `CORSMiddleware` / `CorrelationIDMiddleware`
/// equivalents).
pub fn app(state: AppState, cors_origins: Option<&[String]>) -> Router {
    let cors = match cors_origins {
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/tasks", post(routes::submit_task))
        .route("/tasks/:task_id", get(routes::get_task))
        .route("/health", get(routes::health))
        .fallback(routes::not_found)
        .layer(middleware::from_fn(correlation::propagate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
