//! Governed action runtime HTTP API server.
//!
//! Exposes the policy-gated case/pending-action/execution surface described
//! by the governance engine in `govrun-core` as a REST API: health probes,
//! hot-reloaded policy read/validate/patch, case and audit reads, and the
//! pending-action lifecycle (materialize, decide, execute).

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod request_context;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware as axum_middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete axum router with every route from the HTTP surface,
/// the request-id admission middleware, CORS, and request tracing.
///
/// Routes sit at the top level; there is no `/api` prefix.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::health::healthz))
        .route("/health", get(routes::health::health))
        .route("/readyz", get(routes::health::readyz))
        .route(
            "/governance/policy",
            get(routes::governance::get_policy).patch(routes::governance::patch_policy),
        )
        .route("/governance/policy/validate", post(routes::governance::validate_policy))
        .route("/cases", get(routes::cases::list_cases))
        .route("/cases/{case_id}", get(routes::cases::get_case))
        .route("/cases/{case_id}/actions", get(routes::cases::case_actions))
        .route(
            "/cases/{case_id}/pending_actions",
            get(routes::cases::case_pending_actions),
        )
        .route(
            "/pending_actions",
            get(routes::pending_actions::list_pending_actions).post(routes::pending_actions::materialize_pending_actions),
        )
        .route("/pending_actions/{id}", get(routes::pending_actions::get_pending_action))
        .route(
            "/pending_actions/{id}/decision",
            patch(routes::pending_actions::decide_pending_action),
        )
        .route(
            "/pending_actions/{id}/execute",
            post(routes::pending_actions::execute_pending_action),
        )
        .route("/actions/execute", post(routes::actions::execute))
        .route("/audit/recent", get(routes::audit::recent))
        .route("/audit/by_case/{case_id}", get(routes::audit::by_case))
        .route("/maintenance/cleanup", post(routes::maintenance::cleanup))
        .route("/maintenance/status", get(routes::maintenance::status))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
