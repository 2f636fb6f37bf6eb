//! Liveness/readiness probes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /healthz` — always 200; the process is up.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /health` — 200/503 depending on whether the database answers a ping.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "ok", "db": "ok"}))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable", "db": err.to_string()})),
        ),
    }
}

/// `GET /readyz` — strict readiness: the database is reachable and the
/// policy document loads and validates.
pub async fn readyz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(err) = sqlx::query("SELECT 1").execute(&state.db).await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable", "reason": format!("db: {err}")})),
        );
    }

    match state.policy.load() {
        Ok(doc) => {
            let report = govrun_core::policy::validate(&doc);
            if report.ok() {
                (StatusCode::OK, Json(json!({"status": "ready"})))
            } else {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"status": "unavailable", "reason": "policy invalid", "errors": report.errors})),
                )
            }
        }
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable", "reason": format!("policy: {err}")})),
        ),
    }
}
