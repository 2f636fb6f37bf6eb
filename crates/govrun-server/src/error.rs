//! API error envelope for the governed action runtime server: `{error:{code, message, details?}, request_id}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use govrun_core::error::{GuardrailViolation, PendingActionError, PolicyError, StorageError};

/// A domain error carrying the HTTP status it maps to, a machine-readable
/// code, and the request id it should be echoed under.
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub request_id: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            request_id: request_id.into(),
        }
    }

    pub fn not_found(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message, request_id)
    }

    pub fn forbidden(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message, request_id)
    }

    pub fn conflict(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message, request_id)
    }

    pub fn precondition_required(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::PRECONDITION_REQUIRED, "precondition_required", message, request_id)
    }

    pub fn precondition_failed(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::PRECONDITION_FAILED, "precondition_failed", message, request_id)
    }

    pub fn dev_mode_required(request_id: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "dev_mode_required",
            "this endpoint requires DEV_MODE or APP_ENV=dev",
            request_id,
        )
    }

    pub fn validation(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message, request_id)
    }

    pub fn internal(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message, request_id)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Map a [`PendingActionError`] to the status code appropriate to
    /// each error kind.
    pub fn from_pending_action(err: PendingActionError, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        match err {
            PendingActionError::NotFound(id) => Self::not_found(format!("pending action not found: {id}"), request_id),
            PendingActionError::IllegalTransition { from, to } => {
                Self::conflict(format!("illegal transition from {from} to {to}"), request_id)
            }
            PendingActionError::IdempotencyConflict => {
                Self::conflict("Idempotency-Key reuse with different payload", request_id)
            }
            PendingActionError::Forbidden(reason) => Self::forbidden(reason, request_id),
            PendingActionError::ApprovalRequired => {
                Self::conflict("pending action requires approval before execution", request_id)
            }
            PendingActionError::Storage(source) => Self::from_storage(source, request_id),
        }
    }

    pub fn from_storage(err: StorageError, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        tracing::error!(error = %err, "storage error");
        Self::internal(err.to_string(), request_id)
    }

    pub fn from_policy(err: PolicyError, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        match err {
            PolicyError::Invalid(errors) => {
                Self::validation("policy document failed validation", request_id).with_details(json!({"errors": errors}))
            }
            other => {
                tracing::error!(error = %other, "policy error");
                Self::internal(other.to_string(), request_id)
            }
        }
    }

    pub fn from_guardrail(err: GuardrailViolation, request_id: impl Into<String>) -> Self {
        Self::conflict(err.0, request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            },
            "request_id": self.request_id,
        }));
        (self.status, body).into_response()
    }
}
