//! HTTP error taxonomy: maps coordinator/store faults onto the exact
//! response shapes spec §6 names (`400`, `404`, `503`, default `500`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use qtask_coordinator::CoordinatorError;
use qtask_core::ValidationError;
use qtask_store::StoreError;

/// An error ready to be turned into an HTTP response, always carrying the
/// request's correlation ID.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: String,
}

impl ApiError {
    pub fn not_found(correlation_id: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "Task not found".to_string(),
            details: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn bad_request(error: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn validation(err: &ValidationError, correlation_id: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "Validation failed".to_string(),
            details: Some(json!(err.fields)),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn service_unavailable(error: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: error.into(),
            details: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn internal(error: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            details: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn from_coordinator_error(err: CoordinatorError, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        match err {
            CoordinatorError::Validation(ref v) => Self::validation(v, correlation_id),
            CoordinatorError::StorageUnavailable(_) => {
                Self::service_unavailable("Storage is currently unavailable", correlation_id)
            }
            CoordinatorError::BrokerUnavailable(_) => {
                Self::service_unavailable("Task queue is currently unavailable", correlation_id)
            }
        }
    }

    pub fn from_store_error(err: StoreError, correlation_id: impl Into<String>) -> Self {
        let _ = err;
        Self::service_unavailable("Storage is currently unavailable", correlation_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.error,
            "correlation_id": self.correlation_id,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}
