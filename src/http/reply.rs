//! Error bodies and status codes.
//!
//! Every failure leaves the server as `{"error": "...", "hint": "..."}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use crate::error::ToolError;
use crate::jobs::JobFileError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        ApiError {
            status,
            body: ErrorBody {
                error: error.into(),
                hint: None,
            },
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP status for each failure kind.
pub fn status_for(err: &ToolError) -> StatusCode {
    match err {
        ToolError::NotAvailable { .. } | ToolError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ToolError::InvalidRequest(_) | ToolError::Precondition { .. } => StatusCode::BAD_REQUEST,
        ToolError::Cancelled { .. } => StatusCode::CONFLICT,
        ToolError::TimedOut { .. }
        | ToolError::NonZeroExit { .. }
        | ToolError::SpawnError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        ApiError {
            status: status_for(&err),
            body: ErrorBody {
                hint: err.hint().map(str::to_owned),
                error: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ToolError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl From<JobFileError> for ApiError {
    fn from(err: JobFileError) -> Self {
        let status = match &err {
            JobFileError::InvalidJobId
            | JobFileError::InvalidPath
            | JobFileError::UnsupportedType => StatusCode::BAD_REQUEST,
            JobFileError::NotFound => StatusCode::NOT_FOUND,
            JobFileError::AccessDenied => StatusCode::FORBIDDEN,
            JobFileError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("rejected request body: {rejection}");
        ApiError::bad_request("Invalid request body")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// Interceptor failures that name a missing session or an empty capture
/// get their own status and a message naming the session.
pub fn session_error(session_id: &str, err: ToolError) -> ApiError {
    if let ToolError::NonZeroExit { message, .. } = &err {
        if message.contains("not found") {
            return ApiError::new(
                StatusCode::NOT_FOUND,
                format!("Session '{session_id}' not found"),
            );
        }
        if message.contains("No traffic data") {
            return ApiError::bad_request(format!("Session '{session_id}' has no traffic data"));
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status() {
        let cases = [
            (
                ToolError::NotAvailable {
                    tool: "JADX".into(),
                    error: "missing".into(),
                    hint: "install".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ToolError::Busy { limit: 4 }, StatusCode::SERVICE_UNAVAILABLE),
            (ToolError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (ToolError::precondition("no file", None), StatusCode::BAD_REQUEST),
            (
                ToolError::Cancelled { tool: "Claude CLI".into() },
                StatusCode::CONFLICT,
            ),
            (
                ToolError::TimedOut {
                    tool: "Ghidra".into(),
                    timeout_ms: 1,
                    hint: None,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ToolError::NonZeroExit {
                    message: "boom".into(),
                    exit_code: Some(1),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ToolError::SpawnError {
                    message: "spawn failed".into(),
                    hint: None,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err:?}");
        }
    }

    #[test]
    fn body_carries_hint() {
        let api: ApiError = ToolError::TimedOut {
            tool: "JADX".into(),
            timeout_ms: 300_000,
            hint: Some("Try reducing thread count".into()),
        }
        .into();
        assert_eq!(
            serde_json::to_value(&api.body).unwrap(),
            serde_json::json!({"error": "JADX command timed out", "hint": "Try reducing thread count"})
        );
    }

    #[test]
    fn body_omits_missing_hint() {
        let api = ApiError::bad_request("Code is required");
        assert_eq!(
            serde_json::to_value(&api.body).unwrap(),
            serde_json::json!({"error": "Code is required"})
        );
    }

    #[test]
    fn session_errors_are_specialized() {
        let not_found = ToolError::NonZeroExit {
            message: "Error: Session 'abc' not found".into(),
            exit_code: Some(1),
        };
        let api = session_error("abc", not_found);
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.body.error, "Session 'abc' not found");

        let empty = ToolError::NonZeroExit {
            message: "Error: No traffic data in session".into(),
            exit_code: Some(1),
        };
        let api = session_error("abc", empty);
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.body.error, "Session 'abc' has no traffic data");
    }

    #[test]
    fn unavailable_tool_is_not_a_missing_session() {
        let err = ToolError::NotAvailable {
            tool: "Interceptor Toolkit".into(),
            error: "Interceptor Toolkit not found at /opt/x".into(),
            hint: "install".into(),
        };
        assert_eq!(session_error("abc", err).status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn job_file_errors_map_to_status() {
        assert_eq!(
            ApiError::from(JobFileError::NotFound).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(JobFileError::AccessDenied).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(JobFileError::InvalidPath).body.error,
            "Invalid file path"
        );
    }
}
