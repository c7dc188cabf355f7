//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::inference::InferenceError;
use crate::session::SessionError;
use crate::upload::UploadError;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    /// Machine-readable error kind, reported as `error.type`
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request_error",
            message: msg.into(),
        }
    }

    pub fn internal(kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": self.kind,
                "code": self.status.as_str()
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: "model_unavailable",
            message: err.to_string(),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::internal("upload_error", err.to_string())
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Timeout(_) => Self {
                status: StatusCode::GATEWAY_TIMEOUT,
                kind: "inference_timeout",
                message: err.to_string(),
            },
            _ => ApiError::internal("inference_error", err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use std::time::Duration;

    #[test]
    fn session_failures_are_503() {
        let err: ApiError = SessionError::from(PipelineError::BackendUnavailable).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind, "model_unavailable");
    }

    #[test]
    fn inference_timeouts_are_504() {
        let err: ApiError = InferenceError::Timeout(Duration::from_secs(600)).into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);

        let err: ApiError =
            InferenceError::from(PipelineError::Generation("boom".to_string())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind, "inference_error");
    }
}
