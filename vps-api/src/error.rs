use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;
use vps_orchestrator::{ErrorKind, VpsError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub detail: String,
}

#[derive(Debug, Error)]
#[error("{detail}")]
pub struct ApiError {
    kind: ErrorKind,
    detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::RuntimeUnreachable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::RuntimeFatal => StatusCode::BAD_GATEWAY,
            ErrorKind::PartialFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.kind,
            detail: self.detail,
        };

        (status, Json(body)).into_response()
    }
}

impl From<VpsError> for ApiError {
    fn from(err: VpsError) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Internal {
            error!(error = %err, "request failed");
        }

        ApiError::new(kind, err.public_detail())
    }
}

/// A body that does not parse is a validation error like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorKind::Validation, rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_kind() {
        let cases = [
            (VpsError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (VpsError::NotFound("alpha".into()), StatusCode::NOT_FOUND),
            (VpsError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (VpsError::InvalidState("stopped".into()), StatusCode::CONFLICT),
            (
                VpsError::RuntimeUnreachable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (VpsError::RuntimeFatal("boom".into()), StatusCode::BAD_GATEWAY),
            (
                VpsError::PartialFailure {
                    name: "alpha".into(),
                    detail: "boom".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_detail_is_generic() {
        let err = ApiError::from(VpsError::Internal("pool closed".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "internal error");
    }
}
