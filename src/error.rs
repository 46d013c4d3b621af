use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Wire-level error taxonomy shared by every component.
///
/// `NotFound` and `PermissionDenied` are rendered identically so a
/// caller without access cannot distinguish "doesn't exist" from
/// "exists but you can't see it".
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: impl Into<String>, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    pub fn to_status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            // PermissionDenied and NotFound share a status+shape on the wire
            // so a denied caller cannot probe for existence.
            EngineError::PermissionDenied(_) | EngineError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to an unauthorized caller: PermissionDenied and
    /// NotFound both collapse to a generic "not found" body.
    fn public_message(&self) -> String {
        match self {
            EngineError::PermissionDenied(_) => "not found".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::not_found("record", ""),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                EngineError::Conflict(db_err.message().to_string())
            }
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.to_status_code();
        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}
