use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing or invalid x-user-id header")]
    Unauthorized,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("i/o failure for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("s3 request for {key} failed: {reason}")]
    S3 { key: String, reason: String },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Storage(source) => {
                tracing::error!("storage error: {source}");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
        };
        let message = match &self {
            AppError::Storage(_) => "document storage is unavailable".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_variant() {
        let response = AppError::NotFound("note n1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let storage = StorageError::Corrupt {
            key: "doc".into(),
            reason: "bad magic".into(),
        };
        let response = AppError::from(storage).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
