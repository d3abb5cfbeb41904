use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "message": message }))).into_response()
    }
}

impl From<aura_core::error::CoreError> for ApiError {
    fn from(e: aura_core::error::CoreError) -> Self {
        use aura_core::error::CoreError;
        match e {
            CoreError::NotFound => ApiError::NotFound,
            CoreError::AccessDenied | CoreError::Forbidden => ApiError::Forbidden,
            CoreError::InvalidContent(msg) => ApiError::BadRequest(msg),
            CoreError::Database(db) => ApiError::from(db),
            CoreError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<aura_db::DbError> for ApiError {
    fn from(e: aura_db::DbError) -> Self {
        match e {
            aura_db::DbError::NotFound => ApiError::NotFound,
            aura_db::DbError::Sqlx(_) => ApiError::Internal(anyhow::anyhow!("database error")),
        }
    }
}

impl From<aura_core::auth::AuthError> for ApiError {
    fn from(e: aura_core::auth::AuthError) -> Self {
        use aura_core::auth::AuthError;
        match e {
            AuthError::InvalidCredentials | AuthError::InvalidToken => ApiError::Unauthorized,
            AuthError::RegistrationDisabled => ApiError::Forbidden,
            AuthError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<aura_util::validation::ValidationError> for ApiError {
    fn from(e: aura_util::validation::ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}
