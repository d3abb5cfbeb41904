use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid content: {0}")]
    InvalidContent(String),
    #[error("database error: {0}")]
    Database(#[from] aura_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<aura_util::validation::ValidationError> for CoreError {
    fn from(err: aura_util::validation::ValidationError) -> Self {
        CoreError::InvalidContent(err.to_string())
    }
}
