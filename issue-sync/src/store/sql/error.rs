use thiserror::Error;

/// Newtype around [sqlx::Error]
#[derive(Debug, Error)]
#[error("sqlx error: {0}")]
pub struct SqlError(#[from] sqlx::Error);
