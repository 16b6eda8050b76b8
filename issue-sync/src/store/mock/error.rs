use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockStoreError {
    #[error("connection error")]
    ConnectionError,
    #[error("store closed")]
    Closed,
    #[error("duplicate key {0}")]
    DuplicateKey(i64),
}
