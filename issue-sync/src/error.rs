use std::error::Error;

use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Failures which end a consumer's life: connecting, subscribing, losing
/// the delivery stream and shutting down.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("record store error: {0}")]
    Store(#[source] BoxError),
    #[error("queue error: {0}")]
    Queue(#[source] BoxError),
}

impl SyncError {
    pub fn store(e: impl Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(e))
    }

    pub fn queue(e: impl Error + Send + Sync + 'static) -> Self {
        Self::Queue(Box::new(e))
    }
}

/// Why a single delivery was rejected. These never stop the consumer.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("malformed message body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("update failed: {0}")]
    Store(#[source] BoxError),
}
