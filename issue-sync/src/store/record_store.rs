use std::{error::Error, sync::Arc};

use crate::record::IssuePatch;

/// This is the interface for writing updates to the datastore. A store does
/// not retry: any failure is handed straight back to the consumer.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// An error emerging from an operation
    type Error: Error + Send + Sync + 'static;

    /// Overwrite the fields present in `patch` on the record keyed by `id`.
    /// Returns the number of rows affected, which is zero when no such
    /// record exists.
    async fn apply_update(&self, id: i64, patch: &IssuePatch) -> Result<u64, Self::Error>;

    /// Release the underlying connection(s).
    async fn close(&self);
}

#[async_trait::async_trait]
impl<T: RecordStore> RecordStore for Arc<T> {
    type Error = T::Error;

    async fn apply_update(&self, id: i64, patch: &IssuePatch) -> Result<u64, Self::Error> {
        (**self).apply_update(id, patch).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
