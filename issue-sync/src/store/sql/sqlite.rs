use chrono::Utc;
use sqlx::SqlitePool;

use super::{
    error::SqlError,
    statement::{Bind, UpdateStatement},
};
use crate::{
    record::IssuePatch,
    store::{RecordStore, ISSUES_TABLE},
};

/// A record store backed by sqlite. Handy for local runs and tests; the
/// schema is expected to exist already.
pub struct SqliteRecordStore {
    /// Connection pool
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    type Error = SqlError;

    async fn apply_update(&self, id: i64, patch: &IssuePatch) -> Result<u64, Self::Error> {
        let statement = UpdateStatement::new(ISSUES_TABLE, id, patch, Utc::now());
        let mut query = sqlx::query(statement.sql());
        for bind in statement.binds() {
            query = match bind {
                Bind::Int(v) => query.bind(*v),
                Bind::Text(v) => query.bind(v.as_str()),
                Bind::Timestamp(v) => query.bind(*v),
            };
        }
        let mut conn = self.pool.acquire().await?;
        let result = query.execute(&mut conn).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
