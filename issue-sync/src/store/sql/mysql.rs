use chrono::Utc;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    MySqlPool,
};
use tracing::debug;

use super::{
    error::SqlError,
    statement::{Bind, UpdateStatement},
};
use crate::{
    config::DatabaseConfig,
    record::IssuePatch,
    store::{RecordStore, ISSUES_TABLE},
};

/// A record store backed by MySQL.
pub struct MySqlRecordStore {
    /// Connection pool
    pool: MySqlPool,
}

impl MySqlRecordStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Open a pool holding a single connection. The consumer is the only
    /// writer, so there's nothing to gain from more.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SqlError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .charset("utf8mb4");
        debug!(
            "Connecting to mysql at {}:{}/{}",
            config.host, config.port, config.name
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl RecordStore for MySqlRecordStore {
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
