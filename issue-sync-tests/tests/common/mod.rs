#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

/// A row as read back from the `issues` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRow {
    pub id: i64,
    pub summary: String,
    pub status: String,
    pub di: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn seeded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

/// An in-memory database lives and dies with its connection, so the pool
/// must never hold more than one.
pub async fn test_db_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("../issue-sync/migrations")
        .run(&pool)
        .await
        .unwrap();
    pool
}

pub async fn seed(pool: &SqlitePool, id: i64, status: &str) {
    sqlx::query(
        r#"
            INSERT INTO issues (id, summary, status, di, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(id)
    .bind(format!("issue {id}"))
    .bind(status)
    .bind(0_i64)
    .bind(seeded_at())
    .bind(seeded_at())
    .execute(pool)
    .await
    .unwrap();
}

pub async fn fetch(pool: &SqlitePool, id: i64) -> Option<IssueRow> {
    sqlx::query(
        r#"
            SELECT id, summary, status, di, created_at, updated_at
            FROM issues
            WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .unwrap()
    .map(|r| IssueRow {
        id: r.get("id"),
        summary: r.get("summary"),
        status: r.get("status"),
        di: r.get("di"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

pub async fn fetch_all(pool: &SqlitePool) -> Vec<IssueRow> {
    let ids: Vec<i64> = sqlx::query("SELECT id FROM issues ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.get("id"))
        .collect();
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        rows.extend(fetch(pool, id).await);
    }
    rows
}
