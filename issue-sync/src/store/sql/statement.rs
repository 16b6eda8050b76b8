use chrono::{DateTime, Utc};

use crate::record::IssuePatch;

/// A value to be bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// A single keyed `UPDATE` built from an [IssuePatch]. Both MySQL and
/// SQLite accept `?` placeholders, so the text is shared between backends
/// and only the binding differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatement {
    sql: String,
    binds: Vec<Bind>,
}

impl UpdateStatement {
    /// Build the statement for `table`. Only fields present in `patch` are
    /// assigned, except `updated_at` which is always assigned (falling back
    /// to `now`). The last bind is the lookup key.
    pub fn new(table: &str, id: i64, patch: &IssuePatch, now: DateTime<Utc>) -> Self {
        let mut columns = Vec::with_capacity(6);
        let mut binds = Vec::with_capacity(7);

        if let Some(nested_id) = patch.id {
            columns.push("id");
            binds.push(Bind::Int(nested_id));
        }
        if let Some(summary) = &patch.summary {
            columns.push("summary");
            binds.push(Bind::Text(summary.clone()));
        }
        if let Some(status) = &patch.status {
            columns.push("status");
            binds.push(Bind::Text(status.clone()));
        }
        if let Some(di) = patch.di {
            columns.push("di");
            binds.push(Bind::Int(di));
        }
        if let Some(created_at) = patch.created_at {
            columns.push("created_at");
            binds.push(Bind::Timestamp(created_at));
        }
        columns.push("updated_at");
        binds.push(Bind::Timestamp(patch.updated_at.unwrap_or(now)));

        let assignments = columns
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        binds.push(Bind::Int(id));

        Self {
            sql: format!("UPDATE {table} SET {assignments} WHERE id = ?"),
            binds,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }
}
