//! The synchronized entity and the envelope it travels in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A row of the `issues` table. Identifiers are assigned upstream and are
/// never created here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    #[serde(rename = "Summary", alias = "summary")]
    pub summary: String,
    pub status: String,
    pub di: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Overwrite every field present in `patch`. `updated_at` falls back to
    /// `now` when the patch doesn't carry one.
    pub fn apply(&mut self, patch: &IssuePatch, now: DateTime<Utc>) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(summary) = &patch.summary {
            self.summary = summary.clone();
        }
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        if let Some(di) = patch.di {
            self.di = di;
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
        self.updated_at = patch.updated_at.unwrap_or(now);
    }
}

/// A sparse [Issue]. Absent and `null` fields both decode to `None` and
/// leave the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(
        default,
        rename = "Summary",
        alias = "summary",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub di: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IssuePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The message body placed on the queue by a producer.
///
/// The top level `id` is the lookup key. `issue.id`, if present, is treated
/// as an ordinary field and written through. A missing or `null` key decodes
/// to its zero value: id `0` and an empty patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueUpdate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issue: IssuePatch,
}

impl IssueUpdate {
    /// Decode a message body. Object keys are matched case-insensitively.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        serde_json::from_value(fold_keys(value))
    }

    /// Encode to a message body.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lowercase every object key, recursively.
fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), fold_keys(v)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.into_iter().map(fold_keys).collect()),
        other => other,
    }
}
