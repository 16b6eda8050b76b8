use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    record::{Issue, IssuePatch},
    store::{mock::MockStoreError, RecordStore},
};

/// An in-memory record store. Counts every call and can be told to fail,
/// which makes it useful for exercising the consumer without a database.
#[derive(Debug, Default)]
pub struct MockRecordStore {
    issues: Mutex<BTreeMap<i64, Issue>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let mut store = Self::new();
        *store.issues.get_mut() = issues.into_iter().map(|i| (i.id, i)).collect();
        store
    }

    pub async fn issues(&self) -> MutexGuard<'_, BTreeMap<i64, Issue>> {
        self.issues.lock().await
    }

    /// Number of times [RecordStore::apply_update] has been called,
    /// successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent update fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecordStore for MockRecordStore {
    type Error = MockStoreError;

    async fn apply_update(&self, id: i64, patch: &IssuePatch) -> Result<u64, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(MockStoreError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MockStoreError::ConnectionError);
        }
        let mut lock = self.issues.lock().await;
        if !lock.contains_key(&id) {
            return Ok(0);
        }
        if let Some(new_id) = patch.id {
            if new_id != id && lock.contains_key(&new_id) {
                return Err(MockStoreError::DuplicateKey(new_id));
            }
        }
        if let Some(mut issue) = lock.remove(&id) {
            issue.apply(patch, Utc::now());
            lock.insert(issue.id, issue);
        }
        Ok(1)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn issue(id: i64) -> Issue {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Issue {
            id,
            summary: String::new(),
            status: "open".to_string(),
            di: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn rekey_onto_existing_row_fails() {
        let store = MockRecordStore::with_issues([issue(2), issue(3)]);
        let before = store.issues().await.clone();
        let patch = IssuePatch {
            id: Some(3),
            status: Some("clash".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.apply_update(2, &patch).await,
            Err(MockStoreError::DuplicateKey(3))
        ));
        assert_eq!(*store.issues().await, before);
    }

    #[tokio::test]
    async fn rekey_onto_free_id_moves_row() {
        let store = MockRecordStore::with_issues([issue(2)]);
        let patch = IssuePatch {
            id: Some(4),
            ..Default::default()
        };
        assert_eq!(store.apply_update(2, &patch).await.unwrap(), 1);
        let issues = store.issues().await;
        assert!(!issues.contains_key(&2));
        assert_eq!(issues[&4].id, 4);
    }

    #[tokio::test]
    async fn same_nested_id_is_not_a_clash() {
        let store = MockRecordStore::with_issues([issue(2)]);
        let patch = IssuePatch {
            id: Some(2),
            ..Default::default()
        };
        assert_eq!(store.apply_update(2, &patch).await.unwrap(), 1);
    }
}
