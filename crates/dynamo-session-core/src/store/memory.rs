use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::StoreError;
use crate::session::record::SessionRecord;

use super::SessionStore;

/// In-process session store backed by a concurrent map.
///
/// Records live as long as the store does. Useful for tests and
/// single-process deployments.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn touch(&self, key: &str, accessed: DateTime<Utc>, expires: i64) -> Result<(), StoreError> {
        if let Some(mut record) = self.records.get_mut(key) {
            record.accessed = accessed;
            record.expires = expires;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}
