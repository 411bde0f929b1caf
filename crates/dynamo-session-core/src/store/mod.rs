pub mod memory;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::session::record::SessionRecord;

pub use memory::MemorySessionStore;

#[cfg(feature = "dynamodb-backend")]
pub use dynamo::DynamoSessionStore;

/// Trait for session record storage backends.
///
/// Records are addressed by `SessionId::store_key`, never by the signed id.
pub trait SessionStore: Send + Sync {
    /// Fetch a record. `Ok(None)` when no record exists for `key`.
    fn get(&self, key: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Write the full record under `record.id`, replacing any existing one.
    fn put(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Update only `accessed` and `expires` of an existing record, leaving the
    /// payload and timeouts as they are. A missing record stays missing.
    fn touch(&self, key: &str, accessed: DateTime<Utc>, expires: i64) -> Result<(), StoreError>;

    /// Delete a record. Deleting a missing record succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        (**self).put(record)
    }

    fn touch(&self, key: &str, accessed: DateTime<Utc>, expires: i64) -> Result<(), StoreError> {
        (**self).touch(key, accessed, expires)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        (**self).put(record)
    }

    fn touch(&self, key: &str, accessed: DateTime<Utc>, expires: i64) -> Result<(), StoreError> {
        (**self).touch(key, accessed, expires)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}
