use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timeout;

/// The persisted form of a session, as stored by a `SessionStore`.
///
/// Timestamps are kept at microsecond precision; `SessionManager` truncates
/// the clock before stamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Store key: the encoded random payload of the session id.
    pub id: String,
    /// Serialized payload produced by `SessionData::serialize`.
    pub data: String,
    pub created: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub idle_timeout: u64,
    pub absolute_timeout: u64,
    /// Epoch second after which the record is dead by either policy.
    /// Written for store-native TTL reaping; never read for expiry decisions.
    pub expires: i64,
}

impl SessionRecord {
    pub fn new(
        id: impl Into<String>,
        data: impl Into<String>,
        created: DateTime<Utc>,
        accessed: DateTime<Utc>,
        idle_timeout: u64,
        absolute_timeout: u64,
    ) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            created,
            accessed,
            idle_timeout,
            absolute_timeout,
            expires: timeout::expires_at(created, accessed, idle_timeout, absolute_timeout),
        }
    }

    /// Copy of this record with `accessed` moved to `now` (never backwards).
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        Self::new(
            self.id.clone(),
            self.data.clone(),
            self.created,
            self.accessed.max(now),
            self.idle_timeout,
            self.absolute_timeout,
        )
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> timeout::SessionState {
        timeout::evaluate(
            now,
            self.created,
            self.accessed,
            self.idle_timeout,
            self.absolute_timeout,
        )
    }
}
