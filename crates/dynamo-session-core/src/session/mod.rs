pub mod manager;
pub mod record;
pub mod timeout;

use std::collections::HashMap;
use std::ops::{Deref, DerefMut, Index};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SerializationError, SessionError};
use crate::sid::SessionId;

/// Serialization contract for session payloads.
///
/// `deserialize(serialize(v))` must reproduce `v`. Deserialization may fail on
/// foreign or damaged input; the manager treats that as an unusable session.
pub trait SessionData: Default {
    fn serialize(&self) -> Result<String, SerializationError>;

    fn deserialize(&mut self, data: &str) -> Result<(), SerializationError>;
}

/// The default payload: string keys mapped to arbitrary JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDict {
    entries: HashMap<String, serde_json::Value>,
}

static NULL_VALUE: serde_json::Value = serde_json::Value::Null;

impl SessionDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    /// Get a value and convert it into `V`, if present and convertible.
    pub fn get_as<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        self.entries
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Insert any serializable value.
    pub fn insert_value<V: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &V,
    ) -> Result<Option<serde_json::Value>, SerializationError> {
        let value = serde_json::to_value(value)?;
        Ok(self.entries.insert(key.into(), value))
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.entries.iter()
    }
}

impl Index<&str> for SessionDict {
    type Output = serde_json::Value;

    /// Missing keys index to `Value::Null`, like `serde_json::Value`.
    fn index(&self, key: &str) -> &Self::Output {
        self.entries.get(key).unwrap_or(&NULL_VALUE)
    }
}

impl SessionData for SessionDict {
    fn serialize(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    fn deserialize(&mut self, data: &str) -> Result<(), SerializationError> {
        self.entries = serde_json::from_str(data)?;
        Ok(())
    }
}

impl From<HashMap<String, serde_json::Value>> for SessionDict {
    fn from(entries: HashMap<String, serde_json::Value>) -> Self {
        Self { entries }
    }
}

/// Adapter making any serde type a session payload, encoded as JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T> SessionData for Json<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn serialize(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    fn deserialize(&mut self, data: &str) -> Result<(), SerializationError> {
        self.0 = serde_json::from_str(data)?;
        Ok(())
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// A live, mutable session.
pub struct SessionInstance<T = SessionDict> {
    id: SessionId,
    idle_timeout_secs: u64,
    absolute_timeout_secs: u64,
    created: DateTime<Utc>,
    accessed: DateTime<Utc>,
    dirty: bool,
    data: T,
}

impl<T: SessionData> SessionInstance<T> {
    pub(crate) fn new(
        id: SessionId,
        idle_timeout_secs: u64,
        absolute_timeout_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            idle_timeout_secs,
            absolute_timeout_secs,
            created: now,
            accessed: now,
            dirty: true,
            data: T::default(),
        }
    }
}

impl<T> SessionInstance<T> {
    /// The signed identifier to hand back to the client.
    pub fn session_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn loggable_session_id(&self) -> String {
        self.id.loggable()
    }

    pub fn idle_timeout_secs(&self) -> u64 {
        self.idle_timeout_secs
    }

    pub fn absolute_timeout_secs(&self) -> u64 {
        self.absolute_timeout_secs
    }

    /// Override the idle timeout for this session. Takes effect on next save.
    pub fn set_idle_timeout_secs(&mut self, secs: u64) -> Result<(), SessionError> {
        if secs == 0 {
            return Err(SessionError::InvalidTimeout("idle timeout"));
        }
        self.idle_timeout_secs = secs;
        self.dirty = true;
        Ok(())
    }

    /// Override the absolute timeout for this session. Takes effect on next save.
    pub fn set_absolute_timeout_secs(&mut self, secs: u64) -> Result<(), SessionError> {
        if secs == 0 {
            return Err(SessionError::InvalidTimeout("absolute timeout"));
        }
        self.absolute_timeout_secs = secs;
        self.dirty = true;
        Ok(())
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn accessed(&self) -> DateTime<Utc> {
        self.accessed
    }

    /// Whether anything changed since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable access to the payload. Marks the session dirty.
    pub fn data_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> std::fmt::Debug for SessionInstance<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInstance")
            .field("id", &self.id)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("absolute_timeout_secs", &self.absolute_timeout_secs)
            .field("created", &self.created)
            .field("accessed", &self.accessed)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Stand-in for a session that could not be resolved. Read-only and empty.
#[derive(Debug, Default)]
pub struct NullSession<T = SessionDict> {
    data: T,
}

impl<T: SessionData> NullSession<T> {
    pub fn new() -> Self {
        Self { data: T::default() }
    }
}

impl<T> NullSession<T> {
    pub fn data(&self) -> &T {
        &self.data
    }
}

/// Result of resolving a session id: a live session or the null session.
#[derive(Debug)]
pub enum Session<T = SessionDict> {
    Live(SessionInstance<T>),
    Null(NullSession<T>),
}

impl<T: SessionData> Session<T> {
    pub fn null() -> Self {
        Session::Null(NullSession::new())
    }
}

impl<T> Session<T> {
    pub fn is_null(&self) -> bool {
        matches!(self, Session::Null(_))
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Session::Live(_))
    }

    /// Read access to the payload; empty for the null session.
    pub fn data(&self) -> &T {
        match self {
            Session::Live(instance) => instance.data(),
            Session::Null(null) => null.data(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Session::Live(instance) => Some(instance.session_id()),
            Session::Null(_) => None,
        }
    }

    pub fn as_live(&self) -> Option<&SessionInstance<T>> {
        match self {
            Session::Live(instance) => Some(instance),
            Session::Null(_) => None,
        }
    }

    pub fn as_live_mut(&mut self) -> Option<&mut SessionInstance<T>> {
        match self {
            Session::Live(instance) => Some(instance),
            Session::Null(_) => None,
        }
    }

    pub fn into_live(self) -> Option<SessionInstance<T>> {
        match self {
            Session::Live(instance) => Some(instance),
            Session::Null(_) => None,
        }
    }
}

impl<T> From<SessionInstance<T>> for Session<T> {
    fn from(instance: SessionInstance<T>) -> Self {
        Session::Live(instance)
    }
}
