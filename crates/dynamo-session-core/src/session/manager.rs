use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{Result, SerializationError, SessionError, StoreError};
use crate::sid::{loggable_session_id, SessionId, SidCodec};
use crate::store::SessionStore;

use super::record::SessionRecord;
use super::timeout::SessionState;
use super::{Session, SessionData, SessionDict, SessionInstance};

/// Side-effect free view of a session id, for diagnostics.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub loggable: String,
    pub state: SessionState,
    /// The stored record, when the id verified and a record exists.
    pub record: Option<SessionRecord>,
}

/// Creates, loads, saves and clears sessions against a `SessionStore`.
///
/// Holds no per-session state; only configuration, the codec, the store
/// handle and the clock.
pub struct SessionManager<T = SessionDict> {
    config: SessionConfig,
    codec: SidCodec,
    store: Box<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    _data: PhantomData<fn() -> T>,
}

impl<T: SessionData> SessionManager<T> {
    pub fn new(config: SessionConfig, store: impl SessionStore + 'static) -> Result<Self> {
        let codec = config.sid_codec()?;
        Ok(Self {
            config,
            codec,
            store: Box::new(store),
            clock: Arc::new(SystemClock),
            _data: PhantomData,
        })
    }

    /// Replace the wall clock, e.g. with a `ManualClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &SidCodec {
        &self.codec
    }

    /// Create a session with the configured default timeouts.
    ///
    /// Nothing is written until `save`.
    pub fn create(&self) -> SessionInstance<T> {
        let instance = SessionInstance::new(
            self.codec.generate(),
            self.config.idle_timeout_secs,
            self.config.absolute_timeout_secs,
            self.now(),
        );
        debug!("Created session {}", instance.loggable_session_id());
        instance
    }

    /// Create a session, overriding either default timeout.
    pub fn create_with_timeouts(
        &self,
        idle_timeout_secs: Option<u64>,
        absolute_timeout_secs: Option<u64>,
    ) -> Result<SessionInstance<T>> {
        let mut instance = self.create();
        if let Some(secs) = idle_timeout_secs {
            instance.set_idle_timeout_secs(secs)?;
        }
        if let Some(secs) = absolute_timeout_secs {
            instance.set_absolute_timeout_secs(secs)?;
        }
        Ok(instance)
    }

    /// Create a session and persist it immediately.
    pub fn create_and_save(&self) -> Result<SessionInstance<T>> {
        let mut instance = self.create();
        self.save(&mut instance)?;
        Ok(instance)
    }

    /// Resolve a client-supplied id to a live session or the null session.
    ///
    /// Invalid, unknown, expired and undecodable sessions all yield
    /// `Session::Null`. Only store failures are returned as errors.
    pub fn load(&self, session_id: &str) -> Result<Session<T>> {
        match self.try_load(session_id) {
            Ok(instance) => Ok(Session::Live(instance)),
            Err(e) if e.is_session_absent() => {
                debug!("No usable session: {}", e);
                Ok(Session::null())
            }
            Err(e) => Err(e),
        }
    }

    /// Like `load`, but reports why no session could be resolved.
    pub fn try_load(&self, session_id: &str) -> Result<SessionInstance<T>> {
        let id = self.verify(session_id)?;
        let loggable = id.loggable();
        let key = id.store_key();

        let record = self.fetch(&key, &loggable)?;

        let now = self.now();
        let state = record.state_at(now);
        if !state.is_active() {
            if let Err(e) = self.store.delete(&key) {
                warn!("Failed to delete expired session {}: {}", loggable, e);
            }
            return Err(SessionError::Expired { loggable, state });
        }

        let mut data = T::default();
        if let Err(source) = data.deserialize(&record.data) {
            warn!("Discarding undecodable session {}: {}", loggable, source);
            return Err(SessionError::CorruptRecord { loggable, source });
        }

        let touched = record.touched(now);
        self.store.touch(&key, touched.accessed, touched.expires)?;
        debug!("Loaded session {}", loggable);

        Ok(SessionInstance {
            id,
            idle_timeout_secs: touched.idle_timeout,
            absolute_timeout_secs: touched.absolute_timeout,
            created: touched.created,
            accessed: touched.accessed,
            dirty: false,
            data,
        })
    }

    /// Report the state of a session id without touching or deleting it.
    pub fn inspect(&self, session_id: &str) -> Result<Inspection> {
        let id = match self.codec.verify(session_id) {
            Ok(id) => id,
            Err(_) => {
                return Ok(Inspection {
                    loggable: loggable_session_id(session_id),
                    state: SessionState::Invalid,
                    record: None,
                })
            }
        };
        let loggable = id.loggable();

        let (state, record) = match self.fetch(&id.store_key(), &loggable) {
            Ok(record) => (record.state_at(self.now()), Some(record)),
            Err(e) if e.is_session_absent() => (SessionState::Invalid, None),
            Err(e) => return Err(e),
        };

        Ok(Inspection {
            loggable,
            state,
            record,
        })
    }

    /// Persist a live session.
    ///
    /// Always writes the full record, dirty or not.
    pub fn save(&self, instance: &mut SessionInstance<T>) -> Result<()> {
        let data = instance.data.serialize()?;
        let accessed = instance.accessed.max(self.now());
        let record = SessionRecord::new(
            instance.id.store_key(),
            data,
            instance.created,
            accessed,
            instance.idle_timeout_secs,
            instance.absolute_timeout_secs,
        );

        self.store.put(&record)?;
        debug!(
            "Saved session {} (dirty: {})",
            instance.loggable_session_id(),
            instance.dirty
        );

        instance.accessed = accessed;
        instance.dirty = false;
        Ok(())
    }

    /// Persist a session if it is live. The null session is never written.
    pub fn save_session(&self, session: &mut Session<T>) -> Result<()> {
        match session {
            Session::Live(instance) => self.save(instance),
            Session::Null(_) => {
                debug!("Ignoring save of null session");
                Ok(())
            }
        }
    }

    /// Delete the record behind a session id. Unknown and invalid ids are a no-op.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        let id = match self.verify(session_id) {
            Ok(id) => id,
            Err(e) => {
                debug!("Ignoring clear: {}", e);
                return Ok(());
            }
        };
        self.store.delete(&id.store_key())?;
        debug!("Cleared session {}", id.loggable());
        Ok(())
    }

    /// Current time at the microsecond precision stores keep.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    fn verify(&self, session_id: &str) -> Result<SessionId> {
        self.codec
            .verify(session_id)
            .map_err(|_| SessionError::InvalidSessionId {
                loggable: loggable_session_id(session_id),
            })
    }

    fn fetch(&self, key: &str, loggable: &str) -> Result<SessionRecord> {
        match self.store.get(key) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(SessionError::NotFound {
                loggable: loggable.to_string(),
            }),
            Err(StoreError::Corrupt(reason)) => {
                warn!("Unreadable record for session {}: {}", loggable, reason);
                Err(SessionError::CorruptRecord {
                    loggable: loggable.to_string(),
                    source: SerializationError::Invalid(reason),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
