use crate::session::timeout::SessionState;

/// Core error type for session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session id: {loggable}")]
    InvalidSessionId { loggable: String },

    #[error("Session not found: {loggable}")]
    NotFound { loggable: String },

    #[error("Session expired ({state}): {loggable}")]
    Expired {
        loggable: String,
        state: SessionState,
    },

    #[error("Corrupt session record {loggable}: {source}")]
    CorruptRecord {
        loggable: String,
        #[source]
        source: SerializationError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid timeout: {0} must be a positive number of seconds")]
    InvalidTimeout(&'static str),
}

impl SessionError {
    /// True when the error only means "there is no usable session".
    ///
    /// These are the cases `SessionManager::load` folds into the null session.
    /// Everything else is an operation that could not be completed.
    pub fn is_session_absent(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidSessionId { .. }
                | SessionError::NotFound { .. }
                | SessionError::Expired { .. }
                | SessionError::CorruptRecord { .. }
        )
    }
}

/// Errors raised by a `SessionStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    /// The record exists but could not be decoded into a `SessionRecord`.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No session id signing key configured")]
    NoSigningKey,

    #[error("Session id signing key {0} is shorter than 16 bytes")]
    WeakSigningKey(usize),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returned by the identifier codec for any identifier it will not accept.
///
/// Malformed and tampered identifiers are deliberately indistinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session id verification failed")]
pub struct VerificationFailure;

pub type Result<T> = std::result::Result<T, SessionError>;
