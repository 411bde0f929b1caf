use chrono::{DateTime, Duration, Utc};

/// Outcome of evaluating a session against its timeout policies.
///
/// Everything except `Active` collapses into the null session for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    IdleExpired,
    AbsoluteExpired,
    /// Missing record, failed verification or undecodable record.
    Invalid,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::IdleExpired => write!(f, "idle-expired"),
            SessionState::AbsoluteExpired => write!(f, "absolute-expired"),
            SessionState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Evaluate the idle and absolute policies at time `now`.
///
/// The idle check runs first; a session past both limits reports `IdleExpired`.
pub fn evaluate(
    now: DateTime<Utc>,
    created: DateTime<Utc>,
    accessed: DateTime<Utc>,
    idle_timeout_secs: u64,
    absolute_timeout_secs: u64,
) -> SessionState {
    if now - accessed > secs(idle_timeout_secs) {
        SessionState::IdleExpired
    } else if now - created > secs(absolute_timeout_secs) {
        SessionState::AbsoluteExpired
    } else {
        SessionState::Active
    }
}

/// Epoch second at which the first of the two policies fires.
pub fn expires_at(
    created: DateTime<Utc>,
    accessed: DateTime<Utc>,
    idle_timeout_secs: u64,
    absolute_timeout_secs: u64,
) -> i64 {
    let absolute = created.timestamp().saturating_add(secs_i64(absolute_timeout_secs));
    let idle = accessed.timestamp().saturating_add(secs_i64(idle_timeout_secs));
    absolute.min(idle)
}

fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn secs(secs: u64) -> Duration {
    Duration::try_seconds(secs_i64(secs)).unwrap_or(Duration::MAX)
}
