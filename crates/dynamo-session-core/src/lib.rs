//! Server-side sessions with signed identifiers and idle/absolute timeouts,
//! persisted through a pluggable key-value `SessionStore`.

pub mod clock;
pub mod config;
pub mod error;
pub mod session;
pub mod sid;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{Result, SessionError, StoreError};
pub use session::manager::{Inspection, SessionManager};
pub use session::record::SessionRecord;
pub use session::timeout::SessionState;
pub use session::{Json, NullSession, Session, SessionData, SessionDict, SessionInstance};
pub use sid::{SessionId, SidCodec};
pub use store::{MemorySessionStore, SessionStore};

#[cfg(feature = "dynamodb-backend")]
pub use store::DynamoSessionStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
