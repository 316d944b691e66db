//! Persistence boundary for per-user credentials, preferences and the
//! last known grade snapshot.
//!
//! The reconciliation cycle only reads records and replaces snapshots; the
//! command layer owns credential, term and alarm updates. Every operation is
//! atomic per user key.
//!
//! Two implementations ship:
//!
//! - [`SqliteSnapshotStore`]: the production backend, one SQLite file
//! - [`MemorySnapshotStore`]: a map behind a mutex, for tests and dry runs

mod memory;
mod schema;
mod sqlite;

pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

use gradewatch_obs::GradeTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identity of a registered user (the Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(pub i64);

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Everything the service knows about one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub key: UserKey,
    /// OBS session cookie. Never logged.
    #[serde(skip_serializing)]
    pub credential: String,
    /// OBS term selector (`donemId`).
    pub term: String,
    /// Whether change notifications are wanted.
    pub alarm_enabled: bool,
    /// Last successfully fetched table; `None` until the first success.
    pub snapshot: Option<GradeTable>,
    pub created_at: u64,
    pub updated_at: u64,
    pub last_checked_at: Option<u64>,
}

impl UserRecord {
    /// A fresh record with nothing configured.
    #[must_use]
    pub fn new(key: UserKey) -> Self {
        let now = now_epoch_secs();
        Self {
            key,
            credential: String::new(),
            term: String::new(),
            alarm_enabled: false,
            snapshot: None,
            created_at: now,
            updated_at: now,
            last_checked_at: None,
        }
    }

    /// Both a credential and a term are set, so a fetch can be attempted.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.credential.trim().is_empty() && !self.term.trim().is_empty()
    }

    /// Included in timer sweeps.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.alarm_enabled && self.is_configured()
    }
}

/// Errors from a snapshot store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("user not found: {0}")]
    NotFound(UserKey),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Keyed storage of [`UserRecord`]s.
///
/// Calls are short and synchronous; implementations must not block for long
/// since they are invoked from async tasks.
pub trait SnapshotStore: Send + Sync {
    /// Load a user's record. `Ok(None)` means the user is unknown.
    fn get(&self, key: UserKey) -> Result<Option<UserRecord>, StoreError>;

    /// Replace a user's snapshot and stamp `last_checked_at`.
    ///
    /// Fails with [`StoreError::NotFound`] for unknown users.
    fn put_snapshot(&self, key: UserKey, table: &GradeTable) -> Result<(), StoreError>;

    /// Set the session cookie, creating the user if needed.
    fn set_credential(&self, key: UserKey, credential: &str) -> Result<(), StoreError>;

    /// Set the term selector, creating the user if needed.
    fn set_term(&self, key: UserKey, term: &str) -> Result<(), StoreError>;

    /// Set the alarm flag. Returns `false` when the user does not exist.
    fn set_alarm(&self, key: UserKey, enabled: bool) -> Result<bool, StoreError>;

    /// Users a timer sweep should check: configured and alarm enabled.
    ///
    /// Ordered stalest first: never-checked users, then by
    /// `last_checked_at`, ties broken by key. A sweep cut short by its
    /// deadline therefore starts with the users it skipped.
    fn list_eligible(&self) -> Result<Vec<UserKey>, StoreError>;
}

pub(crate) fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
