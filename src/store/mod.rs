//! Persistent storage for session records and the user profile.
//!
//! Sub-modules:
//! - `schema`: SQLite DDL definitions.
//! - `sqlite`: SQLite-backed [`SqliteHypeStore`].

pub(crate) mod schema;
pub mod sqlite;

pub use sqlite::SqliteHypeStore;

use crate::profile::UserProfile;
use crate::session::{HypeSession, Outcome};
use uuid::Uuid;

/// Which sessions a query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionFilter {
    #[default]
    All,
    /// Outcome logged as a win.
    Wins,
    /// No outcome logged yet.
    Pending,
    /// Any outcome logged.
    Logged,
}

/// Errors from the session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("session not found: {0}")]
    NotFound(Uuid),

    #[error("outcome already logged for session {0}")]
    OutcomeAlreadyLogged(Uuid),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Storage seam for sessions and the profile.
///
/// Listing methods always return newest first.
pub trait HypeStore: Send + Sync {
    fn insert_session(&self, session: &HypeSession) -> Result<(), StoreError>;

    fn session(&self, id: Uuid) -> Result<Option<HypeSession>, StoreError>;

    /// Up to `limit` sessions matching `filter`, newest first.
    fn recent_sessions(
        &self,
        filter: SessionFilter,
        limit: usize,
    ) -> Result<Vec<HypeSession>, StoreError>;

    fn count_sessions(&self, filter: SessionFilter) -> Result<usize, StoreError>;

    /// Set the outcome on a pending session.
    ///
    /// Fails with [`StoreError::OutcomeAlreadyLogged`] if an outcome exists
    /// and [`StoreError::NotFound`] if the session does not.
    fn update_outcome(
        &self,
        id: Uuid,
        outcome: Outcome,
        notes: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Returns `true` if a row was removed.
    fn delete_session(&self, id: Uuid) -> Result<bool, StoreError>;

    fn load_profile(&self) -> Result<Option<UserProfile>, StoreError>;

    fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;
}
