//! SQLite-backed hype store.
//!
//! A single database file holds the session log and the profile document.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::schema::{apply_schema, read_schema_version};
use super::{HypeStore, SessionFilter, StoreError};
use crate::persona::Persona;
use crate::profile::UserProfile;
use crate::session::{HypeSession, Outcome, normalize_notes};

const SESSION_COLUMNS: &str =
    "id, scenario, user_input, response, persona, created_at, outcome, outcome_notes";

/// SQLite-backed [`HypeStore`].
///
/// Thread-safe via an internal `Mutex<Connection>`.
pub struct SqliteHypeStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteHypeStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "opened hype store");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl HypeStore for SqliteHypeStore {
    fn insert_session(&self, session: &HypeSession) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, scenario, user_input, response, persona, created_at, \
             outcome, outcome_notes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id.to_string(),
                session.scenario,
                session.user_input,
                session.response,
                session.persona.id(),
                session.created_at.timestamp_millis(),
                session.outcome.map(Outcome::as_str),
                session.outcome_notes,
            ],
        )?;
        Ok(())
    }

    fn session(&self, id: Uuid) -> Result<Option<HypeSession>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let raw = conn
            .query_row(&sql, params![id.to_string()], RawSession::from_row)
            .optional()?;
        raw.map(RawSession::into_session).transpose()
    }

    fn recent_sessions(
        &self,
        filter: SessionFilter,
        limit: usize,
    ) -> Result<Vec<HypeSession>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE {} \
             ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            filter_clause(filter)
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], RawSession::from_row)?;

        let mut sessions = Vec::new();
        for raw in rows {
            sessions.push(raw?.into_session()?);
        }
        Ok(sessions)
    }

    fn count_sessions(&self, filter: SessionFilter) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT COUNT(*) FROM sessions WHERE {}",
            filter_clause(filter)
        );
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn update_outcome(
        &self,
        id: Uuid,
        outcome: Outcome,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let notes = normalize_notes(notes);
        let rows = conn.execute(
            "UPDATE sessions SET outcome = ?1, outcome_notes = ?2 \
             WHERE id = ?3 AND outcome IS NULL",
            params![outcome.as_str(), notes, id.to_string()],
        )?;
        if rows > 0 {
            return Ok(());
        }

        let exists = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            Err(StoreError::OutcomeAlreadyLogged(id))
        } else {
            Err(StoreError::NotFound(id))
        }
    }

    fn delete_session(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn load_profile(&self) -> Result<Option<UserProfile>, StoreError> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row("SELECT body FROM profile WHERE slot = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        body.map(|b| {
            serde_json::from_str(&b).map_err(|e| StoreError::Corrupt(format!("profile: {e}")))
        })
        .transpose()
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let body = serde_json::to_string(profile)
            .map_err(|e| StoreError::Corrupt(format!("profile: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO profile (slot, body, updated_at) VALUES (1, ?1, ?2) \
             ON CONFLICT(slot) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![body, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

fn filter_clause(filter: SessionFilter) -> &'static str {
    match filter {
        SessionFilter::All => "1 = 1",
        SessionFilter::Wins => "outcome = 'win'",
        SessionFilter::Pending => "outcome IS NULL",
        SessionFilter::Logged => "outcome IS NOT NULL",
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

/// Columns as stored, before domain validation.
struct RawSession {
    id: String,
    scenario: String,
    user_input: String,
    response: String,
    persona: String,
    created_at: i64,
    outcome: Option<String>,
    outcome_notes: Option<String>,
}

impl RawSession {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scenario: row.get(1)?,
            user_input: row.get(2)?,
            response: row.get(3)?,
            persona: row.get(4)?,
            created_at: row.get(5)?,
            outcome: row.get(6)?,
            outcome_notes: row.get(7)?,
        })
    }

    fn into_session(self) -> Result<HypeSession, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("session id {}: {e}", self.id)))?;
        let persona = Persona::from_id(&self.persona)
            .ok_or_else(|| StoreError::Corrupt(format!("persona {}", self.persona)))?;
        let created_at: DateTime<Utc> = DateTime::from_timestamp_millis(self.created_at)
            .ok_or_else(|| StoreError::Corrupt(format!("timestamp {}", self.created_at)))?;
        let outcome = self
            .outcome
            .map(|o| o.parse::<Outcome>().map_err(StoreError::Corrupt))
            .transpose()?;

        Ok(HypeSession {
            id,
            scenario: self.scenario,
            user_input: self.user_input,
            response: self.response,
            created_at,
            outcome,
            outcome_notes: self.outcome_notes,
            persona,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn session_at(offset_mins: i64, scenario: &str) -> HypeSession {
        let at = Utc::now() - Duration::hours(1) + Duration::minutes(offset_mins);
        HypeSession::new_at(scenario, "input", "Let's GO!", Persona::Sparky, at).unwrap()
    }

    #[test]
    fn open_creates_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("hype.db");
        let store = SqliteHypeStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.schema_version().unwrap(), Some(1));
    }

    #[test]
    fn insert_and_fetch_session() {
        let store = SqliteHypeStore::open_in_memory().unwrap();
        let s = session_at(0, "Job Interview");
        store.insert_session(&s).unwrap();

        let loaded = store.session(s.id).unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.scenario, "Job Interview");
        assert_eq!(loaded.persona, Persona::Sparky);
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            s.created_at.timestamp_millis()
        );
        assert!(loaded.is_pending());
        assert!(store.session(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn recent_sessions_are_newest_first_and_filtered() {
        let store = SqliteHypeStore::open_in_memory().unwrap();
        let old = session_at(0, "old");
        let mid = session_at(10, "mid");
        let new = session_at(20, "new");
        for s in [&mid, &old, &new] {
            store.insert_session(s).unwrap();
        }
        store.update_outcome(old.id, Outcome::Win, None).unwrap();
        store.update_outcome(mid.id, Outcome::Tough, None).unwrap();

        let all: Vec<_> = store
            .recent_sessions(SessionFilter::All, 10)
            .unwrap()
            .into_iter()
            .map(|s| s.scenario)
            .collect();
        assert_eq!(all, vec!["new", "mid", "old"]);

        let wins = store.recent_sessions(SessionFilter::Wins, 10).unwrap();
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].id, old.id);

        let pending = store.recent_sessions(SessionFilter::Pending, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, new.id);

        assert_eq!(store.count_sessions(SessionFilter::Logged).unwrap(), 2);
        assert_eq!(store.recent_sessions(SessionFilter::All, 2).unwrap().len(), 2);
        assert!(store.recent_sessions(SessionFilter::All, 0).unwrap().is_empty());
    }

    #[test]
    fn outcome_can_only_be_logged_once() {
        let store = SqliteHypeStore::open_in_memory().unwrap();
        let s = session_at(0, "Custom");
        store.insert_session(&s).unwrap();

        store
            .update_outcome(s.id, Outcome::Win, Some(" crushed it "))
            .unwrap();
        let err = store.update_outcome(s.id, Outcome::Meh, None).unwrap_err();
        assert!(matches!(err, StoreError::OutcomeAlreadyLogged(id) if id == s.id));

        let loaded = store.session(s.id).unwrap().unwrap();
        assert_eq!(loaded.outcome, Some(Outcome::Win));
        assert_eq!(loaded.outcome_notes.as_deref(), Some("crushed it"));
    }

    #[test]
    fn update_outcome_on_missing_session_is_not_found() {
        let store = SqliteHypeStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        let err = store.update_outcome(id, Outcome::Win, None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(missing) if missing == id));
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let store = SqliteHypeStore::open_in_memory().unwrap();
        let s = session_at(0, "Custom");
        store.insert_session(&s).unwrap();
        assert!(store.delete_session(s.id).unwrap());
        assert!(!store.delete_session(s.id).unwrap());
        assert_eq!(store.count_sessions(SessionFilter::All).unwrap(), 0);
    }

    #[test]
    fn profile_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hype.db");
        let mut profile = UserProfile::new(5, Utc::now());
        profile.total_hypes = 12;
        profile.unlocked_personas.insert(Persona::Boost);

        {
            let store = SqliteHypeStore::open(&path).unwrap();
            assert!(store.load_profile().unwrap().is_none());
            store.save_profile(&profile).unwrap();
            profile.total_wins = 3;
            store.save_profile(&profile).unwrap();
        }

        let store = SqliteHypeStore::open(&path).unwrap();
        let loaded = store.load_profile().unwrap().unwrap();
        assert_eq!(loaded, profile);
    }
}
