//! SQLite DDL for the hype store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Schema version written to fresh databases.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the hype database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per completed hype.
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    scenario      TEXT NOT NULL,
    user_input    TEXT NOT NULL DEFAULT '',
    response      TEXT NOT NULL,
    persona       TEXT NOT NULL,
    created_at    INTEGER NOT NULL,   -- epoch millis
    outcome       TEXT,               -- NULL until logged
    outcome_notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
CREATE INDEX IF NOT EXISTS idx_sessions_outcome    ON sessions(outcome);

-- Single-row profile table; the profile is stored as a JSON document.
CREATE TABLE IF NOT EXISTS profile (
    slot       INTEGER PRIMARY KEY CHECK (slot = 1),
    body       TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Apply the full schema and seed the version stamp on fresh databases.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the schema version, `None` when the stamp is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"sessions".to_owned()));
        assert!(tables.contains(&"profile".to_owned()));
        assert!(tables.contains(&"schema_meta".to_owned()));
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");
        apply_schema(&conn).expect("second apply_schema");
        let version = read_schema_version(&conn)
            .expect("read_schema_version")
            .expect("version should exist");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn schema_version_not_overwritten_on_reapply() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply");
        conn.execute(
            "UPDATE schema_meta SET value = '7' WHERE key = 'schema_version'",
            [],
        )
        .expect("bump version");
        apply_schema(&conn).expect("second apply");
        assert_eq!(read_schema_version(&conn).expect("read"), Some(7));
    }
}
