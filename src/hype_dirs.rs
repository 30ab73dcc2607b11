//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/hype-buddy/` | `~/.local/share/hype-buddy/` |
//! | Config | `~/Library/Application Support/hype-buddy/` | `~/.config/hype-buddy/` |
//!
//! Both can be overridden with `HYPE_BUDDY_DATA_DIR` and
//! `HYPE_BUDDY_CONFIG_DIR`.

use std::path::PathBuf;

const APP_DIR: &str = "hype-buddy";

/// Application data root directory (session database, logs).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HYPE_BUDDY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/hype-buddy-data"))
}

/// Application config directory (`config.toml`).
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HYPE_BUDDY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/hype-buddy-config"))
}

/// Default SQLite database path (`data_dir()/hype_buddy.db`).
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join("hype_buddy.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_lives_under_data_dir() {
        let db = default_db_path();
        assert!(db.starts_with(data_dir()));
        assert!(db.to_string_lossy().ends_with("hype_buddy.db"));
    }

    #[test]
    fn config_dir_is_app_scoped() {
        if std::env::var_os("HYPE_BUDDY_CONFIG_DIR").is_none() {
            assert!(config_dir().to_string_lossy().contains("hype-buddy"));
        }
    }
}
