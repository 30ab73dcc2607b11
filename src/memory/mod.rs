//! Personalization memory: recent wins and outcome statistics.
//!
//! Memory context is an enhancement, never a precondition for generating a
//! hype, so every read here swallows store failures, logs them, and returns
//! an empty or zero value instead.

use std::sync::Arc;

use crate::session::HypeSession;
use crate::store::{HypeStore, SessionFilter};

/// Most past wins a free-tier caller ever receives.
pub const FREE_TIER_MEMORY_CAP: usize = 3;

/// Default cap on pending-outcome sessions surfaced for logging.
pub const DEFAULT_PENDING_LIMIT: usize = 10;

/// Read-only view over the session store for prompt personalization.
#[derive(Clone)]
pub struct MemoryProvider {
    store: Arc<dyn HypeStore>,
    pending_limit: usize,
}

impl MemoryProvider {
    pub fn new(store: Arc<dyn HypeStore>) -> Self {
        Self {
            store,
            pending_limit: DEFAULT_PENDING_LIMIT,
        }
    }

    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit;
        self
    }

    /// `limit` for premium callers, `min(limit, 3)` otherwise.
    pub fn effective_limit(limit: usize, is_premium: bool) -> usize {
        if is_premium {
            limit
        } else {
            limit.min(FREE_TIER_MEMORY_CAP)
        }
    }

    /// Sessions logged as wins, most recent first.
    pub fn recent_wins(&self, limit: usize, is_premium: bool) -> Vec<HypeSession> {
        let effective = Self::effective_limit(limit, is_premium);
        match self.store.recent_sessions(SessionFilter::Wins, effective) {
            Ok(wins) => {
                tracing::debug!(count = wins.len(), limit = effective, "fetched recent wins");
                wins
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch recent wins; continuing without memory");
                Vec::new()
            }
        }
    }

    /// Sessions still waiting for an outcome, most recent first.
    pub fn pending_outcomes(&self) -> Vec<HypeSession> {
        self.store
            .recent_sessions(SessionFilter::Pending, self.pending_limit)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to fetch pending outcomes");
                Vec::new()
            })
    }

    /// Wins divided by sessions with any outcome; 0.0 when nothing is logged.
    pub fn win_rate(&self) -> f64 {
        let counts = self
            .store
            .count_sessions(SessionFilter::Logged)
            .and_then(|logged| Ok((logged, self.store.count_sessions(SessionFilter::Wins)?)));
        match counts {
            Ok((0, _)) => 0.0,
            Ok((logged, wins)) => wins as f64 / logged as f64,
            Err(e) => {
                tracing::warn!(error = %e, "failed to calculate win rate");
                0.0
            }
        }
    }

    pub fn total_sessions(&self) -> usize {
        self.store
            .count_sessions(SessionFilter::All)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to count sessions");
                0
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::persona::Persona;
    use crate::profile::UserProfile;
    use crate::session::Outcome;
    use crate::store::{SqliteHypeStore, StoreError};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn seeded(wins: usize, tough: usize, pending: usize) -> Arc<SqliteHypeStore> {
        let store = Arc::new(SqliteHypeStore::open_in_memory().unwrap());
        let base = Utc::now() - Duration::days(1);
        let mut minute = 0;
        let mut add = |outcome: Option<Outcome>| {
            minute += 1;
            let s = HypeSession::new_at(
                format!("scenario {minute}"),
                "input",
                "hype",
                Persona::Sparky,
                base + Duration::minutes(minute),
            )
            .unwrap();
            store.insert_session(&s).unwrap();
            if let Some(o) = outcome {
                store.update_outcome(s.id, o, None).unwrap();
            }
        };
        for _ in 0..wins {
            add(Some(Outcome::Win));
        }
        for _ in 0..tough {
            add(Some(Outcome::Tough));
        }
        for _ in 0..pending {
            add(None);
        }
        store
    }

    #[test]
    fn free_tier_is_capped_at_three() {
        let memory = MemoryProvider::new(seeded(6, 0, 0));
        assert_eq!(memory.recent_wins(5, false).len(), 3);
        assert_eq!(memory.recent_wins(2, false).len(), 2);
    }

    #[test]
    fn premium_is_bounded_by_limit_only() {
        let memory = MemoryProvider::new(seeded(6, 0, 0));
        assert_eq!(memory.recent_wins(5, true).len(), 5);
        assert_eq!(memory.recent_wins(10, true).len(), 6);
    }

    #[test]
    fn only_wins_most_recent_first() {
        let memory = MemoryProvider::new(seeded(2, 3, 1));
        let wins = memory.recent_wins(5, true);
        assert_eq!(wins.len(), 2);
        assert!(wins.iter().all(HypeSession::is_win));
        assert!(wins[0].created_at > wins[1].created_at);
    }

    #[test]
    fn empty_store_yields_empty_memory() {
        let memory = MemoryProvider::new(seeded(0, 0, 0));
        assert!(memory.recent_wins(5, true).is_empty());
        assert_eq!(memory.win_rate(), 0.0);
        assert_eq!(memory.total_sessions(), 0);
    }

    #[test]
    fn statistics_count_logged_outcomes() {
        let memory = MemoryProvider::new(seeded(1, 3, 2));
        assert!((memory.win_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(memory.total_sessions(), 6);
        assert_eq!(memory.pending_outcomes().len(), 2);
        assert_eq!(memory.clone().with_pending_limit(1).pending_outcomes().len(), 1);
    }

    struct BrokenStore;

    impl HypeStore for BrokenStore {
        fn insert_session(&self, _: &HypeSession) -> Result<(), StoreError> {
            Err(StoreError::Lock("broken".into()))
        }
        fn session(&self, _: Uuid) -> Result<Option<HypeSession>, StoreError> {
            Err(StoreError::Lock("broken".into()))
        }
        fn recent_sessions(
            &self,
            _: SessionFilter,
            _: usize,
        ) -> Result<Vec<HypeSession>, StoreError> {
            Err(StoreError::Lock("broken".into()))
        }
        fn count_sessions(&self, _: SessionFilter) -> Result<usize, StoreError> {
            Err(StoreError::Lock("broken".into()))
        }
        fn update_outcome(&self, id: Uuid, _: Outcome, _: Option<&str>) -> Result<(), StoreError> {
            Err(StoreError::NotFound(id))
        }
        fn delete_session(&self, _: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn load_profile(&self) -> Result<Option<UserProfile>, StoreError> {
            Ok(None)
        }
        fn save_profile(&self, _: &UserProfile) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn store_failures_degrade_to_empty() {
        let memory = MemoryProvider::new(Arc::new(BrokenStore));
        assert!(memory.recent_wins(5, true).is_empty());
        assert!(memory.pending_outcomes().is_empty());
        assert_eq!(memory.win_rate(), 0.0);
        assert_eq!(memory.total_sessions(), 0);
    }
}
