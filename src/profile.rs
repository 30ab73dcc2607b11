//! User profile: usage counters, weekly quota, persona unlocks.

use crate::error::{HypeError, Result};
use crate::persona::Persona;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Aggregate counters for the single local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    /// Free hypes left in the current quota period.
    pub free_uses_remaining: u32,
    /// Start of the current quota period.
    pub quota_period_start: DateTime<Utc>,
    /// Mirror of the entitlement provider's flag at last refresh.
    pub is_premium: bool,
    pub selected_persona: Persona,
    /// Grows monotonically; never shrinks.
    pub unlocked_personas: BTreeSet<Persona>,
    pub total_hypes: u32,
    pub total_wins: u32,
    pub created_at: DateTime<Utc>,
}

/// Progress toward the next locked persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockProgress {
    pub persona: Persona,
    pub current: u32,
    pub required: u32,
}

impl UserProfile {
    /// Fresh profile with a full allotment and only the default persona.
    pub fn new(allotment: u32, now: DateTime<Utc>) -> Self {
        let mut unlocked = BTreeSet::new();
        unlocked.insert(Persona::default());
        let mut profile = Self {
            id: Uuid::new_v4(),
            free_uses_remaining: allotment,
            quota_period_start: now,
            is_premium: false,
            selected_persona: Persona::default(),
            unlocked_personas: unlocked,
            total_hypes: 0,
            total_wins: 0,
            created_at: now,
        };
        profile.apply_unlocks();
        profile
    }

    /// Reset the quota when `now` falls in a different ISO week than the
    /// stored period start. Returns `true` when a reset happened.
    pub fn refresh_quota(&mut self, allotment: u32, now: DateTime<Utc>) -> bool {
        if same_quota_period(self.quota_period_start, now) {
            return false;
        }
        self.free_uses_remaining = allotment;
        self.quota_period_start = now;
        true
    }

    /// Premium, or free uses left.
    pub fn can_generate(&self) -> bool {
        self.is_premium || self.free_uses_remaining > 0
    }

    /// Count one generation. Returns personas unlocked by this call.
    pub fn use_hype(&mut self) -> Vec<Persona> {
        self.reserve_free_use();
        self.record_hype()
    }

    /// Take one free use ahead of a generation. Returns `false` when nothing
    /// was taken (premium, or none left).
    pub fn reserve_free_use(&mut self) -> bool {
        if self.is_premium || self.free_uses_remaining == 0 {
            return false;
        }
        self.free_uses_remaining -= 1;
        true
    }

    /// Give back a reserved free use, never exceeding `allotment`.
    pub fn release_free_use(&mut self, allotment: u32) {
        self.free_uses_remaining = self.free_uses_remaining.saturating_add(1).min(allotment);
    }

    /// Count a completed generation without touching the quota.
    pub fn record_hype(&mut self) -> Vec<Persona> {
        self.total_hypes = self.total_hypes.saturating_add(1);
        self.apply_unlocks()
    }

    pub fn record_win(&mut self) {
        self.total_wins = self.total_wins.saturating_add(1);
    }

    /// Undo a win when its session is deleted.
    pub fn revoke_win(&mut self) {
        self.total_wins = self.total_wins.saturating_sub(1);
    }

    pub fn is_unlocked(&self, persona: Persona) -> bool {
        self.unlocked_personas.contains(&persona)
    }

    /// # Errors
    ///
    /// Returns [`HypeError::PersonaLocked`] if `persona` is not unlocked.
    pub fn select_persona(&mut self, persona: Persona) -> Result<()> {
        if !self.is_unlocked(persona) {
            return Err(HypeError::PersonaLocked(persona.id().to_owned()));
        }
        self.selected_persona = persona;
        Ok(())
    }

    /// The first persona (in unlock order) that is still locked.
    pub fn next_unlock_progress(&self) -> Option<UnlockProgress> {
        Persona::ALL
            .into_iter()
            .find(|p| !self.is_unlocked(*p))
            .map(|p| UnlockProgress {
                persona: p,
                current: self.total_hypes,
                required: p.unlock_threshold(),
            })
    }

    fn apply_unlocks(&mut self) -> Vec<Persona> {
        let mut newly = Vec::new();
        for persona in Persona::ALL {
            if self.total_hypes >= persona.unlock_threshold()
                && self.unlocked_personas.insert(persona)
            {
                newly.push(persona);
            }
        }
        newly
    }
}

/// Whether `a` and `b` share an ISO week (year included).
fn same_quota_period(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.iso_week() == b.iso_week()
}
