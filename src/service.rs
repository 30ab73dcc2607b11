//! Single-shot hype flow, outcome logging, history, and stats.
//!
//! [`HypeService`] is the only place the user profile is mutated. Every
//! profile change is written back to the store before the call returns.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::SpeechRecognizer;
use crate::config::HypeConfig;
use crate::entitlement::Entitlements;
use crate::error::{HypeError, Result};
use crate::generation::HypeGenerator;
use crate::memory::MemoryProvider;
use crate::orchestrator::{ChatDeps, ChatHandle, ChatOptions, ChatSession, Modality};
use crate::persona::Persona;
use crate::profile::{UnlockProgress, UserProfile};
use crate::prompt::build_hype_prompt;
use crate::reminder::{Reminder, ReminderScheduler};
use crate::scenario::Scenario;
use crate::session::{HypeSession, Outcome, SessionError};
use crate::store::{HypeStore, SessionFilter, StoreError};
use crate::voice::VoiceDelivery;

/// Scenario label stored when only free text was given.
pub const CUSTOM_SCENARIO_LABEL: &str = "Custom";

/// What to hype.
#[derive(Debug, Clone, Default)]
pub struct HypeRequest {
    pub scenario: Option<Scenario>,
    pub free_text: Option<String>,
    /// Overrides the profile's selected persona for this request.
    pub persona: Option<Persona>,
}

impl HypeRequest {
    pub fn scenario(scenario: Scenario) -> Self {
        Self {
            scenario: Some(scenario),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            free_text: Some(text.into()),
            ..Self::default()
        }
    }

    fn trimmed_text(&self) -> Option<&str> {
        self.free_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// A persisted hype plus any personas it unlocked.
#[derive(Debug, Clone)]
pub struct GeneratedHype {
    pub session: HypeSession,
    pub newly_unlocked: Vec<Persona>,
}

/// Usage summary.
#[derive(Debug, Clone, PartialEq)]
pub struct HypeStats {
    pub total_hypes: u32,
    pub total_wins: u32,
    /// Wins over sessions with a logged outcome.
    pub win_rate: f64,
    pub total_sessions: usize,
    pub free_uses_remaining: u32,
    pub is_premium: bool,
    pub next_unlock: Option<UnlockProgress>,
}

/// Collaborators for [`HypeService`].
pub struct ServiceDeps {
    pub store: Arc<dyn HypeStore>,
    pub generator: Arc<dyn HypeGenerator>,
    pub reminders: Arc<dyn ReminderScheduler>,
    pub entitlements: Arc<dyn Entitlements>,
    pub voice: Option<Arc<VoiceDelivery>>,
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
}

pub struct HypeService {
    config: HypeConfig,
    store: Arc<dyn HypeStore>,
    memory: MemoryProvider,
    generator: Arc<dyn HypeGenerator>,
    reminders: Arc<dyn ReminderScheduler>,
    entitlements: Arc<dyn Entitlements>,
    voice: Option<Arc<VoiceDelivery>>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    profile: Mutex<UserProfile>,
}

impl HypeService {
    /// Load the stored profile, creating and saving a fresh one on first run.
    ///
    /// # Errors
    ///
    /// Returns [`HypeError::Store`] if the profile cannot be read or written.
    pub fn new(config: HypeConfig, deps: ServiceDeps) -> Result<Self> {
        let profile = match deps.store.load_profile()? {
            Some(profile) => profile,
            None => {
                let profile = UserProfile::new(config.quota.free_hypes_per_week, Utc::now());
                deps.store.save_profile(&profile)?;
                info!(id = %profile.id, "created user profile");
                profile
            }
        };
        let memory =
            MemoryProvider::new(Arc::clone(&deps.store)).with_pending_limit(config.memory.pending_limit);

        Ok(Self {
            config,
            store: deps.store,
            memory,
            generator: deps.generator,
            reminders: deps.reminders,
            entitlements: deps.entitlements,
            voice: deps.voice,
            recognizer: deps.recognizer,
            profile: Mutex::new(profile),
        })
    }

    pub fn config(&self) -> &HypeConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryProvider {
        &self.memory
    }

    pub fn voice(&self) -> Option<&Arc<VoiceDelivery>> {
        self.voice.as_ref()
    }

    /// Current profile with the quota period and premium flag refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`HypeError::Store`] if a refreshed profile cannot be saved.
    pub fn profile(&self) -> Result<UserProfile> {
        let mut profile = self.lock_profile()?;
        self.refresh(&mut profile)?;
        Ok(profile.clone())
    }

    /// Generate, persist, and count one single-shot hype.
    ///
    /// A free use is reserved before the generator is awaited, so concurrent
    /// calls cannot overspend the weekly quota. It is given back if the hype
    /// is not produced.
    ///
    /// # Errors
    ///
    /// - [`HypeError::QuotaExhausted`] when a free-tier user has no hypes left.
    /// - [`HypeError::EmptyRequest`] when neither scenario nor text is given.
    /// - [`HypeError::PersonaLocked`] for a persona not yet unlocked.
    /// - [`HypeError::Generation`] when the backend fails; nothing is counted.
    /// - [`HypeError::Store`] when the session or profile cannot be saved.
    pub async fn generate_hype(&self, request: HypeRequest) -> Result<GeneratedHype> {
        let (persona, premium, reserved) = {
            let mut profile = self.lock_profile()?;
            self.refresh(&mut profile)?;
            if !profile.can_generate() {
                return Err(HypeError::QuotaExhausted);
            }
            if request.scenario.is_none() && request.trimmed_text().is_none() {
                return Err(HypeError::EmptyRequest);
            }
            let persona = request.persona.unwrap_or(profile.selected_persona);
            if !profile.is_unlocked(persona) {
                return Err(HypeError::PersonaLocked(persona.id().to_owned()));
            }
            let reserved = profile.reserve_free_use();
            (persona, profile.is_premium, reserved)
        };

        let session = match self.produce_session(&request, persona, premium).await {
            Ok(session) => session,
            Err(e) => {
                if reserved {
                    self.release_free_use();
                }
                return Err(e);
            }
        };

        let newly_unlocked = {
            let mut profile = self.lock_profile()?;
            let unlocked = profile.record_hype();
            self.store.save_profile(&profile)?;
            unlocked
        };
        for persona in &newly_unlocked {
            info!(persona = %persona, "persona unlocked");
        }

        if self.config.reminder.enabled {
            self.reminders.schedule(Reminder {
                session_id: session.id,
                scenario: session.scenario.clone(),
                delay: self.config.reminder.delay(),
            });
        }

        info!(id = %session.id, scenario = %session.scenario, persona = %persona, "hype generated");
        Ok(GeneratedHype {
            session,
            newly_unlocked,
        })
    }

    /// Build the prompt, call the generator, and store the new session.
    async fn produce_session(
        &self,
        request: &HypeRequest,
        persona: Persona,
        premium: bool,
    ) -> Result<HypeSession> {
        let free_text = request.trimmed_text();
        let memory = self
            .memory
            .recent_wins(self.config.memory.recent_wins_limit, premium);
        let prompt = build_hype_prompt(persona, request.scenario, free_text, &memory);
        debug!(
            persona = %persona,
            scenario = request.scenario.map(Scenario::id),
            memory = memory.len(),
            "generating hype"
        );

        let response = self.generator.generate(&prompt).await?;

        let label = request
            .scenario
            .map_or(CUSTOM_SCENARIO_LABEL, Scenario::title);
        let user_input = match (free_text, request.scenario) {
            (Some(text), _) => text.to_owned(),
            (None, Some(scenario)) => scenario.title().to_owned(),
            (None, None) => String::new(),
        };
        let session = HypeSession::new(label, user_input, response, persona)?;
        self.store.insert_session(&session)?;
        Ok(session)
    }

    /// Return a reserved free use after a failed generation.
    fn release_free_use(&self) {
        let Ok(mut profile) = self.lock_profile() else {
            return;
        };
        profile.release_free_use(self.config.quota.free_hypes_per_week);
        if let Err(e) = self.store.save_profile(&profile) {
            warn!(error = %e, "could not save refunded quota");
        }
    }

    /// Record how a hyped moment went. Allowed once per session.
    ///
    /// # Errors
    ///
    /// - [`HypeError::SessionNotFound`] for an unknown id.
    /// - [`HypeError::Session`] with `OutcomeAlreadyLogged` on a second log.
    pub fn log_outcome(&self, id: Uuid, outcome: Outcome, notes: Option<&str>) -> Result<()> {
        match self.store.update_outcome(id, outcome, notes) {
            Ok(()) => {}
            Err(StoreError::NotFound(id)) => return Err(HypeError::SessionNotFound(id.to_string())),
            Err(StoreError::OutcomeAlreadyLogged(id)) => {
                return Err(SessionError::OutcomeAlreadyLogged(id).into());
            }
            Err(e) => return Err(e.into()),
        }
        self.reminders.cancel(id);

        if outcome == Outcome::Win {
            let mut profile = self.lock_profile()?;
            profile.record_win();
            self.store.save_profile(&profile)?;
        }
        info!(%id, %outcome, "outcome logged");
        Ok(())
    }

    /// Delete a session. Deleting a win also takes it off the win count.
    ///
    /// # Errors
    ///
    /// [`HypeError::SessionNotFound`] for an unknown id.
    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        let Some(session) = self.store.session(id)? else {
            return Err(HypeError::SessionNotFound(id.to_string()));
        };
        if !self.store.delete_session(id)? {
            return Err(HypeError::SessionNotFound(id.to_string()));
        }
        self.reminders.cancel(id);

        if session.is_win() {
            let mut profile = self.lock_profile()?;
            profile.revoke_win();
            self.store.save_profile(&profile)?;
        }
        info!(%id, "session deleted");
        Ok(())
    }

    /// Sessions newest first. Free tier only sees its most recent few.
    ///
    /// # Errors
    ///
    /// [`HypeError::Store`] on read failure.
    pub fn history(&self, filter: SessionFilter) -> Result<Vec<HypeSession>> {
        let limit = if self.entitlements.is_premium() {
            usize::MAX
        } else {
            self.config.quota.free_history_limit
        };
        Ok(self.store.recent_sessions(filter, limit)?)
    }

    /// Sessions still waiting for an outcome, newest first.
    pub fn pending_outcomes(&self) -> Vec<HypeSession> {
        self.memory.pending_outcomes()
    }

    /// # Errors
    ///
    /// [`HypeError::Store`] if the refreshed profile cannot be saved.
    pub fn stats(&self) -> Result<HypeStats> {
        let profile = self.profile()?;
        Ok(HypeStats {
            total_hypes: profile.total_hypes,
            total_wins: profile.total_wins,
            win_rate: self.memory.win_rate(),
            total_sessions: self.memory.total_sessions(),
            free_uses_remaining: profile.free_uses_remaining,
            is_premium: profile.is_premium,
            next_unlock: profile.next_unlock_progress(),
        })
    }

    /// Make `persona` the default for future hypes.
    ///
    /// # Errors
    ///
    /// [`HypeError::PersonaLocked`] if it has not been unlocked.
    pub fn select_persona(&self, persona: Persona) -> Result<()> {
        let mut profile = self.lock_profile()?;
        profile.select_persona(persona)?;
        self.store.save_profile(&profile)?;
        if let Some(voice) = &self.voice {
            voice.set_persona(persona);
        }
        Ok(())
    }

    /// Start a conversational session with the selected persona.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a lock error if the profile mutex is poisoned.
    pub fn start_chat(&self, modality: Modality, voice_output: bool) -> Result<ChatHandle> {
        let persona = self.lock_profile()?.selected_persona;
        let deps = ChatDeps {
            generator: Arc::clone(&self.generator),
            memory: self.memory.clone(),
            entitlements: Arc::clone(&self.entitlements),
            recognizer: self.recognizer.clone(),
            voice: self.voice.clone(),
        };
        let options = ChatOptions {
            persona,
            modality,
            voice_output,
            memory_limit: self.config.memory.recent_wins_limit,
        };
        Ok(ChatSession::spawn(deps, options))
    }

    /// Apply the weekly reset and mirror the entitlement flag, saving on change.
    fn refresh(&self, profile: &mut UserProfile) -> Result<()> {
        let premium = self.entitlements.is_premium();
        let mut changed = profile.is_premium != premium;
        profile.is_premium = premium;
        if profile.refresh_quota(self.config.quota.free_hypes_per_week, Utc::now()) {
            info!(allotment = self.config.quota.free_hypes_per_week, "weekly quota reset");
            changed = true;
        }
        if changed {
            self.store.save_profile(profile)?;
        }
        Ok(())
    }

    fn lock_profile(&self) -> Result<MutexGuard<'_, UserProfile>> {
        self.profile.lock().map_err(|e| {
            warn!("profile lock poisoned");
            HypeError::Store(StoreError::Lock(e.to_string()))
        })
    }
}
