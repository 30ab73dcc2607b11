//! Session records (completed hypes) and conversation turns.

use crate::persona::Persona;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How the user says a hyped-up moment went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Meh,
    Tough,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Meh => "meh",
            Self::Tough => "tough",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" => Ok(Self::Win),
            "meh" => Ok(Self::Meh),
            "tough" => Ok(Self::Tough),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// Session record rule violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("response text must not be empty")]
    EmptyResponse,

    #[error("outcome already logged for session {0}")]
    OutcomeAlreadyLogged(Uuid),
}

/// One completed hype interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypeSession {
    pub id: Uuid,
    /// Scenario label (free text; a scenario title or "Custom").
    pub scenario: String,
    /// What the user typed, may be empty.
    pub user_input: String,
    /// Generated hype text. Never empty.
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<Outcome>,
    pub outcome_notes: Option<String>,
    pub persona: Persona,
}

impl HypeSession {
    /// Create a record for a successful generation, timestamped now.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyResponse`] if `response` is blank.
    pub fn new(
        scenario: impl Into<String>,
        user_input: impl Into<String>,
        response: impl Into<String>,
        persona: Persona,
    ) -> Result<Self, SessionError> {
        Self::new_at(scenario, user_input, response, persona, Utc::now())
    }

    /// Like [`new`](Self::new) with an explicit creation time.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyResponse`] if `response` is blank.
    pub fn new_at(
        scenario: impl Into<String>,
        user_input: impl Into<String>,
        response: impl Into<String>,
        persona: Persona,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let response = response.into();
        if response.trim().is_empty() {
            return Err(SessionError::EmptyResponse);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            scenario: scenario.into(),
            user_input: user_input.into(),
            response,
            created_at,
            outcome: None,
            outcome_notes: None,
            persona,
        })
    }

    /// Record the outcome. Allowed exactly once per session.
    ///
    /// Blank notes are stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OutcomeAlreadyLogged`] on a second call.
    pub fn log_outcome(
        &mut self,
        outcome: Outcome,
        notes: Option<&str>,
    ) -> Result<(), SessionError> {
        if self.outcome.is_some() {
            return Err(SessionError::OutcomeAlreadyLogged(self.id));
        }
        self.outcome = Some(outcome);
        self.outcome_notes = normalize_notes(notes);
        Ok(())
    }

    pub fn is_win(&self) -> bool {
        self.outcome == Some(Outcome::Win)
    }

    /// No outcome logged yet.
    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Trim notes and drop them entirely when blank.
pub(crate) fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
}

/// Who said a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in an active chat session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}
