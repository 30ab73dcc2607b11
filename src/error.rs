//! Error types for the hype pipeline.
//!
//! Voice and capture failures never surface here: playback reports a
//! `PlaybackOutcome` and a chat session turns capture errors into its error
//! state.

use crate::generation::GenerationError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Top-level error type for hype generation and delivery.
#[derive(Debug, thiserror::Error)]
pub enum HypeError {
    /// Language model call failed or could not be made.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Session / profile persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Session record rule violated (empty response, second outcome log).
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Free-tier allotment for the current week is used up.
    #[error("no free hypes left this week")]
    QuotaExhausted,

    /// The requested persona has not been unlocked yet.
    #[error("persona '{0}' is locked")]
    PersonaLocked(String),

    /// Neither a scenario nor free text was supplied.
    #[error("a scenario or some text describing the moment is required")]
    EmptyRequest,

    /// No session exists with the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HypeError>;
