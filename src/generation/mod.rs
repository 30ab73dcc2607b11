//! Hype text generation.
//!
//! [`HypeGenerator`] is the seam between orchestration and the remote model;
//! [`GeminiClient`] is the shipped implementation. Generators never retry:
//! a failed call is reported once and the caller decides what to do.

pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;

/// Typed failures from a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The client could not be initialized (missing key, bad TLS setup, ...).
    #[error("AI model not initialized: {0}")]
    ModelUnavailable(String),

    /// The call succeeded but carried no usable text.
    #[error("AI returned an empty response")]
    EmptyResponse,

    /// Network failure or timeout.
    #[error("generation request failed: {0}")]
    Request(String),

    /// Non-2xx response.
    #[error("generation backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be parsed.
    #[error("malformed generation response: {0}")]
    Decode(String),
}

impl GenerationError {
    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelUnavailable(_) => "Hype engine isn't set up. Check your API key.".to_owned(),
            Self::EmptyResponse => "Came up empty that time. Try again!".to_owned(),
            Self::Request(_) => "Couldn't reach the hype engine. Check your connection.".to_owned(),
            Self::Status { status, .. } => format!("Hype engine error ({status}). Try again!"),
            Self::Decode(_) => "Got a garbled reply. Try again!".to_owned(),
        }
    }
}

/// Produces response text for a fully built prompt.
#[async_trait]
pub trait HypeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
