//! Speech recognition seam for voice-modality chat sessions.

use async_trait::async_trait;
use tokio::sync::watch;

/// Failures reported by a speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// Microphone or speech-recognition permission was refused.
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// No recognizer is available on this device.
    #[error("speech recognition unavailable: {0}")]
    Unavailable(String),

    #[error("speech recognition failed: {0}")]
    Failed(String),
}

impl CaptureError {
    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => "Microphone permission denied".to_owned(),
            Self::Unavailable(_) => "Speech recognition isn't available here".to_owned(),
            Self::Failed(_) => "Didn't catch that. Try again!".to_owned(),
        }
    }
}

/// Platform speech recognizer.
///
/// `start` begins listening and returns a live partial transcript; `finish`
/// stops listening and yields the final transcript; `cancel` discards
/// everything and must be safe when nothing is running.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start(&self) -> Result<watch::Receiver<String>, CaptureError>;

    async fn finish(&self) -> Result<String, CaptureError>;

    fn cancel(&self);
}
