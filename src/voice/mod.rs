//! Voice delivery: remote synthesis with on-device fallback.
//!
//! Sub-modules:
//! - `sanitize`: emoji stripping before synthesis.
//! - `remote`: OpenAI-compatible speech endpoint client.
//! - `local`: on-device synthesizer seam, voice selection, command backend.
//! - `playback`: audio player and audio-focus seams, command player.
//! - `pipeline`: [`VoiceDelivery`], which ties the above together.

pub mod local;
pub mod pipeline;
pub mod playback;
pub mod remote;
pub mod sanitize;

pub use local::{
    CommandSynthesizer, LocalSynthesizer, Utterance, VoiceInfo, VoiceQuality, select_voice,
};
pub use pipeline::{Backend, PlaybackHandle, PlaybackOutcome, VoiceDelivery, VoiceStatus};
pub use playback::{AudioFocus, AudioPlayer, CommandPlayer, NoopAudioFocus};
pub use remote::RemoteTts;
pub use sanitize::strip_emoji;

/// Errors from speech synthesis and playback.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("speech backend not configured: {0}")]
    NotConfigured(String),

    #[error("speech request failed: {0}")]
    Request(String),

    #[error("speech endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("speech endpoint returned no audio")]
    EmptyAudio,

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio output unavailable: {0}")]
    AudioFocus(String),
}
