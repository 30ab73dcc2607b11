//! Configuration types for hype generation and delivery.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when `generation.api_key` is unset.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable consulted when `tts.remote_api_key` is unset.
pub const TTS_API_KEY_ENV: &str = "HYPE_TTS_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HypeConfig {
    /// Language model settings.
    pub generation: GenerationConfig,
    /// Text-to-speech settings (remote endpoint + on-device fallback).
    pub tts: TtsConfig,
    /// Free-tier usage limits.
    pub quota: QuotaConfig,
    /// Personalization memory settings.
    pub memory: MemoryConfig,
    /// Outcome reminder settings.
    pub reminder: ReminderConfig,
    /// Local session store settings.
    pub store: StoreConfig,
}

/// Generation backend configuration.
///
/// Sampling parameters are fixed per deployment, never negotiated per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the Generative Language API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key (falls back to `GEMINI_API_KEY`).
    pub api_key: Option<String>,
    /// Sampling temperature. High on purpose: hype should not sound canned.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Top-k sampling limit.
    pub top_k: u32,
    /// Maximum output tokens. Kept small since replies are spoken.
    pub max_output_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-2.5-flash-lite".to_owned(),
            api_key: None,
            temperature: 0.9,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 200,
            timeout_secs: 30,
        }
    }
}

impl GenerationConfig {
    /// API key from config or environment, ignoring blank values.
    pub fn resolved_api_key(&self) -> Option<String> {
        non_blank(self.api_key.clone()).or_else(|| non_blank(std::env::var(GEMINI_API_KEY_ENV).ok()))
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the remote speech endpoint. `None` disables remote synthesis.
    pub remote_url: Option<String>,
    /// API key for the remote endpoint (falls back to `HYPE_TTS_API_KEY`).
    pub remote_api_key: Option<String>,
    /// Model name sent to the remote endpoint.
    pub remote_model: String,
    /// Audio container requested from the remote endpoint.
    pub response_format: String,
    /// Remote request timeout in seconds.
    pub timeout_secs: u64,
    /// Locale used when picking an on-device voice.
    pub locale: String,
    /// Locale used when no voice exists for `locale`.
    pub default_locale: String,
    /// On-device synthesizer program (None = auto-detect).
    pub synth_program: Option<PathBuf>,
    /// Audio player program for remote audio (None = auto-detect).
    pub player_program: Option<PathBuf>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_api_key: None,
            remote_model: "tts-1".to_owned(),
            response_format: "mp3".to_owned(),
            timeout_secs: 20,
            locale: "en-US".to_owned(),
            default_locale: "en-US".to_owned(),
            synth_program: None,
            player_program: None,
        }
    }
}

impl TtsConfig {
    /// Remote endpoint `(base_url, api_key)` when both are present.
    ///
    /// Absence of either disables the remote path entirely; this is not an
    /// error.
    pub fn remote_endpoint(&self) -> Option<(String, String)> {
        let url = non_blank(self.remote_url.clone())?;
        let key = non_blank(self.remote_api_key.clone())
            .or_else(|| non_blank(std::env::var(TTS_API_KEY_ENV).ok()))?;
        Some((url, key))
    }

    /// Remote request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Free-tier usage limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Hypes a free user gets per ISO week.
    pub free_hypes_per_week: u32,
    /// How many history entries a free user can browse.
    pub free_history_limit: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_hypes_per_week: 5,
            free_history_limit: 10,
        }
    }
}

/// Personalization memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Requested number of past wins to inject (free tier is capped lower).
    pub recent_wins_limit: usize,
    /// Maximum pending-outcome sessions surfaced for logging.
    pub pending_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_wins_limit: 5,
            pending_limit: 10,
        }
    }
}

/// Outcome reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Whether a reminder is scheduled after each single-shot hype.
    pub enabled: bool,
    /// Delay before the reminder fires, in seconds.
    pub delay_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 2 * 60 * 60,
        }
    }
}

impl ReminderConfig {
    /// Reminder delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Local session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: crate::hype_dirs::default_db_path(),
        }
    }
}

impl HypeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::HypeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::HypeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `config_dir()/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::hype_dirs::config_dir().join("config.toml")
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is unreadable or invalid.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
