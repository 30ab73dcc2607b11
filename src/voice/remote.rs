//! Remote speech synthesis over an OpenAI-compatible `/v1/audio/speech` API.

use bytes::Bytes;

use super::TtsError;
use crate::config::TtsConfig;

/// Build the JSON body for a speech request.
pub fn build_speech_request(
    model: &str,
    input: &str,
    voice: &str,
    speed: f32,
    response_format: &str,
) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "input": input,
        "voice": voice,
        "speed": speed,
        "response_format": response_format,
    })
}

/// Client for a remote speech endpoint.
#[derive(Debug, Clone)]
pub struct RemoteTts {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    response_format: String,
}

impl RemoteTts {
    /// # Errors
    ///
    /// Returns [`TtsError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        config: &TtsConfig,
    ) -> Result<Self, TtsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TtsError::NotConfigured(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: config.remote_model.clone(),
            response_format: config.response_format.clone(),
        })
    }

    /// `None` when no endpoint is configured. Not an error: the local path
    /// simply becomes the only path.
    pub fn from_config(config: &TtsConfig) -> Option<Self> {
        let (url, key) = config.remote_endpoint()?;
        match Self::new(url, key, config) {
            Ok(tts) => Some(tts),
            Err(e) => {
                tracing::warn!(error = %e, "remote TTS disabled");
                None
            }
        }
    }

    pub fn response_format(&self) -> &str {
        &self.response_format
    }

    /// Synthesize `text` and return the encoded audio.
    pub async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Bytes, TtsError> {
        let url = format!("{}/v1/audio/speech", self.base_url.trim_end_matches('/'));
        let body = build_speech_request(&self.model, text, voice, speed, &self.response_format);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            return Err(TtsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;
        if audio.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        tracing::debug!(bytes = audio.len(), voice, "remote speech synthesized");
        Ok(audio)
    }
}
