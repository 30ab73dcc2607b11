//! Google Generative Language (Gemini) REST client.

use async_trait::async_trait;

use super::{GenerationError, HypeGenerator};
use crate::config::GenerationConfig;

/// Build a `generateContent` request body for a single-turn text prompt.
pub fn build_request_body(prompt: &str, config: &GenerationConfig) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "temperature": config.temperature,
            "topP": config.top_p,
            "topK": config.top_k,
            "maxOutputTokens": config.max_output_tokens,
        },
    })
}

/// Concatenate the text parts of the first candidate.
///
/// Returns `None` when there is no candidate or its text is blank.
pub fn extract_text(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(serde_json::Value::as_str))
        .collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Gemini-backed [`HypeGenerator`].
///
/// Construction never fails. A missing API key or an HTTP client that cannot
/// be built is remembered and reported as
/// [`GenerationError::ModelUnavailable`] on every call.
pub struct GeminiClient {
    config: GenerationConfig,
    inner: Result<Ready, String>,
}

struct Ready {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig) -> Self {
        let inner = match config.resolved_api_key() {
            None => Err("no API key configured".to_owned()),
            Some(api_key) => reqwest::Client::builder()
                .timeout(config.timeout())
                .build()
                .map(|client| Ready { client, api_key })
                .map_err(|e| format!("HTTP client init failed: {e}")),
        };
        if let Err(reason) = &inner {
            tracing::warn!(reason = %reason, "Gemini client unavailable");
        }
        Self {
            config: config.clone(),
            inner,
        }
    }

    /// Whether calls can be attempted at all.
    pub fn is_available(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl HypeGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let ready = self
            .inner
            .as_ref()
            .map_err(|reason| GenerationError::ModelUnavailable(reason.clone()))?;

        tracing::debug!(model = %self.config.model, prompt_len = prompt.len(), "generating hype");

        let response = ready
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &ready.api_key)
            .json(&build_request_body(prompt, &self.config))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                GenerationError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            tracing::error!(status = %status, body = %body, "Gemini request returned error");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        let text = extract_text(&body).ok_or(GenerationError::EmptyResponse)?;
        tracing::debug!(len = text.len(), "hype generated");
        Ok(text)
    }
}
