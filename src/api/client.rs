//! `TextGenerator` / `SpeechSynthesizer` traits and the `GeminiClient`
//! implementation of both.
//!
//! `GeminiClient` calls the `models/{model}:generateContent` REST endpoint.
//! Connection details come from [`ApiConfig`]; the key is sent in the
//! `x-goog-api-key` header.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{speech_request, text_request, GenerateResponse, Reply};
use crate::audio::text_to_bytes;
use crate::config::ApiConfig;

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the text and speech endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport, connection or non-success status.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    /// The response body was not the expected JSON.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// A speech response carried no inline audio.
    #[error("no audio data received from speech synthesis")]
    NoAudio,

    #[error("no API key configured (set GEMINI_API_KEY or api.api_key)")]
    MissingApiKey,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One-shot text generation.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn TextGenerator>`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<Reply, ApiError>;
}

/// Text to raw PCM16 (24 kHz mono) speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ApiError>;
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: reqwest::Client,
    config: ApiConfig,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from config.  Fails only when no API key is found.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let api_key = config.resolve_api_key().ok_or(ApiError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn post(&self, model: &str, body: &serde_json::Value) -> Result<GenerateResponse, ApiError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::Request(format!("{status}: {}", detail.trim())));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<Reply, ApiError> {
        let body = text_request(prompt, system_instruction, self.config.search_grounding);
        let response = self.post(&self.config.text_model, &body).await?;

        let reply = Reply {
            text: response.text(),
            sources: response.sources(),
        };
        log::debug!(
            "text reply: {} chars, {} sources",
            reply.text.len(),
            reply.sources.len()
        );
        Ok(reply)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ApiError> {
        let body = speech_request(text, voice);
        let response = self.post(&self.config.tts_model, &body).await?;

        let data = response.inline_audio().ok_or(ApiError::NoAudio)?;
        text_to_bytes(data).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(api_key: Option<&str>) -> ApiConfig {
        ApiConfig {
            base_url: "https://generativelanguage.googleapis.com/".into(),
            api_key: api_key.map(|s| s.to_string()),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn from_config_with_key() {
        let client = GeminiClient::from_config(&make_config(Some("k-123"))).unwrap();
        assert_eq!(client.api_key, "k-123");
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let client = GeminiClient::from_config(&make_config(Some("k"))).unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    /// Verify that `GeminiClient` is usable behind both trait objects.
    #[test]
    fn client_is_object_safe() {
        let client = std::sync::Arc::new(GeminiClient::from_config(&make_config(Some("k"))).unwrap());
        let _text: std::sync::Arc<dyn TextGenerator> = client.clone();
        let _speech: std::sync::Arc<dyn SpeechSynthesizer> = client;
    }

    #[test]
    fn error_messages() {
        assert_eq!(ApiError::Timeout.to_string(), "request timed out");
        assert_eq!(
            ApiError::NoAudio.to_string(),
            "no audio data received from speech synthesis"
        );
    }
}
