//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::{FRAME_SIZE, OUTPUT_SAMPLE_RATE};

/// Environment variables consulted, in order, when no API key is configured.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Conversation language.  Selects the reply voice and the language the
/// persona is told to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Japanese,
}

impl Default for Language {
    fn default() -> Self {
        Self::English
    }
}

impl Language {
    /// Prebuilt voice used for speech in this language.
    ///
    /// ```
    /// use live_voice_chat::config::Language;
    ///
    /// assert_eq!(Language::English.voice(), "Fenrir");
    /// assert_eq!(Language::Japanese.voice(), "Charon");
    /// ```
    pub fn voice(&self) -> &'static str {
        match self {
            Language::English => "Fenrir",
            Language::Japanese => "Charon",
        }
    }

    /// ISO-639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Japanese => "ja",
        }
    }

    /// Parse an ISO code or English name, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Language::English),
            "ja" | "jp" | "japanese" => Some(Language::Japanese),
            _ => None,
        }
    }

    fn respond_in(&self) -> &'static str {
        match self {
            Language::English => "You must respond in English.",
            Language::Japanese => "You must respond in Japanese. 必ず日本語で応答してください。",
        }
    }
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Settings for the request/response REST calls (text replies and speech).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the generative-language API, without trailing slash.
    pub base_url: String,
    /// API key.  `None` falls back to the `GEMINI_API_KEY` / `API_KEY`
    /// environment variables.
    pub api_key: Option<String>,
    /// Model used for text replies.
    pub text_model: String,
    /// Model used for one-shot speech synthesis.
    pub tts_model: String,
    /// Ground text replies with web search results.
    pub search_grounding: bool,
    /// Maximum seconds to wait for a response.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            text_model: "gemini-2.5-flash".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            search_grounding: true,
            timeout_secs: 60,
        }
    }
}

impl ApiConfig {
    /// The configured key, or the first non-empty key found in the
    /// environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|var| std::env::var(var).ok())
                    .find(|k| !k.is_empty())
            })
    }
}

// ---------------------------------------------------------------------------
// LiveConfig
// ---------------------------------------------------------------------------

/// Settings for the bidirectional live stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint; the API key is appended as `?key=…`.
    pub ws_url: String,
    /// Native-audio model for live conversations.
    pub model: String,
    /// Outbound frames that may queue before new ones are dropped.
    pub outbound_capacity: usize,
    /// Seconds allowed for the WebSocket connection, and for the session to
    /// see the setup acknowledged after it starts.
    pub connect_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
            outbound_capacity: 64,
            connect_timeout_secs: 15,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Stream formats on both sides of the live session.
///
/// Outbound frames are always 16 kHz mono PCM16, so there is no capture
/// rate setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of inbound reply audio in Hz (the backend sends 24 000).
    pub output_sample_rate: u32,
    /// Samples per outbound frame.  Zero is replaced by the default on load.
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_size: FRAME_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use live_voice_chat::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Conversation language.
    pub language: Language,
    /// Base persona instruction; the language suffix is appended by
    /// [`AppConfig::system_instruction`].
    pub persona: String,
    /// REST settings.
    pub api: ApiConfig,
    /// Live stream settings.
    pub live: LiveConfig,
    /// Audio stream formats.
    pub audio: AudioConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            persona: "You are a lively conversation partner. Stay in character, speak in a \
                      confident and direct style, and keep responses concise and impactful."
                .into(),
            api: ApiConfig::default(),
            live: LiveConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl AppConfig {
    /// Persona text followed by the respond-in-language instruction.
    pub fn system_instruction(&self) -> String {
        format!("{} {}", self.persona.trim(), self.language.respond_in())
    }

    /// Voice for the current language.
    pub fn voice(&self) -> &'static str {
        self.language.voice()
    }

    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.sanitize();
        Ok(config)
    }

    /// Replace values that cannot run with their defaults.
    fn sanitize(&mut self) {
        if self.audio.frame_size == 0 {
            log::warn!("audio.frame_size = 0 is invalid; using {FRAME_SIZE}");
            self.audio.frame_size = FRAME_SIZE;
        }
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.language, loaded.language);
        assert_eq!(original.persona, loaded.persona);
        assert_eq!(original.api.base_url, loaded.api.base_url);
        assert_eq!(original.api.text_model, loaded.api.text_model);
        assert_eq!(original.api.tts_model, loaded.api.tts_model);
        assert_eq!(original.live.ws_url, loaded.live.ws_url);
        assert_eq!(original.live.model, loaded.live.model);
        assert_eq!(original.audio.frame_size, loaded.audio.frame_size);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.language, Language::English);
        assert_eq!(config.audio.frame_size, 4096);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "language = \"japanese\"\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.language, Language::Japanese);
        assert_eq!(config.voice(), "Charon");
        assert_eq!(config.audio.output_sample_rate, 24_000);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.audio.output_sample_rate, 24_000);
        assert_eq!(cfg.audio.frame_size, 4096);
        assert_eq!(cfg.api.text_model, "gemini-2.5-flash");
        assert!(cfg.api.api_key.is_none());
        assert_eq!(cfg.voice(), "Fenrir");
    }

    #[test]
    fn system_instruction_appends_language() {
        let mut cfg = AppConfig::default();
        cfg.persona = "Be brief.".into();
        assert_eq!(cfg.system_instruction(), "Be brief. You must respond in English.");

        cfg.language = Language::Japanese;
        assert!(cfg.system_instruction().starts_with("Be brief. You must respond in Japanese."));
    }

    #[test]
    fn language_codes() {
        assert_eq!(Language::from_code("EN"), Some(Language::English));
        assert_eq!(Language::from_code("japanese"), Some(Language::Japanese));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::Japanese.code(), "ja");
    }

    #[test]
    fn configured_api_key_wins() {
        let api = ApiConfig {
            api_key: Some("k-123".into()),
            ..ApiConfig::default()
        };
        assert_eq!(api.resolve_api_key().as_deref(), Some("k-123"));
    }

    #[test]
    fn zero_frame_size_falls_back_to_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[audio]\nframe_size = 0\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.audio.frame_size, FRAME_SIZE);
    }

    #[test]
    fn legacy_capture_rate_key_is_ignored() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("legacy.toml");
        std::fs::write(
            &path,
            "[audio]\ncapture_sample_rate = 44100\nframe_size = 2048\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.audio.frame_size, 2048);
        assert!(!toml::to_string(&config).unwrap().contains("capture_sample_rate"));
    }
}
