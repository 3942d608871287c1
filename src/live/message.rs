//! Live stream wire messages.
//!
//! Inbound JSON is parsed into [`Inbound`]; the part the session cares
//! about is [`ServerMessage`], a flat set of independent signals.  Outbound
//! messages (the setup handshake and realtime audio input) are built as
//! `serde_json::Value`s.

use serde::Deserialize;
use serde_json::json;

use crate::audio::AudioFrame;
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// SessionSetup
// ---------------------------------------------------------------------------

/// Everything the backend needs to open a live conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub model: String,
    /// Prebuilt reply voice.
    pub voice: String,
    /// Persona plus respond-in-language instruction.
    pub system_instruction: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl SessionSetup {
    /// Audio replies in the configured voice with transcription enabled in
    /// both directions.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.live.model.clone(),
            voice: config.voice().to_string(),
            system_instruction: config.system_instruction(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

/// The first client message of a live connection.
pub fn setup_message(setup: &SessionSetup) -> serde_json::Value {
    let mut body = json!({
        "model": format!("models/{}", setup.model),
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": setup.voice }
                }
            }
        },
        "systemInstruction": {
            "parts": [{ "text": setup.system_instruction }]
        }
    });
    if setup.input_transcription {
        body["inputAudioTranscription"] = json!({});
    }
    if setup.output_transcription {
        body["outputAudioTranscription"] = json!({});
    }
    json!({ "setup": body })
}

/// Wrap one capture frame as realtime input.
pub fn realtime_input_message(frame: &AudioFrame) -> serde_json::Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": frame.mime_type,
                "data": frame.data
            }]
        }
    })
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Signals carried by one server message.  Any combination may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    /// base64 PCM16 reply audio.
    pub audio_chunk: Option<String>,
    /// Transcription delta of the user's speech.
    pub input_transcription: Option<String>,
    /// Transcription delta of the model's speech.
    pub output_transcription: Option<String>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl ServerMessage {
    pub fn audio(chunk: impl Into<String>) -> Self {
        Self {
            audio_chunk: Some(chunk.into()),
            ..Self::default()
        }
    }

    pub fn input_delta(text: impl Into<String>) -> Self {
        Self {
            input_transcription: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn output_delta(text: impl Into<String>) -> Self {
        Self {
            output_transcription: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn turn_complete() -> Self {
        Self {
            turn_complete: true,
            ..Self::default()
        }
    }

    pub fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }

    /// True when the message carries no signal at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Setup acknowledged; the stream is open.
    SetupComplete,
    Content(ServerMessage),
    /// The server will disconnect soon.
    GoAway,
    /// Anything else (tool calls, usage metadata, …).
    Other,
}

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<WireServerContent>,
    go_away: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireServerContent {
    model_turn: Option<WireContent>,
    turn_complete: bool,
    interrupted: bool,
    input_transcription: Option<WireTranscription>,
    output_transcription: Option<WireTranscription>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireContent {
    parts: Vec<WirePart>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WirePart {
    inline_data: Option<WireBlob>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireBlob {
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireTranscription {
    text: String,
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Parse one inbound JSON frame.
pub fn parse_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let wire: WireServerMessage = serde_json::from_str(text)?;

    if let Some(content) = wire.server_content {
        let audio_chunk = content
            .model_turn
            .and_then(|turn| turn.parts.into_iter().find_map(|p| p.inline_data))
            .and_then(|blob| non_empty(blob.data));

        return Ok(Inbound::Content(ServerMessage {
            audio_chunk,
            input_transcription: content.input_transcription.and_then(|t| non_empty(t.text)),
            output_transcription: content.output_transcription.and_then(|t| non_empty(t.text)),
            turn_complete: content.turn_complete,
            interrupted: content.interrupted,
        }));
    }
    if wire.setup_complete.is_some() {
        return Ok(Inbound::SetupComplete);
    }
    if wire.go_away.is_some() {
        return Ok(Inbound::GoAway);
    }
    Ok(Inbound::Other)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_setup_complete() {
        assert_eq!(parse_inbound(r#"{"setupComplete":{}}"#).unwrap(), Inbound::SetupComplete);
    }

    #[test]
    fn parses_audio_chunk_from_first_inline_part() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[
            {"text":"thinking"},
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}}
        ]}}}"#;
        let Inbound::Content(msg) = parse_inbound(raw).unwrap() else {
            panic!("expected content");
        };
        assert_eq!(msg.audio_chunk.as_deref(), Some("AAAA"));
        assert!(!msg.turn_complete);
    }

    #[test]
    fn parses_co_occurring_signals() {
        let raw = r#"{"serverContent":{
            "inputTranscription":{"text":"hi "},
            "outputTranscription":{"text":"hello"},
            "turnComplete":true,
            "interrupted":true
        }}"#;
        let Inbound::Content(msg) = parse_inbound(raw).unwrap() else {
            panic!("expected content");
        };
        assert_eq!(msg.input_transcription.as_deref(), Some("hi "));
        assert_eq!(msg.output_transcription.as_deref(), Some("hello"));
        assert!(msg.turn_complete);
        assert!(msg.interrupted);
        assert!(msg.audio_chunk.is_none());
    }

    #[test]
    fn empty_transcription_text_is_absent() {
        let raw = r#"{"serverContent":{"inputTranscription":{"text":""}}}"#;
        let Inbound::Content(msg) = parse_inbound(raw).unwrap() else {
            panic!("expected content");
        };
        assert!(msg.is_empty());
    }

    #[test]
    fn unknown_messages_are_other() {
        assert_eq!(parse_inbound(r#"{"usageMetadata":{}}"#).unwrap(), Inbound::Other);
        assert_eq!(parse_inbound(r#"{"goAway":{"timeLeft":"5s"}}"#).unwrap(), Inbound::GoAway);
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(parse_inbound("{not json").is_err());
    }

    #[test]
    fn setup_message_enables_transcription() {
        let setup = SessionSetup {
            model: "m".into(),
            voice: "Charon".into(),
            system_instruction: "be nice".into(),
            input_transcription: true,
            output_transcription: false,
        };
        let msg = setup_message(&setup);
        assert_eq!(msg["setup"]["model"], "models/m");
        assert_eq!(
            msg["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Charon"
        );
        assert_eq!(msg["setup"]["systemInstruction"]["parts"][0]["text"], "be nice");
        assert!(msg["setup"].get("inputAudioTranscription").is_some());
        assert!(msg["setup"].get("outputAudioTranscription").is_none());
    }

    #[test]
    fn realtime_input_carries_frame() {
        let frame = AudioFrame {
            data: "AAAA".into(),
            mime_type: "audio/pcm;rate=16000".into(),
        };
        let msg = realtime_input_message(&frame);
        assert_eq!(msg["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");
        assert_eq!(msg["realtimeInput"]["mediaChunks"][0]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn setup_from_config_uses_language_voice() {
        let mut config = AppConfig::default();
        config.language = crate::config::Language::Japanese;
        let setup = SessionSetup::from_config(&config);
        assert_eq!(setup.voice, "Charon");
        assert!(setup.input_transcription && setup.output_transcription);
        assert_eq!(setup.system_instruction, config.system_instruction());
    }
}
