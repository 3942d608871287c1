//! Request/response shapes for the `generateContent` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// A web page the model cited while answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

/// A text reply with its citations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

pub(crate) fn text_request(prompt: &str, system_instruction: &str, search: bool) -> serde_json::Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "systemInstruction": { "parts": [{ "text": system_instruction }] }
    });
    if search {
        body["tools"] = json!([{ "googleSearch": {} }]);
    }
    body
}

pub(crate) fn speech_request(text: &str, voice: &str) -> serde_json::Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GenerateResponse {
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Candidate {
    pub content: Option<Content>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InlineData {
    pub data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct GroundingMetadata {
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GroundingChunk {
    pub web: Option<WebChunk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WebChunk {
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl GenerateResponse {
    fn first(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> String {
        self.first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Cited web pages.  Chunks without a URI are dropped; a missing title
    /// becomes `"Source"`.
    pub fn sources(&self) -> Vec<GroundingSource> {
        let Some(meta) = self.first().and_then(|c| c.grounding_metadata.as_ref()) else {
            return Vec::new();
        };
        meta.grounding_chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| {
                let uri = web.uri.as_deref().filter(|u| !u.is_empty())?;
                let title = web
                    .title
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or("Source");
                Some(GroundingSource {
                    title: title.to_string(),
                    uri: uri.to_string(),
                })
            })
            .collect()
    }

    /// base64 audio of the first part of the first candidate.
    pub fn inline_audio(&self) -> Option<&str> {
        self.first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| content.parts.first())
            .and_then(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
            .filter(|data| !data.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> GenerateResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn text_parts_are_concatenated() {
        let resp = parse(r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#);
        assert_eq!(resp.text(), "Hello, world");
    }

    #[test]
    fn sources_default_title_and_drop_missing_uri() {
        let resp = parse(
            r#"{"candidates":[{"groundingMetadata":{"groundingChunks":[
                {"web":{"uri":"https://a.example","title":"A"}},
                {"web":{"uri":"https://b.example"}},
                {"web":{"title":"no link"}},
                {}
            ]}}]}"#,
        );
        assert_eq!(
            resp.sources(),
            vec![
                GroundingSource {
                    title: "A".into(),
                    uri: "https://a.example".into()
                },
                GroundingSource {
                    title: "Source".into(),
                    uri: "https://b.example".into()
                },
            ]
        );
    }

    #[test]
    fn empty_response_has_no_text_or_audio() {
        let resp = parse("{}");
        assert_eq!(resp.text(), "");
        assert!(resp.sources().is_empty());
        assert!(resp.inline_audio().is_none());
    }

    #[test]
    fn inline_audio_comes_from_first_part() {
        let resp = parse(
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"audio/L16;rate=24000","data":"AAAA"}}]}}]}"#,
        );
        assert_eq!(resp.inline_audio(), Some("AAAA"));
    }

    #[test]
    fn text_request_includes_search_tool_when_enabled() {
        let body = text_request("hi", "be brief", true);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(body["tools"][0].get("googleSearch").is_some());
        assert!(text_request("hi", "", false).get("tools").is_none());
    }

    #[test]
    fn speech_request_names_voice() {
        let body = speech_request("hello", "Fenrir");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Fenrir"
        );
    }
}
