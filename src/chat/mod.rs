//! Request/response text chat with spoken replies.
//!
//! [`ChatService::send`] asks the text generator for a (search-grounded)
//! reply; [`ChatService::speak`] turns that reply into PCM16 audio for a
//! one-shot player.  Both sides of the exchange are kept in
//! [`ChatService::history`], which live-session transcripts can join via
//! [`ChatService::record`].

use std::sync::Arc;

use crate::api::{ApiError, GroundingSource, Reply, SpeechSynthesizer, TextGenerator};
use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub sources: Vec<GroundingSource>,
    /// Synthesised speech for model replies, once available.
    pub audio: Option<Vec<u8>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            sources: Vec::new(),
            audio: None,
        }
    }

    pub fn model(text: impl Into<String>, sources: Vec<GroundingSource>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
            sources,
            audio: None,
        }
    }
}

pub struct ChatService {
    text: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    system_instruction: String,
    voice: String,
    history: Vec<ChatMessage>,
}

impl ChatService {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        config: &AppConfig,
    ) -> Self {
        Self {
            text,
            speech,
            system_instruction: config.system_instruction(),
            voice: config.voice().to_string(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Append a message produced elsewhere (e.g. a live transcript).
    pub fn record(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Send one user turn.
    ///
    /// The user message is recorded before the request; on failure no
    /// model message is added and the error is returned.
    pub async fn send(&mut self, prompt: &str) -> Result<Reply, ApiError> {
        let prompt = prompt.trim();
        self.history.push(ChatMessage::user(prompt));

        let reply = self.text.generate(prompt, &self.system_instruction).await?;
        self.history
            .push(ChatMessage::model(reply.text.clone(), reply.sources.clone()));
        Ok(reply)
    }

    /// Synthesise `reply` in the configured voice.
    ///
    /// The audio is attached to the most recent model message with the same
    /// text.  A failure leaves the text reply in the history untouched.
    pub async fn speak(&mut self, reply: &Reply) -> Result<Vec<u8>, ApiError> {
        let audio = self.speech.synthesize(&reply.text, &self.voice).await?;

        if let Some(message) = self
            .history
            .iter_mut()
            .rev()
            .find(|m| m.role == ChatRole::Model && m.text == reply.text)
        {
            message.audio = Some(audio.clone());
        }
        Ok(audio)
    }
}
