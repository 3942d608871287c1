//! Realtime voice chat core.
//!
//! - [`audio`]: PCM16 codec, microphone capture, gapless playback.
//! - [`live`]: bidirectional live session and its transport.
//! - [`api`]: text generation and speech synthesis over REST.
//! - [`chat`]: text chat with spoken replies.
//! - [`config`]: settings persisted as TOML.

pub mod api;
pub mod audio;
pub mod chat;
pub mod config;
pub mod live;
