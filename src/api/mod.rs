//! REST collaborators: search-grounded text generation and speech synthesis.

pub mod client;
pub mod types;

pub use client::{ApiError, GeminiClient, SpeechSynthesizer, TextGenerator};
pub use types::{GroundingSource, Reply};
