use thiserror::Error;

use crate::audio::CaptureError;

/// Session-level failures reported to [`SessionObserver::on_error`].
///
/// [`SessionObserver::on_error`]: super::SessionObserver::on_error
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("no API key configured (set GEMINI_API_KEY or api.api_key)")]
    MissingApiKey,

    #[error("failed to open live stream: {0}")]
    Connect(String),

    #[error("live stream error: {0}")]
    Transport(String),

    /// The microphone could not be opened once the stream was up.
    #[error("microphone unavailable: {0}")]
    DeviceAccess(#[source] CaptureError),

    /// An outbound audio frame was rejected.
    #[error("failed to send audio frame: {0}")]
    Send(String),

    #[error("live stream closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for LiveError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        LiveError::Transport(e.to_string())
    }
}
