//! Live conversation over a bidirectional audio stream.
//!
//! ```text
//! MicInput → CapturePipeline → LiveConnection.frames → transport → backend
//! backend → transport → TransportEvent → SessionController
//!         → transcripts → SessionObserver
//!         → audio chunks → PlaybackScheduler → OutputDevice
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use live_voice_chat::config::AppConfig;
//! use live_voice_chat::live::{
//!     GeminiLiveTransport, LiveError, LiveSession, SessionDevices, SessionObserver, SessionOptions,
//!     SessionSetup,
//! };
//!
//! struct Print;
//!
//! impl SessionObserver for Print {
//!     fn on_user_message(&self, text: &str) { println!("you: {text}"); }
//!     fn on_model_message(&self, text: &str) { println!("model: {text}"); }
//!     fn on_complete(&self) { println!("done"); }
//!     fn on_error(&self, error: &LiveError) { eprintln!("{error}"); }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let transport = Arc::new(GeminiLiveTransport::from_config(&config)?);
//!     let devices = SessionDevices::system(config.audio.output_sample_rate).await?;
//!
//!     let handle = LiveSession::start(
//!         transport,
//!         SessionSetup::from_config(&config),
//!         devices,
//!         SessionOptions::from_config(&config),
//!         Arc::new(Print),
//!     );
//!     tokio::signal::ctrl_c().await?;
//!     handle.close();
//!     handle.finished().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod message;
pub mod session;
pub mod state;
pub mod transcript;
pub mod transport;

pub use error::LiveError;
pub use message::{parse_inbound, realtime_input_message, setup_message, Inbound, ServerMessage, SessionSetup};
pub use session::{
    LiveSession, SessionController, SessionDevices, SessionHandle, SessionObserver, SessionOptions,
};
pub use state::SessionState;
pub use transcript::{TranscriptAccumulator, TurnTranscript};
pub use transport::{GeminiLiveTransport, LiveConnection, LiveTransport, TransportEvent};
