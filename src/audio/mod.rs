//! Audio pipeline: microphone capture → framing → PCM16/base64 frames on
//! the way out; base64 chunks → PCM16 decode → gapless playback on the way in.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → channel 0 → resample to 16 kHz
//!           → FrameBuffer (4096) → encode_frame → outbound channel
//!
//! inbound chunk → decode_output_chunk → PlaybackScheduler → OutputDevice
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use live_voice_chat::audio::{CapturePipeline, MicInput, FRAME_SIZE};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (frame_tx, mut frame_rx) = mpsc::channel(64);
//!     let (err_tx, _err_rx) = mpsc::unbounded_channel();
//!     let _capture = CapturePipeline::spawn(Box::new(MicInput::new()), FRAME_SIZE, frame_tx, err_tx)
//!         .await
//!         .unwrap();
//!
//!     while let Some(frame) = frame_rx.recv().await {
//!         println!("{} ({} base64 chars)", frame.mime_type, frame.data.len());
//!     }
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod codec;
pub mod output;
pub mod playback;
pub mod resample;

pub use buffer::FrameBuffer;
pub use capture::{CaptureError, CaptureHandle, CapturePipeline, InputDevice, MicInput};
pub use codec::{
    bytes_to_text, decode_output_chunk, encode_frame, float_samples_to_pcm16, pcm16_to_float_samples,
    pcm_mime_type, text_to_bytes, AudioFrame, CodecError, PcmBuffer, CAPTURE_SAMPLE_RATE, FRAME_SIZE,
    OUTPUT_SAMPLE_RATE,
};
pub use output::{CpalOutput, OutputDevice, OutputError, VoiceId};
pub use playback::{OneShotPlayer, PlaybackError, PlaybackScheduler, ScheduledBuffer};
pub use resample::{resample, take_channel, StreamResampler};

// test-only re-export so the live session tests can drive a fake clock.
#[cfg(test)]
pub use output::FakeOutput;
