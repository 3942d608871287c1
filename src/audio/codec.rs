//! PCM16 ⇄ `f32` conversion and the base64 transport encoding.
//!
//! The live stream carries raw 16-bit little-endian signed PCM wrapped in
//! base64 text.  Outbound audio is 16 kHz mono; inbound audio is 24 kHz mono
//! but [`pcm16_to_float_samples`] accepts any rate and channel count.

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

/// Sample rate of outbound microphone frames, in Hz.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio produced by the backend, in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Number of samples per outbound capture window.
pub const FRAME_SIZE: usize = 4096;

/// Scale factor between normalised `f32` samples and `i16`.
const PCM16_SCALE: f32 = 32768.0;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Errors produced while decoding audio payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The transport text was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The byte length does not divide into whole PCM16 frames.
    #[error("malformed PCM16 audio: {len} bytes is not a multiple of {frame_bytes}")]
    MalformedAudio { len: usize, frame_bytes: usize },
}

// ---------------------------------------------------------------------------
// PcmBuffer
// ---------------------------------------------------------------------------

/// De-interleaved, normalised audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// One `Vec` per channel, all of equal length.
    pub channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Wrap a single mono channel.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One transport-encoded capture window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// base64 of little-endian PCM16 bytes.
    pub data: String,
    /// Format tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

/// Media type tag for PCM16 audio at `sample_rate`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Encode one capture window into an outbound [`AudioFrame`].
pub fn encode_frame(samples: &[f32]) -> AudioFrame {
    AudioFrame {
        data: bytes_to_text(&float_samples_to_pcm16(samples)),
        mime_type: pcm_mime_type(CAPTURE_SAMPLE_RATE),
    }
}

// ---------------------------------------------------------------------------
// Text encoding
// ---------------------------------------------------------------------------

/// Encode arbitrary bytes as standard (padded) base64.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64 back into bytes.
pub fn text_to_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(general_purpose::STANDARD.decode(text)?)
}

// ---------------------------------------------------------------------------
// PCM16
// ---------------------------------------------------------------------------

/// Convert normalised samples to little-endian PCM16 bytes.
///
/// Each sample is multiplied by 32768 and truncated toward zero.  Values
/// outside `[-1.0, 1.0)` are not clamped: they wrap around the 16-bit range.
///
/// ```
/// use live_voice_chat::audio::float_samples_to_pcm16;
///
/// assert_eq!(float_samples_to_pcm16(&[0.5, -0.5]), vec![0x00, 0x40, 0x00, 0xC0]);
/// ```
pub fn float_samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        // i64 keeps the product exact before the wrapping cast to i16.
        let value = (s as f64 * PCM16_SCALE as f64) as i64 as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode interleaved little-endian PCM16 into a [`PcmBuffer`].
///
/// # Errors
///
/// [`CodecError::MalformedAudio`] when `channels == 0` or `bytes.len()` is not
/// a multiple of `2 * channels`.
pub fn pcm16_to_float_samples(
    bytes: &[u8],
    sample_rate: u32,
    channels: usize,
) -> Result<PcmBuffer, CodecError> {
    let frame_bytes = 2 * channels;
    if channels == 0 || bytes.len() % frame_bytes != 0 {
        return Err(CodecError::MalformedAudio {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let frames = bytes.len() / frame_bytes;
    let mut out = vec![Vec::with_capacity(frames); channels];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, sample) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            out[ch].push(value as f32 / PCM16_SCALE);
        }
    }

    Ok(PcmBuffer {
        sample_rate,
        channels: out,
    })
}

/// Decode a base64 chunk of 24 kHz mono PCM16 from the backend.
pub fn decode_output_chunk(text: &str) -> Result<PcmBuffer, CodecError> {
    let bytes = text_to_bytes(text)?;
    pcm16_to_float_samples(&bytes, OUTPUT_SAMPLE_RATE, 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
