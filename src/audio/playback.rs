//! Gapless playback scheduling for streamed reply audio.
//!
//! [`PlaybackScheduler`] places each decoded chunk directly after the
//! previous one on the output device clock:
//!
//! ```text
//! start = max(next_start_time, device.now())
//! next_start_time = start + duration
//! ```
//!
//! so chunks play in the order they were enqueued with no gap and no
//! overlap, and never before the device is ready.  Every scheduled buffer is
//! tracked in an active set until it either finishes ([`finished`]) or is cut
//! off by [`interrupt`], which also rewinds the clock state so the next chunk
//! starts from the live device time.
//!
//! The scheduler is `&mut self` throughout and is owned by a single session
//! task, which keeps the active set and the clock consistent without locks.
//!
//! [`finished`]: PlaybackScheduler::finished
//! [`interrupt`]: PlaybackScheduler::interrupt

use std::collections::BTreeMap;

use thiserror::Error;

use super::codec::{decode_output_chunk, pcm16_to_float_samples, CodecError, PcmBuffer, OUTPUT_SAMPLE_RATE};
use super::output::{OutputDevice, OutputError, VoiceId};

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("playback scheduler is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// ScheduledBuffer
// ---------------------------------------------------------------------------

/// A buffer placed on the output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: VoiceId,
    /// Start time on the device clock, in seconds.
    pub start_time: f64,
    /// Length in seconds.
    pub duration: f64,
}

impl ScheduledBuffer {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Back-to-back scheduler with bulk cancellation.
pub struct PlaybackScheduler<D: OutputDevice> {
    device: D,
    active: BTreeMap<VoiceId, ScheduledBuffer>,
    next_start_time: f64,
    next_id: u64,
    closed: bool,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            active: BTreeMap::new(),
            next_start_time: 0.0,
            next_id: 0,
            closed: false,
        }
    }

    /// Decode a base64 PCM16 chunk (24 kHz mono) and schedule it.
    ///
    /// # Errors
    ///
    /// A corrupt chunk returns [`PlaybackError::Codec`] and leaves the
    /// schedule untouched, so the caller can drop it and carry on.
    pub fn enqueue(&mut self, chunk: &str) -> Result<ScheduledBuffer, PlaybackError> {
        if self.closed {
            return Err(PlaybackError::Closed);
        }
        let buffer = decode_output_chunk(chunk)?;
        self.enqueue_pcm(buffer)
    }

    /// Schedule an already-decoded buffer right after the previous one.
    pub fn enqueue_pcm(&mut self, buffer: PcmBuffer) -> Result<ScheduledBuffer, PlaybackError> {
        if self.closed {
            return Err(PlaybackError::Closed);
        }

        let start_time = self.next_start_time.max(self.device.now());
        let id = VoiceId(self.next_id);
        self.device.start(id, &buffer, start_time)?;
        self.next_id += 1;

        let scheduled = ScheduledBuffer {
            id,
            start_time,
            duration: buffer.duration_secs(),
        };
        self.active.insert(id, scheduled);
        self.next_start_time = scheduled.end_time();

        log::trace!(
            "playback: {:?} at {:.3}s for {:.3}s ({} active)",
            id,
            start_time,
            scheduled.duration,
            self.active.len()
        );
        Ok(scheduled)
    }

    /// A voice played to its end.  Returns `false` for ids no longer active
    /// (for example, already cut off by an interrupt).
    pub fn finished(&mut self, id: VoiceId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop every active buffer immediately and reset the clock state.
    ///
    /// Returns the number of buffers stopped; zero on an empty set.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for id in std::mem::take(&mut self.active).into_keys() {
            self.device.stop(id);
        }
        self.next_start_time = 0.0;
        if stopped > 0 {
            log::debug!("playback: interrupted {stopped} buffers");
        }
        stopped
    }

    /// Interrupt and release the output device.  Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.interrupt();
        self.device.close();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of buffers scheduled or playing.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

// ---------------------------------------------------------------------------
// OneShotPlayer
// ---------------------------------------------------------------------------

/// Plays standalone replies (the text-chat speech path), independent of any
/// live-session scheduler.
pub struct OneShotPlayer<D: OutputDevice> {
    device: D,
    next_id: u64,
}

impl<D: OutputDevice> OneShotPlayer<D> {
    pub fn new(device: D) -> Self {
        Self { device, next_id: 0 }
    }

    /// Decode raw PCM16 (24 kHz mono) and start it now.
    ///
    /// Returns the playback length in seconds.
    pub fn play(&mut self, bytes: &[u8]) -> Result<f64, PlaybackError> {
        let buffer = pcm16_to_float_samples(bytes, OUTPUT_SAMPLE_RATE, 1)?;
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        let at = self.device.now();
        self.device.start(id, &buffer, at)?;
        Ok(buffer.duration_secs())
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
