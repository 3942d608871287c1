//! Audio output devices.
//!
//! [`OutputDevice`] is the seam between the playback scheduler and the
//! hardware: it exposes a clock in seconds and can start a buffer at a given
//! clock time or stop it early.  Voices that play to the end are reported on
//! a completion channel so the scheduler can drop them from its active set.
//!
//! [`CpalOutput`] implements it with a small software mixer rendered from the
//! cpal output callback.  Like capture, the `cpal::Stream` lives on its own
//! OS thread.

use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use super::codec::PcmBuffer;
use super::resample::resample;

// ---------------------------------------------------------------------------
// VoiceId
// ---------------------------------------------------------------------------

/// Identifies one scheduled buffer on an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(pub u64);

// ---------------------------------------------------------------------------
// OutputError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn playback thread: {0}")]
    Thread(String),

    #[error("playback thread exited before the stream was ready")]
    Disconnected,

    #[error("output device is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// OutputDevice
// ---------------------------------------------------------------------------

/// A playback sink with its own clock.
pub trait OutputDevice: Send {
    /// Current device time in seconds.
    fn now(&self) -> f64;

    /// Play `buffer` starting at device time `at`.  A time in the past
    /// starts immediately.
    fn start(&mut self, id: VoiceId, buffer: &PcmBuffer, at: f64) -> Result<(), OutputError>;

    /// Cut a voice off.  Unknown ids are ignored.  No completion is reported
    /// for a stopped voice.
    fn stop(&mut self, id: VoiceId);

    /// Release the device.  Must be idempotent.
    fn close(&mut self);
}

impl OutputDevice for Box<dyn OutputDevice> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn start(&mut self, id: VoiceId, buffer: &PcmBuffer, at: f64) -> Result<(), OutputError> {
        (**self).start(id, buffer, at)
    }

    fn stop(&mut self, id: VoiceId) {
        (**self).stop(id)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

struct Voice {
    id: VoiceId,
    /// Mono samples at the device rate.
    samples: Vec<f32>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sums active voices into the device buffer and keeps the frame clock.
#[derive(Default)]
pub(crate) struct Mixer {
    /// Frames rendered since the stream started.
    clock: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    fn add(&mut self, id: VoiceId, samples: Vec<f32>, start_frame: u64) {
        // A start time already passed plays from the next rendered frame.
        let start_frame = start_frame.max(self.clock);
        self.voices.push(Voice {
            id,
            samples,
            start_frame,
        });
    }

    fn remove(&mut self, id: VoiceId) {
        self.voices.retain(|v| v.id != id);
    }

    /// Fill `out` (interleaved, `channels` wide) and report finished voices.
    fn render(&mut self, out: &mut [f32], channels: usize, ended: Option<&mpsc::UnboundedSender<VoiceId>>) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let t = self.clock;
            let mut acc = 0.0_f32;
            for v in &self.voices {
                if t >= v.start_frame && t < v.end_frame() {
                    acc += v.samples[(t - v.start_frame) as usize];
                }
            }
            frame.fill(acc.clamp(-1.0, 1.0));
            self.clock += 1;
        }

        let clock = self.clock;
        self.voices.retain(|v| {
            let done = clock >= v.end_frame();
            if let Some(ended) = ended.filter(|_| done) {
                let _ = ended.send(v.id);
            }
            !done
        });
    }
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    // The audio callback must never panic on a poisoned lock.
    mixer.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// The system default output device, via cpal.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    worker: Option<(std::sync::mpsc::Sender<()>, std::thread::JoinHandle<()>)>,
}

impl CpalOutput {
    /// Open the default output device, preferring `preferred_rate` Hz.
    ///
    /// If the device rejects that rate the default configuration is used and
    /// buffers are resampled on [`OutputDevice::start`].  Voices that finish
    /// naturally are reported on `ended`; pass `None` when nothing tracks
    /// completions, so none are queued.
    pub fn open(
        preferred_rate: u32,
        ended: Option<mpsc::UnboundedSender<VoiceId>>,
    ) -> Result<Self, OutputError> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let mixer_clone = Arc::clone(&mixer);

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<u32, OutputError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || match build_output_stream(preferred_rate, mixer_clone, ended) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    let _ = stop_rx.recv();
                    drop(stream);
                    log::debug!("audio-playback: stream released");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| OutputError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(device_rate)) => {
                log::info!("output device open ({device_rate} Hz)");
                Ok(Self {
                    mixer,
                    device_rate,
                    worker: Some((stop_tx, thread)),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(OutputError::Disconnected)
            }
        }
    }

    /// Rate the hardware stream actually runs at.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl OutputDevice for CpalOutput {
    fn now(&self) -> f64 {
        lock(&self.mixer).clock as f64 / self.device_rate as f64
    }

    fn start(&mut self, id: VoiceId, buffer: &PcmBuffer, at: f64) -> Result<(), OutputError> {
        if self.worker.is_none() {
            return Err(OutputError::Closed);
        }
        let mono = buffer.to_mono();
        let samples = resample(&mono, buffer.sample_rate, self.device_rate);
        let start_frame = (at.max(0.0) * self.device_rate as f64).round() as u64;
        lock(&self.mixer).add(id, samples, start_frame);
        Ok(())
    }

    fn stop(&mut self, id: VoiceId) {
        lock(&self.mixer).remove(id);
    }

    fn close(&mut self) {
        if let Some((stop, thread)) = self.worker.take() {
            lock(&self.mixer).voices.clear();
            let _ = stop.send(());
            if thread.join().is_err() {
                log::warn!("audio-playback thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_output_stream(
    preferred_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    ended: Option<mpsc::UnboundedSender<VoiceId>>,
) -> Result<(cpal::Stream, u32), OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;

    let default = device.default_output_config()?;
    let channels = default.channels();

    let preferred = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(preferred_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let make_callback = |mixer: Arc<Mutex<Mixer>>, ended: Option<mpsc::UnboundedSender<VoiceId>>| {
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            lock(&mixer).render(data, channels as usize, ended.as_ref());
        }
    };
    let on_error = |err: cpal::StreamError| log::error!("cpal output stream error: {err}");

    let (stream, rate) = match device.build_output_stream(
        &preferred,
        make_callback(Arc::clone(&mixer), ended.clone()),
        on_error,
        None,
    ) {
        Ok(stream) => (stream, preferred_rate),
        Err(e) => {
            let rate = default.sample_rate().0;
            log::warn!("output device rejected {preferred_rate} Hz ({e}); using {rate} Hz");
            let config: cpal::StreamConfig = default.into();
            let stream =
                device.build_output_stream(&config, make_callback(mixer, ended), on_error, None)?;
            (stream, rate)
        }
    };

    stream.play()?;
    Ok((stream, rate))
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Everything a [`FakeOutput`] has been asked to do.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeOutputLog {
    pub now: f64,
    /// `(id, start time, duration)` per started voice.
    pub started: Vec<(VoiceId, f64, f64)>,
    pub stopped: Vec<VoiceId>,
    pub closes: usize,
}

/// Output device with a manually driven clock.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct FakeOutput {
    pub log: Arc<Mutex<FakeOutputLog>>,
}

#[cfg(test)]
impl FakeOutput {
    pub fn set_now(&self, t: f64) {
        self.log.lock().unwrap().now = t;
    }

    pub fn starts(&self) -> Vec<f64> {
        self.log.lock().unwrap().started.iter().map(|s| s.1).collect()
    }
}

#[cfg(test)]
impl OutputDevice for FakeOutput {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn start(&mut self, id: VoiceId, buffer: &PcmBuffer, at: f64) -> Result<(), OutputError> {
        let mut log = self.log.lock().unwrap();
        if log.closes > 0 {
            return Err(OutputError::Closed);
        }
        log.started.push((id, at, buffer.duration_secs()));
        Ok(())
    }

    fn stop(&mut self, id: VoiceId) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixer_plays_voice_at_its_start_frame() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixer = Mixer::default();
        mixer.add(VoiceId(1), vec![0.5, 0.25], 2);

        let mut out = [9.0_f32; 5];
        mixer.render(&mut out, 1, Some(&tx));
        assert_eq!(out, [0.0, 0.0, 0.5, 0.25, 0.0]);
        assert_eq!(mixer.clock, 5);
    }

    #[test]
    fn mixer_duplicates_mono_across_channels() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixer = Mixer::default();
        mixer.add(VoiceId(1), vec![0.5], 0);

        let mut out = [0.0_f32; 4];
        mixer.render(&mut out, 2, Some(&tx));
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn mixer_reports_finished_voices_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mixer = Mixer::default();
        mixer.add(VoiceId(7), vec![0.1; 3], 0);
        mixer.add(VoiceId(8), vec![0.1; 10], 0);

        let mut out = [0.0_f32; 4];
        mixer.render(&mut out, 1, Some(&tx));
        assert_eq!(rx.try_recv().unwrap(), VoiceId(7));
        assert!(rx.try_recv().is_err());

        mixer.render(&mut out, 1, Some(&tx));
        assert!(rx.try_recv().is_err());
        assert_eq!(mixer.voices.len(), 1);
    }

    #[test]
    fn mixer_without_completion_channel_still_retires_voices() {
        let mut mixer = Mixer::default();
        mixer.add(VoiceId(1), vec![0.1; 2], 0);

        let mut out = [0.0_f32; 4];
        mixer.render(&mut out, 1, None);
        assert!(mixer.voices.is_empty());
    }

    #[test]
    fn mixer_removed_voice_is_silent_and_unreported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mixer = Mixer::default();
        mixer.add(VoiceId(1), vec![0.5; 4], 0);
        mixer.remove(VoiceId(1));

        let mut out = [1.0_f32; 4];
        mixer.render(&mut out, 1, Some(&tx));
        assert_eq!(out, [0.0; 4]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mixer_late_start_plays_from_current_frame() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixer = Mixer::default();
        let mut out = [0.0_f32; 3];
        mixer.render(&mut out, 1, Some(&tx));

        mixer.add(VoiceId(1), vec![0.5], 0);
        let mut out = [0.0_f32; 1];
        mixer.render(&mut out, 1, Some(&tx));
        assert_eq!(out, [0.5]);
    }

    #[test]
    fn mixer_clamps_summed_output() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixer = Mixer::default();
        mixer.add(VoiceId(1), vec![0.8], 0);
        mixer.add(VoiceId(2), vec![0.8], 0);

        let mut out = [0.0_f32; 1];
        mixer.render(&mut out, 1, Some(&tx));
        assert_eq!(out, [1.0]);
    }
}
