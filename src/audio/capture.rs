//! Microphone capture and the outbound framing pipeline.
//!
//! [`MicInput`] wraps the cpal host/device/stream lifecycle and delivers
//! 16 kHz mono `f32` samples over an unbounded channel.  The `cpal::Stream`
//! is not `Send` on every platform, so it lives on a dedicated OS thread and
//! is dropped there when [`InputDevice::close`] is called.
//!
//! [`CapturePipeline::spawn`] connects any [`InputDevice`] to the outbound
//! frame channel: samples are cut into fixed windows by a [`FrameBuffer`],
//! encoded with [`encode_frame`] and submitted without waiting for the
//! transport.  The returned [`CaptureHandle`] stops everything on
//! [`CaptureHandle::stop`] or drop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::buffer::FrameBuffer;
use super::codec::{encode_frame, AudioFrame, CAPTURE_SAMPLE_RATE};
use super::resample::{take_channel, StreamResampler};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn capture thread: {0}")]
    Thread(String),

    #[error("capture thread exited before the stream was ready")]
    Disconnected,

    #[error("frame size must be greater than zero")]
    InvalidFrameSize,

    /// An encoded frame could not be handed to the outbound channel.
    #[error("failed to submit audio frame: {0}")]
    Submit(String),
}

// ---------------------------------------------------------------------------
// InputDevice
// ---------------------------------------------------------------------------

/// A source of 16 kHz mono samples.
///
/// `open` starts delivery on `tx`; `close` must release the underlying
/// device and be safe to call more than once.
pub trait InputDevice: Send {
    fn open(&mut self, tx: mpsc::UnboundedSender<Vec<f32>>) -> Result<(), CaptureError>;
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// MicInput
// ---------------------------------------------------------------------------

/// The system default microphone, via cpal.
#[derive(Default)]
pub struct MicInput {
    worker: Option<(std::sync::mpsc::Sender<()>, std::thread::JoinHandle<()>)>,
}

impl MicInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl InputDevice for MicInput {
    /// Open the default input device and start streaming.
    ///
    /// Blocks until the stream is playing or has failed, so device errors
    /// are reported here rather than lost on the capture thread.
    fn open(&mut self, tx: mpsc::UnboundedSender<Vec<f32>>) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(u32, u16), CaptureError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || match build_input_stream(tx) {
                Ok((stream, rate, channels)) => {
                    let _ = ready_tx.send(Ok((rate, channels)));
                    // Park until close() or the handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                    log::debug!("mic-capture: stream released");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok((rate, channels))) => {
                log::info!("microphone open ({rate} Hz, {channels} ch → {CAPTURE_SAMPLE_RATE} Hz mono)");
                self.worker = Some((stop_tx, thread));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Disconnected)
            }
        }
    }

    fn close(&mut self) {
        if let Some((stop, thread)) = self.worker.take() {
            let _ = stop.send(());
            if thread.join().is_err() {
                log::warn!("mic-capture thread panicked during shutdown");
            }
        }
    }
}

impl Drop for MicInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build and start a cpal input stream that forwards channel 0, resampled
/// to [`CAPTURE_SAMPLE_RATE`], to `tx`.
///
/// One [`StreamResampler`] lives for the whole stream so callback
/// boundaries leave no seams in the 16 kHz output.
fn build_input_stream(
    tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<(cpal::Stream, u32, u16), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    let supported = device.default_input_config()?;
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();
    let mut resampler = StreamResampler::new(sample_rate, CAPTURE_SAMPLE_RATE);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = take_channel(data, channels, 0);
            let samples = resampler.process(&mono);
            if samples.is_empty() {
                return;
            }
            // Receiver gone means the pipeline was stopped.
            let _ = tx.send(samples);
        },
        |err: cpal::StreamError| {
            log::error!("cpal input stream error: {err}");
        },
        None,
    )?;

    stream.play()?;
    Ok((stream, sample_rate, channels))
}

// ---------------------------------------------------------------------------
// CapturePipeline
// ---------------------------------------------------------------------------

/// Entry point for the microphone → outbound frame pipeline.
pub struct CapturePipeline;

impl CapturePipeline {
    /// Open `input` and spawn the framing task.
    ///
    /// Every complete window of `frame_size` samples becomes one
    /// [`AudioFrame`] pushed to `frames` with `try_send`.  A rejected frame
    /// is logged, reported on `errors` and dropped; later windows are still
    /// processed.
    ///
    /// The device is opened on the blocking pool, since [`MicInput::open`]
    /// waits for its capture thread to report the stream ready.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidFrameSize`] for a zero `frame_size`, checked
    /// before the device is touched.  Otherwise whatever
    /// [`InputDevice::open`] returns; nothing is spawned in that case and
    /// the device is left closed.
    pub async fn spawn(
        input: Box<dyn InputDevice>,
        frame_size: usize,
        frames: mpsc::Sender<AudioFrame>,
        errors: mpsc::UnboundedSender<CaptureError>,
    ) -> Result<CaptureHandle, CaptureError> {
        if frame_size == 0 {
            return Err(CaptureError::InvalidFrameSize);
        }

        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let input = tokio::task::spawn_blocking(move || {
            let mut input = input;
            input.open(sample_tx).map(|()| input)
        })
        .await
        .map_err(|e| CaptureError::Thread(e.to_string()))??;

        let task = tokio::spawn(async move {
            let mut framer = FrameBuffer::new(frame_size);
            while let Some(samples) = sample_rx.recv().await {
                for window in framer.push_slice(&samples) {
                    if let Err(e) = frames.try_send(encode_frame(&window)) {
                        log::warn!("capture: dropping frame {}: {e}", framer.emitted());
                        let _ = errors.send(CaptureError::Submit(e.to_string()));
                    }
                }
            }
            log::debug!("capture: sample channel closed after {} frames", framer.emitted());
        });

        Ok(CaptureHandle {
            input,
            task,
            stopped: false,
        })
    }
}

// ---------------------------------------------------------------------------
// CaptureHandle
// ---------------------------------------------------------------------------

/// Owns a running capture pipeline.  Dropping it stops capture.
pub struct CaptureHandle {
    input: Box<dyn InputDevice>,
    task: JoinHandle<()>,
    stopped: bool,
}

impl CaptureHandle {
    /// Close the input device and end the framing task.  Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.input.close();
        self.task.abort();
        log::debug!("capture: stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::audio::codec::text_to_bytes;

    /// Input double that hands its sample sender back to the test.
    struct ScriptedInput {
        tx_slot: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>>,
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl InputDevice for ScriptedInput {
        fn open(&mut self, tx: mpsc::UnboundedSender<Vec<f32>>) -> Result<(), CaptureError> {
            if self.fail {
                return Err(CaptureError::NoDevice);
            }
            *self.tx_slot.lock().unwrap() = Some(tx);
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.tx_slot.lock().unwrap().take();
        }
    }

    fn scripted(
        fail: bool,
    ) -> (
        Box<dyn InputDevice>,
        Arc<Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>>,
        Arc<AtomicUsize>,
    ) {
        let slot = Arc::new(Mutex::new(None));
        let closes = Arc::new(AtomicUsize::new(0));
        let input = ScriptedInput {
            tx_slot: Arc::clone(&slot),
            closes: Arc::clone(&closes),
            fail,
        };
        (Box::new(input), slot, closes)
    }

    fn push(slot: &Arc<Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>>, samples: Vec<f32>) {
        slot.lock().unwrap().as_ref().unwrap().send(samples).unwrap();
    }

    #[tokio::test]
    async fn frames_are_emitted_in_capture_order() {
        let (input, slot, _closes) = scripted(false);
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();

        let _handle = CapturePipeline::spawn(input, 4, frame_tx, err_tx).await.unwrap();

        push(&slot, vec![0.0, 0.0, 0.0]);
        push(&slot, vec![0.0, 0.5, 0.5, 0.5, 0.5]);

        let first = frame_rx.recv().await.unwrap();
        let second = frame_rx.recv().await.unwrap();
        assert_eq!(first.mime_type, "audio/pcm;rate=16000");
        assert_eq!(text_to_bytes(&first.data).unwrap(), vec![0u8; 8]);
        assert_eq!(
            text_to_bytes(&second.data).unwrap(),
            vec![0x00, 0x40, 0x00, 0x40, 0x00, 0x40, 0x00, 0x40]
        );
    }

    #[tokio::test]
    async fn rejected_frame_is_reported_and_capture_continues() {
        let (input, slot, _closes) = scripted(false);
        let (frame_tx, mut frame_rx) = mpsc::channel(1);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();

        let _handle = CapturePipeline::spawn(input, 2, frame_tx, err_tx).await.unwrap();

        // Two windows into a channel of capacity one: the second is rejected.
        push(&slot, vec![0.1, 0.1, 0.2, 0.2]);
        assert!(matches!(
            err_rx.recv().await,
            Some(CaptureError::Submit(_))
        ));

        // Drain and push again: the pipeline is still running.
        frame_rx.recv().await.unwrap();
        push(&slot, vec![0.3, 0.3]);
        assert!(frame_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn open_failure_is_returned() {
        let (input, _slot, _closes) = scripted(true);
        let (frame_tx, _frame_rx) = mpsc::channel(1);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();

        let result = CapturePipeline::spawn(input, 4096, frame_tx, err_tx).await;
        assert!(matches!(result, Err(CaptureError::NoDevice)));
    }

    #[tokio::test]
    async fn stop_closes_device_once() {
        let (input, _slot, closes) = scripted(false);
        let (frame_tx, _frame_rx) = mpsc::channel(1);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();

        let mut handle = CapturePipeline::spawn(input, 4096, frame_tx, err_tx).await.unwrap();
        handle.stop();
        handle.stop();
        drop(handle);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_frame_size_is_rejected_before_open() {
        let (input, slot, _closes) = scripted(false);
        let (frame_tx, _frame_rx) = mpsc::channel(1);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();

        let result = CapturePipeline::spawn(input, 0, frame_tx, err_tx).await;

        assert!(matches!(result, Err(CaptureError::InvalidFrameSize)));
        assert!(slot.lock().unwrap().is_none(), "device must not be opened");
    }

    #[test]
    fn mic_input_starts_closed() {
        let mut mic = MicInput::new();
        assert!(!mic.is_open());
        mic.close(); // no-op
    }
}
