//! Live conversation session.
//!
//! [`SessionController`] is the synchronous state machine: it owns the
//! capture handle, the playback scheduler and the transcript buffers, and
//! reacts to one input at a time.  [`LiveSession::start`] spawns the single
//! tokio task that feeds it transport events, capture errors, playback
//! completions and the caller's close request.
//!
//! # Lifecycle
//!
//! ```text
//! start ─▶ Opening ──Opened + mic ok──▶ Active ──stream closed / close()──▶ Closed
//!             │                           │
//!             └──connect/mic/stream error─┴──▶ Errored ──stream closed / close()──▶ (teardown)
//! ```
//!
//! `on_error` fires at most once for session-level failures.  `on_complete`
//! fires exactly once when the session ends, whichever way it ends.  A
//! session still `Opening` when [`SessionOptions::open_timeout`] runs out
//! fails with [`LiveError::Connect`] and closes its stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::LiveError;
use super::message::{ServerMessage, SessionSetup};
use super::state::SessionState;
use super::transcript::TranscriptAccumulator;
use super::transport::{LiveTransport, TransportEvent};
use crate::audio::{
    CaptureError, CaptureHandle, CapturePipeline, CpalOutput, InputDevice, MicInput, OutputDevice,
    OutputError, PlaybackScheduler, VoiceId, FRAME_SIZE,
};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// SessionObserver
// ---------------------------------------------------------------------------

/// Receives the user-visible results of a session.
///
/// Called from the session task; implementations should return quickly.
pub trait SessionObserver: Send + Sync {
    /// Final transcription of what the user said in one turn.
    fn on_user_message(&self, text: &str);
    /// Final transcription of the model's spoken reply in one turn.
    fn on_model_message(&self, text: &str);
    /// The session ended.  Called exactly once.
    fn on_complete(&self);
    fn on_error(&self, error: &LiveError);
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

pub struct SessionController<D: OutputDevice> {
    state: SessionState,
    playback: PlaybackScheduler<D>,
    transcript: TranscriptAccumulator,
    capture: Option<CaptureHandle>,
    observer: Arc<dyn SessionObserver>,
    error_reported: bool,
    send_error_reported: bool,
    released: bool,
    completed: bool,
}

impl<D: OutputDevice> SessionController<D> {
    pub fn new(playback: PlaybackScheduler<D>, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            state: SessionState::Idle,
            playback,
            transcript: TranscriptAccumulator::new(),
            capture: None,
            observer,
            error_reported: false,
            send_error_reported: false,
            released: false,
            completed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn playback(&self) -> &PlaybackScheduler<D> {
        &self.playback
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("session: {:?} → {:?}", self.state, next);
            self.state = next;
        }
    }

    /// `Idle → Opening`.  Ignored in any other state.
    pub fn begin_open(&mut self) {
        if self.state == SessionState::Idle {
            self.transition(SessionState::Opening);
        }
    }

    /// The stream acknowledged the setup and the microphone was (or was not)
    /// started.
    ///
    /// A microphone failure moves the session to `Errored` and reports
    /// [`LiveError::DeviceAccess`]; the stream itself is left alone.
    pub fn opened(&mut self, capture: Result<CaptureHandle, CaptureError>) {
        if self.state != SessionState::Opening {
            // Dropping the handle stops capture.
            log::debug!("session: open acknowledged in {:?}, ignoring", self.state);
            return;
        }
        match capture {
            Ok(handle) => {
                self.capture = Some(handle);
                self.transition(SessionState::Active);
                log::info!("session: active, streaming microphone");
            }
            Err(e) => self.fail(LiveError::DeviceAccess(e)),
        }
    }

    /// Handle one server message.
    ///
    /// Order within a message: transcription deltas, then the turn-complete
    /// flush, then the audio chunk, then the interruption.
    pub fn dispatch(&mut self, msg: &ServerMessage) {
        if self.state != SessionState::Active {
            log::debug!("session: message dropped in {:?}", self.state);
            return;
        }

        if let Some(delta) = &msg.input_transcription {
            self.transcript.push_input(delta);
        }
        if let Some(delta) = &msg.output_transcription {
            self.transcript.push_output(delta);
        }

        if msg.turn_complete {
            let turn = self.transcript.flush();
            if let Some(text) = turn.user {
                self.observer.on_user_message(&text);
            }
            if let Some(text) = turn.model {
                self.observer.on_model_message(&text);
            }
        }

        if let Some(chunk) = &msg.audio_chunk {
            if let Err(e) = self.playback.enqueue(chunk) {
                log::warn!("session: dropping audio chunk: {e}");
            }
        }

        if msg.interrupted {
            let stopped = self.playback.interrupt();
            log::debug!("session: interrupted, {stopped} buffers stopped");
        }
    }

    /// A scheduled buffer played to its end.
    pub fn playback_finished(&mut self, id: VoiceId) {
        self.playback.finished(id);
    }

    /// Errors raised by the running capture pipeline.
    ///
    /// A rejected frame does not end the session; the first one is
    /// reported as [`LiveError::Send`] and later ones are only logged.
    pub fn capture_failed(&mut self, error: CaptureError) {
        match error {
            CaptureError::Submit(reason) => {
                if self.send_error_reported {
                    log::debug!("session: frame dropped: {reason}");
                    return;
                }
                self.send_error_reported = true;
                log::warn!("session: frame dropped: {reason}");
                self.observer.on_error(&LiveError::Send(reason));
            }
            other => self.fail(LiveError::DeviceAccess(other)),
        }
    }

    /// Unrecoverable failure.  Reported once; moves `Opening`/`Active` to
    /// `Errored` and releases the devices.
    pub fn fail(&mut self, error: LiveError) {
        if self.error_reported {
            log::debug!("session: further error after the first: {error}");
            return;
        }
        self.error_reported = true;
        log::error!("session: {error}");
        self.observer.on_error(&error);

        if self.state.can_fail() {
            self.transition(SessionState::Errored);
        }
        self.release();
    }

    /// The stream ended, from either side.
    pub fn stream_closed(&mut self, reason: Option<&str>) {
        log::info!("session: stream closed ({})", reason.unwrap_or("no reason"));
        self.finish();
    }

    /// Caller-initiated close.  A no-op once `Closed`.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        log::info!("session: closing");
        self.finish();
    }

    fn finish(&mut self) {
        if !self.state.is_finished() {
            self.transition(SessionState::Closing);
        }
        self.release();
        if self.state == SessionState::Closing {
            self.transition(SessionState::Closed);
        }
        if !self.completed {
            self.completed = true;
            self.observer.on_complete();
        }
    }

    /// Stop the microphone and close the output device.  Runs once.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.playback.close();
        log::debug!("session: devices released");
    }
}

// ---------------------------------------------------------------------------
// SessionDevices
// ---------------------------------------------------------------------------

/// Audio endpoints owned by one session.
pub struct SessionDevices {
    /// Opened when the stream acknowledges the setup.
    pub input: Box<dyn InputDevice>,
    pub output: Box<dyn OutputDevice>,
    /// Natural completions reported by `output`.
    pub finished: mpsc::UnboundedReceiver<VoiceId>,
}

impl SessionDevices {
    /// Default microphone and speakers, output at `output_rate` Hz.
    ///
    /// The output stream is opened on the blocking pool; the microphone is
    /// opened later, when the stream acknowledges the setup.
    pub async fn system(output_rate: u32) -> Result<Self, OutputError> {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let output =
            tokio::task::spawn_blocking(move || CpalOutput::open(output_rate, Some(ended_tx)))
                .await
                .map_err(|e| OutputError::Thread(e.to_string()))??;
        Ok(Self {
            input: Box::new(MicInput::new()),
            output: Box::new(output),
            finished: ended_rx,
        })
    }
}

// ---------------------------------------------------------------------------
// SessionOptions
// ---------------------------------------------------------------------------

/// Tunables for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Samples per outbound frame.  Zero fails the session when capture
    /// starts.
    pub frame_size: usize,
    /// Longest time from start until the backend acknowledges the setup.
    pub open_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            frame_size: FRAME_SIZE,
            open_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            frame_size: config.audio.frame_size,
            open_timeout: Duration::from_secs(config.live.connect_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// LiveSession / SessionHandle
// ---------------------------------------------------------------------------

/// Entry point for live conversations.
pub struct LiveSession;

impl LiveSession {
    /// Connect and run a session on a new tokio task.
    ///
    /// Must be called from within a tokio runtime.  Results arrive on
    /// `observer`; the returned handle closes the session.
    pub fn start(
        transport: Arc<dyn LiveTransport>,
        setup: SessionSetup,
        devices: SessionDevices,
        options: SessionOptions,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionHandle {
        let (close_tx, close_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let task = tokio::spawn(run(
            transport, setup, devices, options, observer, close_rx, state_tx,
        ));

        SessionHandle {
            close_tx,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Controls a running session.  Dropping it closes the session.
pub struct SessionHandle {
    close_tx: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Request a close.  Idempotent and safe in any state.
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the state satisfies `pred` (or the session task is gone)
    /// and return it.
    pub async fn wait_until(&mut self, mut pred: impl FnMut(SessionState) -> bool) -> SessionState {
        let _ = self.state.wait_for(|s| pred(*s)).await;
        self.state()
    }

    /// Wait for the session task to end.
    pub async fn finished(mut self) -> SessionState {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("session task failed: {e}");
            }
        }
        self.state()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn close_requested(rx: &mut watch::Receiver<bool>) {
    // A dropped handle counts as a close request.
    let _ = rx.wait_for(|closed| *closed).await;
}

async fn run(
    transport: Arc<dyn LiveTransport>,
    setup: SessionSetup,
    devices: SessionDevices,
    options: SessionOptions,
    observer: Arc<dyn SessionObserver>,
    mut close_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<SessionState>,
) {
    let SessionDevices {
        input,
        output,
        mut finished,
    } = devices;
    let mut controller = SessionController::new(PlaybackScheduler::new(output), observer);

    controller.begin_open();
    state_tx.send_replace(controller.state());
    let open_deadline = Instant::now() + options.open_timeout;

    let connected = tokio::select! {
        result = transport.connect(&setup) => result,
        _ = close_requested(&mut close_rx) => {
            controller.close();
            state_tx.send_replace(controller.state());
            return;
        }
    };

    let mut conn = match connected {
        Ok(conn) => conn,
        Err(e) => {
            controller.fail(e);
            controller.stream_closed(None);
            state_tx.send_replace(controller.state());
            return;
        }
    };

    let mut input = Some(input);
    let (capture_err_tx, mut capture_err_rx) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            event = conn.events.recv() => match event {
                Some(TransportEvent::Opened) => {
                    if let Some(input) = input.take() {
                        let capture = CapturePipeline::spawn(
                            input,
                            options.frame_size,
                            conn.frames.clone(),
                            capture_err_tx.clone(),
                        )
                        .await;
                        controller.opened(capture);
                    }
                }
                Some(TransportEvent::Message(msg)) => controller.dispatch(&msg),
                Some(TransportEvent::Error(e)) => controller.fail(e),
                Some(TransportEvent::Closed { reason }) => {
                    controller.stream_closed(reason.as_deref());
                    break;
                }
                None => {
                    controller.stream_closed(None);
                    break;
                }
            },
            Some(err) = capture_err_rx.recv() => controller.capture_failed(err),
            Some(id) = finished.recv() => controller.playback_finished(id),
            _ = tokio::time::sleep_until(open_deadline), if controller.state() == SessionState::Opening => {
                controller.fail(LiveError::Connect(format!(
                    "setup not acknowledged within {:?}",
                    options.open_timeout
                )));
                conn.close();
                controller.close();
                break;
            }
            _ = close_requested(&mut close_rx) => {
                conn.close();
                controller.close();
                break;
            }
        }
        state_tx.send_replace(controller.state());
    }

    state_tx.send_replace(controller.state());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
