//! Bidirectional live stream transport.
//!
//! [`LiveTransport::connect`] opens a stream for one session and returns a
//! [`LiveConnection`]: an outbound frame channel, an inbound event channel
//! and a close signal.  [`GeminiLiveTransport`] implements it over a
//! WebSocket with one writer task and one reader task.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::error::LiveError;
use super::message::{parse_inbound, realtime_input_message, setup_message, Inbound, ServerMessage, SessionSetup};
use crate::audio::AudioFrame;
use crate::config::AppConfig;

/// Inbound events buffered between the reader task and the session.
const EVENT_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// TransportEvent / LiveConnection
// ---------------------------------------------------------------------------

/// What the transport reports to the session, in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The backend acknowledged the setup.
    Opened,
    Message(ServerMessage),
    Error(LiveError),
    /// The stream ended.  Always the last event.
    Closed { reason: Option<String> },
}

/// One open live stream.
pub struct LiveConnection {
    /// Outbound audio.  Senders use `try_send`; a full queue drops the frame.
    pub frames: mpsc::Sender<AudioFrame>,
    pub events: mpsc::Receiver<TransportEvent>,
    close: Option<oneshot::Sender<()>>,
}

impl LiveConnection {
    pub fn new(
        frames: mpsc::Sender<AudioFrame>,
        events: mpsc::Receiver<TransportEvent>,
        close: oneshot::Sender<()>,
    ) -> Self {
        Self {
            frames,
            events,
            close: Some(close),
        }
    }

    /// Ask the transport to close the stream.  Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_closing(&self) -> bool {
        self.close.is_none()
    }
}

// ---------------------------------------------------------------------------
// LiveTransport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a stream configured by `setup`.
    ///
    /// Returning `Ok` means the connection exists; the session becomes
    /// active only after [`TransportEvent::Opened`].
    async fn connect(&self, setup: &SessionSetup) -> Result<LiveConnection, LiveError>;
}

// ---------------------------------------------------------------------------
// GeminiLiveTransport
// ---------------------------------------------------------------------------

/// Live stream over the BidiGenerateContent WebSocket.
pub struct GeminiLiveTransport {
    ws_url: String,
    api_key: String,
    outbound_capacity: usize,
    connect_timeout: Duration,
}

impl GeminiLiveTransport {
    pub fn from_config(config: &AppConfig) -> Result<Self, LiveError> {
        let api_key = config.api.resolve_api_key().ok_or(LiveError::MissingApiKey)?;
        Ok(Self {
            ws_url: config.live.ws_url.clone(),
            api_key,
            outbound_capacity: config.live.outbound_capacity.max(1),
            connect_timeout: Duration::from_secs(config.live.connect_timeout_secs),
        })
    }

    fn endpoint(&self) -> Result<url::Url, LiveError> {
        url::Url::parse_with_params(&self.ws_url, [("key", self.api_key.as_str())])
            .map_err(|e| LiveError::Connect(format!("invalid live endpoint: {e}")))
    }
}

#[async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn connect(&self, setup: &SessionSetup) -> Result<LiveConnection, LiveError> {
        let url = self.endpoint()?;

        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| LiveError::Connect(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| LiveError::Connect(e.to_string()))?;

        let (mut sink, stream) = ws.split();
        sink.send(Message::Text(setup_message(setup).to_string()))
            .await
            .map_err(|e| LiveError::Connect(format!("setup not sent: {e}")))?;
        log::info!("live: connected, setup sent (model {}, voice {})", setup.model, setup.voice);

        let (frame_tx, frame_rx) = mpsc::channel(self.outbound_capacity);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(write_loop(sink, frame_rx, close_rx, event_tx.clone()));
        tokio::spawn(read_loop(stream, event_tx));

        Ok(LiveConnection::new(frame_tx, event_rx, close_tx))
    }
}

/// Forward frames as `realtimeInput` until closed, then send a Close frame.
///
/// A failed send ends the writer and is reported on `events` as
/// [`TransportEvent::Error`].
async fn write_loop<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<AudioFrame>,
    mut close: oneshot::Receiver<()>,
    events: mpsc::Sender<TransportEvent>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let text = realtime_input_message(&frame).to_string();
                if let Err(e) = sink.send(Message::Text(text)).await {
                    log::warn!("live: send failed after {sent} frames: {e}");
                    let error = LiveError::Transport(format!("send failed: {e}"));
                    let _ = events.send(TransportEvent::Error(error)).await;
                    break;
                }
                sent += 1;
            }
            _ = &mut close => break,
        }
    }
    if let Err(e) = sink.close().await {
        log::debug!("live: close handshake failed: {e}");
    }
    log::debug!("live: writer finished ({sent} frames sent)");
}

/// Translate socket messages into [`TransportEvent`]s.  Ends with exactly
/// one `Closed`, after an `Error` if the socket failed.
async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::Sender<TransportEvent>) {
    let mut reason = None;

    while let Some(next) = stream.next().await {
        let text = match next {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    log::warn!("live: ignoring non-UTF-8 binary message");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.into())).await;
                break;
            }
        };

        let event = match parse_inbound(&text) {
            Ok(Inbound::SetupComplete) => TransportEvent::Opened,
            Ok(Inbound::Content(msg)) if msg.is_empty() => continue,
            Ok(Inbound::Content(msg)) => TransportEvent::Message(msg),
            Ok(Inbound::GoAway) => {
                log::warn!("live: server announced disconnect");
                continue;
            }
            Ok(Inbound::Other) => continue,
            Err(e) => {
                log::warn!("live: dropping unparseable message: {e}");
                continue;
            }
        };

        if events.send(event).await.is_err() {
            // Session gone; nobody to report to.
            return;
        }
    }

    log::info!("live: stream closed ({})", reason.as_deref().unwrap_or("no reason"));
    let _ = events.send(TransportEvent::Closed { reason }).await;
}
