//! Application entry point.
//!
//! ```text
//! live-voice-chat [chat|live] [--lang en|ja]
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. `chat`: read prompts from stdin, print grounded replies and speak
//!    them through a one-shot player.
//!    `live`: open the live stream with the default microphone and
//!    speakers, print transcripts, stop on Ctrl-C or when the stream ends.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use live_voice_chat::{
    api::GeminiClient,
    audio::{CpalOutput, OneShotPlayer},
    chat::ChatService,
    config::{AppConfig, Language},
    live::{
        GeminiLiveTransport, LiveError, LiveSession, SessionDevices, SessionObserver, SessionOptions,
        SessionSetup,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Chat,
    Live,
}

fn parse_args(config: &mut AppConfig) -> Result<Mode> {
    let mut mode = Mode::Chat;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "chat" => mode = Mode::Chat,
            "live" => mode = Mode::Live,
            "--lang" => {
                let code = args.next().context("--lang needs a value (en or ja)")?;
                config.language =
                    Language::from_code(&code).with_context(|| format!("unknown language `{code}`"))?;
            }
            other => bail!("unexpected argument `{other}`\nusage: live-voice-chat [chat|live] [--lang en|ja]"),
        }
    }
    Ok(mode)
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

async fn run_chat(config: AppConfig) -> Result<()> {
    let client = Arc::new(GeminiClient::from_config(&config.api)?);
    let mut chat = ChatService::new(client.clone(), client, &config);

    // Speech is optional: without an output device replies are text only.
    // One-shot playback never tracks completions.
    let rate = config.audio.output_sample_rate;
    let opened = tokio::task::spawn_blocking(move || CpalOutput::open(rate, None))
        .await
        .context("audio output setup task failed")?;
    let mut player = match opened {
        Ok(output) => Some(OneShotPlayer::new(output)),
        Err(e) => {
            log::warn!("Audio output unavailable ({e}); replies will not be spoken");
            None
        }
    };

    println!("Type a message (Ctrl-D to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match chat.send(&line).await {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };
        println!("{}", reply.text);
        for source in &reply.sources {
            println!("  [{}] {}", source.title, source.uri);
        }

        let Some(player) = player.as_mut() else { continue };
        match chat.speak(&reply).await {
            Ok(audio) => {
                if let Err(e) = player.play(&audio) {
                    log::warn!("Failed to play reply: {e}");
                }
            }
            Err(e) => log::warn!("Speech synthesis failed: {e}"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// live
// ---------------------------------------------------------------------------

struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_user_message(&self, text: &str) {
        println!("you:   {text}");
    }

    fn on_model_message(&self, text: &str) {
        println!("model: {text}");
    }

    fn on_complete(&self) {
        println!("-- conversation ended --");
    }

    fn on_error(&self, error: &LiveError) {
        eprintln!("error: {error}");
    }
}

async fn run_live(config: AppConfig) -> Result<()> {
    let transport = Arc::new(GeminiLiveTransport::from_config(&config)?);
    let devices = SessionDevices::system(config.audio.output_sample_rate).await?;

    let mut handle = LiveSession::start(
        transport,
        SessionSetup::from_config(&config),
        devices,
        SessionOptions::from_config(&config),
        Arc::new(ConsoleObserver),
    );
    println!("Connecting… speak when listening starts (Ctrl-C to stop).");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            log::info!("Ctrl-C received, closing session");
        }
        state = handle.wait_until(|s| s.is_finished()) => {
            log::info!("Session finished ({})", state.label());
        }
    }

    handle.close();
    let state = handle.finished().await;
    log::info!("Session state at exit: {}", state.label());
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("live-voice-chat starting up");

    // 2. Configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let mode = parse_args(&mut config)?;
    log::info!("Mode {mode:?}, language {}", config.language.code());

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Run
    rt.block_on(async move {
        match mode {
            Mode::Chat => run_chat(config).await,
            Mode::Live => run_live(config).await,
        }
    })
}
