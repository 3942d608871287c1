//! Live session state machine.

/// States of a live conversation.
///
/// ```text
/// Idle ──start──▶ Opening ──setup ack + mic ok──▶ Active
///                    │                              │
///                    ├──connect/mic/stream error──▶ Errored (absorbing)
///                    │                              │
///                    └──────────close (either end)──┴──▶ Closing ──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, not yet connecting.
    #[default]
    Idle,

    /// Connecting and waiting for the setup acknowledgement.
    Opening,

    /// Microphone streaming; server messages are being dispatched.
    Active,

    /// Releasing devices.
    Closing,

    /// Finished normally.
    Closed,

    /// Finished after an unrecoverable error.
    Errored,
}

impl SessionState {
    /// `true` once the session can no longer carry a conversation.
    ///
    /// ```
    /// use live_voice_chat::live::SessionState;
    ///
    /// assert!(!SessionState::Active.is_finished());
    /// assert!(SessionState::Closed.is_finished());
    /// assert!(SessionState::Errored.is_finished());
    /// ```
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }

    /// States an error may be raised from.
    pub fn can_fail(&self) -> bool {
        matches!(self, SessionState::Opening | SessionState::Active)
    }

    /// A short human-readable label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Opening => "Connecting",
            SessionState::Active => "Listening",
            SessionState::Closing => "Closing",
            SessionState::Closed => "Closed",
            SessionState::Errored => "Error",
        }
    }
}
