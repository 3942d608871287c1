//! Per-turn transcription buffers.

/// Text flushed at the end of a turn.  A side is `None` when its buffer was
/// empty or whitespace only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnTranscript {
    pub user: Option<String>,
    pub model: Option<String>,
}

/// Accumulates input (user) and output (model) transcription deltas until
/// the turn completes.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    input: String,
    output: String,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, delta: &str) {
        self.input.push_str(delta);
    }

    pub fn push_output(&mut self, delta: &str) {
        self.output.push_str(delta);
    }

    /// Trim both buffers, return the non-empty ones and reset to empty.
    pub fn flush(&mut self) -> TurnTranscript {
        TurnTranscript {
            user: take_trimmed(&mut self.input),
            model: take_trimmed(&mut self.output),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}

fn take_trimmed(buf: &mut String) -> Option<String> {
    let text = std::mem::take(buf);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
