use crate::confirm::ConfirmReason;
use crate::extract::Proposal;

/// Interaction mode of the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    /// Dictation is being appended to the prompt buffer.
    PromptCapture,
    /// A yes/no gate is open for the given reason.
    Confirming(ConfirmReason),
    /// Guided calibration: utterances stack as captured script phrases.
    Calibrating,
    /// Per-word calibration: utterances stack as candidate aliases for the
    /// named word.
    WordCalibrating(String),
}

/// One request/response exchange with the code-generation tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: String,
    pub response: String,
}

/// Per-run interpreter state. Everything here is owned by the single event
/// loop; background loops communicate by message only.
#[derive(Debug, Default)]
pub struct SessionState {
    pub mode: Mode,
    /// Free text accumulated during prompt capture.
    pub prompt: String,
    /// Proposed command + explanation awaiting confirmation. Set and
    /// cleared only as a pair.
    pending: Option<Proposal>,
    /// Most recent code-generation exchange.
    pub last_exchange: Option<Exchange>,
    /// Phrases captured during guided calibration, in spoken order.
    pub captured_phrases: Vec<String>,
    /// Candidate alias lines captured during per-word calibration.
    pub word_candidates: Vec<String>,
    /// Whether the capture/recognition loops are running.
    pub listening: bool,
}

impl SessionState {
    pub fn pending(&self) -> Option<&Proposal> {
        self.pending.as_ref()
    }

    /// Install a new pending proposal, replacing any previous one.
    pub fn set_pending(&mut self, proposal: Proposal) {
        self.pending = Some(proposal);
    }

    /// Drop the pending proposal, returning it if there was one.
    pub fn take_pending(&mut self) -> Option<Proposal> {
        self.pending.take()
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Append dictated text to the prompt buffer with a separating space.
    pub fn append_prompt(&mut self, text: &str) {
        if !self.prompt.is_empty() {
            self.prompt.push(' ');
        }
        self.prompt.push_str(text);
    }

    /// Leave any calibration state, discarding captured material.
    pub fn reset_calibration(&mut self) {
        self.captured_phrases.clear();
        self.word_candidates.clear();
    }
}
