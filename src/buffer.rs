use serde::{Deserialize, Serialize};

/// Upper bound on lines included in a code-generation context window.
pub const WINDOW_CAP: usize = 400;

/// Upper bound on lines shown by the history preview.
pub const PREVIEW_CAP: usize = 40;

/// Which slice of console history feeds the code-generation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    /// Everything since process start.
    #[default]
    Session,
    /// Everything since the last explicit buffer clear.
    Anchor,
    /// Everything since the last shell execution or generated response.
    Last,
}

impl BufferMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Anchor => "anchor",
            Self::Last => "last",
        }
    }
}

/// Rolling log of every line printed during the run, with two movable
/// offsets into it. A "buffer clear" moves the anchor rather than erasing
/// history; only a confirmed clear-history action truncates the log.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    lines: Vec<String>,
    mode: BufferMode,
    anchor: usize,
    last_action: usize,
}

impl ConsoleBuffer {
    pub fn new(mode: BufferMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub const fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BufferMode) {
        self.mode = mode;
    }

    /// Move the anchor to the current end of the buffer. History survives;
    /// the `anchor` window just starts empty from here.
    pub fn set_anchor_here(&mut self) {
        self.anchor = self.lines.len();
    }

    /// Record that a shell command or generated response just landed, for
    /// the `last` window policy.
    pub fn mark_action_here(&mut self) {
        self.last_action = self.lines.len();
    }

    /// Erase all history and reset both offsets.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.anchor = 0;
        self.last_action = 0;
    }

    fn start_for(&self, mode: BufferMode) -> usize {
        let start = match mode {
            BufferMode::Session => 0,
            BufferMode::Anchor => self.anchor,
            BufferMode::Last => self.last_action,
        };
        start.min(self.lines.len())
    }

    fn slice(&self, mode: BufferMode, cap: usize) -> &[String] {
        let window = &self.lines[self.start_for(mode)..];
        let skip = window.len().saturating_sub(cap);
        &window[skip..]
    }

    /// Newline-joined slice under the current policy, capped to the most
    /// recent [`WINDOW_CAP`] lines.
    pub fn window(&self) -> String {
        self.slice(self.mode, WINDOW_CAP).join("\n")
    }

    /// Lines to show for a history preview: same policy slice, capped to
    /// the most recent [`PREVIEW_CAP`] lines.
    pub fn preview(&self) -> &[String] {
        self.slice(self.mode, PREVIEW_CAP)
    }
}
