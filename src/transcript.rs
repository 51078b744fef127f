use crate::fuzzy::normalize_token;

/// Tokens the recognizer emits for hesitation noises; dropped before
/// interpretation.
const FILLERS: &[&str] = &["huh", "uh", "um", "erm", "mm", "mmm", "uhh", "uhm"];

/// A finalized utterance after filler and punctuation cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Original wording with leading/trailing fillers removed.
    pub raw: String,
    /// Normalized tokens (lowercased, punctuation stripped).
    pub tokens: Vec<String>,
}

impl Utterance {
    /// Normalized tokens joined with single spaces.
    pub fn lower(&self) -> String {
        self.tokens.join(" ")
    }

    /// First normalized token, if any.
    pub fn head(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }
}

/// Clean a raw transcript for interpretation.
///
/// Strips leading and trailing filler tokens and drops tokens that normalize
/// to nothing. Returns `None` when nothing meaningful remains, which callers
/// treat as a no-op utterance.
pub fn normalize(text: &str) -> Option<Utterance> {
    let raw_tokens: Vec<&str> = text.split_whitespace().collect();
    if raw_tokens.is_empty() {
        return None;
    }

    let is_filler = |t: &str| {
        let norm = normalize_token(t);
        FILLERS.contains(&norm.as_str())
    };

    let mut start = 0;
    let mut end = raw_tokens.len();
    while start < end && is_filler(raw_tokens[start]) {
        start += 1;
    }
    while end > start && is_filler(raw_tokens[end - 1]) {
        end -= 1;
    }
    if start >= end {
        return None;
    }

    let kept = &raw_tokens[start..end];
    let tokens: Vec<String> = kept
        .iter()
        .map(|t| normalize_token(t))
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }

    Some(Utterance {
        raw: kept.join(" "),
        tokens,
    })
}
