use crate::fuzzy::{self, CONFIRM_THRESHOLD};
use crate::profile::VoiceProfile;

/// Why a confirmation is pending. Each destructive or consequential action
/// has its own reason so the accept path knows what to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReason {
    /// Execute the pending proposed command.
    Execute,
    /// Erase the console history buffer.
    ClearBuffer,
    /// Terminate the run loop.
    Exit,
    /// Persist settings to disk.
    SaveSettings,
    /// Enable speech recording.
    SaveRecordings,
    /// Enable prompt/response logging.
    SavePrompts,
}

impl ConfirmReason {
    /// Question asked when this confirmation opens.
    pub fn question(self) -> &'static str {
        match self {
            Self::Execute => "Execute the pending command?",
            Self::ClearBuffer => "Clear the console history?",
            Self::Exit => "Exit the shell?",
            Self::SaveSettings => "Save settings to disk?",
            Self::SaveRecordings => "Enable speech recording?",
            Self::SavePrompts => "Enable prompt logging?",
        }
    }
}

/// Outcome of interpreting an utterance or typed line while confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
    /// Neither a yes nor a no; the confirmation stays open.
    Unclear,
}

/// Interpret a typed reply: exact literals only, no fuzzy latitude.
pub fn parse_typed(line: &str) -> Decision {
    match line.trim().to_lowercase().as_str() {
        "yes" | "y" | "confirm" => Decision::Accept,
        "no" | "n" | "cancel" => Decision::Decline,
        _ => Decision::Unclear,
    }
}

/// Interpret a spoken reply's head token against the calibrated yes/no
/// aliases, fuzzy-matched.
pub fn parse_spoken(head: &str, profile: &VoiceProfile) -> Decision {
    let yes = profile.get_aliases("yes", &["yes", "yeah", "yep", "confirm"]);
    if fuzzy::matches(head, &yes, CONFIRM_THRESHOLD) {
        return Decision::Accept;
    }
    let no = profile.get_aliases("no", &["no", "nope", "nah", "cancel"]);
    if fuzzy::matches(head, &no, CONFIRM_THRESHOLD) {
        return Decision::Decline;
    }
    Decision::Unclear
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_typed_literals() {
        assert_eq!(parse_typed("yes"), Decision::Accept);
        assert_eq!(parse_typed(" Y "), Decision::Accept);
        assert_eq!(parse_typed("confirm"), Decision::Accept);
        assert_eq!(parse_typed("no"), Decision::Decline);
        assert_eq!(parse_typed("N"), Decision::Decline);
        assert_eq!(parse_typed("cancel"), Decision::Decline);
        assert_eq!(parse_typed("maybe"), Decision::Unclear);
        assert_eq!(parse_typed(""), Decision::Unclear);
    }

    #[test]
    fn test_typed_is_not_fuzzy() {
        assert_eq!(parse_typed("yess"), Decision::Unclear);
    }

    #[test]
    fn test_spoken_uses_defaults_when_uncalibrated() {
        let p = VoiceProfile::new(PathBuf::from("/nonexistent"));
        assert_eq!(parse_spoken("yes", &p), Decision::Accept);
        assert_eq!(parse_spoken("Yeah!", &p), Decision::Accept);
        assert_eq!(parse_spoken("nope", &p), Decision::Decline);
        assert_eq!(parse_spoken("pineapple", &p), Decision::Unclear);
    }

    #[test]
    fn test_spoken_honors_calibrated_aliases() {
        let mut p = VoiceProfile::new(PathBuf::from("/nonexistent"));
        p.add_alias("yes", "aye");
        assert_eq!(parse_spoken("aye", &p), Decision::Accept);
    }

    #[test]
    fn test_question_text_per_reason() {
        assert!(ConfirmReason::Execute.question().contains("Execute"));
        assert!(ConfirmReason::Exit.question().contains("Exit"));
    }
}
