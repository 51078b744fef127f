use crate::fuzzy::{self, MODE_THRESHOLD};
use crate::profile::VoiceProfile;

/// Spellings the recognizer commonly produces for the "mode" keyword.
const MODE_HEADS: &[&str] = &["mode", "node", "note", "mowed", "mold", "modee"];

/// The guided-calibration script, templated with the assistant name. The
/// user reads these lines in order; captured phrases map positionally.
pub fn script(name: &str) -> Vec<String> {
    vec![
        format!("{name} mode guided"),
        format!("{name} mode unguided"),
        format!("{name} prompt"),
        format!("{name} reasoning high"),
        format!("{name} reasoning low"),
    ]
}

/// What a calibration pass added, for reporting.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Applied {
    pub wake: Vec<String>,
    pub guided: Vec<String>,
    pub unguided: Vec<String>,
}

impl Applied {
    pub fn is_empty(&self) -> bool {
        self.wake.is_empty() && self.guided.is_empty() && self.unguided.is_empty()
    }
}

/// Derive alias additions from captured phrases and record them in the
/// profile.
///
/// Phrase *i* is assumed to be a reading of script line *i*; mis-ordered
/// readings misattribute, which is accepted. The first token of every
/// phrase, when it is not already the assistant name, becomes a wake-word
/// alias. The first two lines additionally teach the guided/unguided mode
/// words: tokens after the fuzzy-matched mode keyword are classified by
/// substring and similarity heuristics.
pub fn apply_samples(captured: &[String], name: &str, profile: &mut VoiceProfile) -> Applied {
    let base_name = name.trim().to_lowercase();
    let mut applied = Applied::default();

    for (idx, phrase) in captured.iter().enumerate() {
        let tokens: Vec<String> = phrase
            .split_whitespace()
            .map(fuzzy::normalize_token)
            .filter(|t| !t.is_empty())
            .collect();
        let Some(first) = tokens.first() else {
            continue;
        };

        if *first != base_name {
            profile.add_alias(&base_name, first);
            applied.wake.push(first.clone());
        }

        if idx > 1 {
            continue;
        }
        let Some(j_mode) = tokens
            .iter()
            .position(|t| fuzzy::matches(t, MODE_HEADS, MODE_THRESHOLD))
        else {
            continue;
        };
        let tail = &tokens[j_mode + 1..];

        if idx == 0 {
            for t in tail {
                if t.contains("guid") || fuzzy::matches(t, &["guided"], 0.8) {
                    profile.add_alias("guided", t);
                    applied.guided.push(t.clone());
                }
            }
        } else {
            for t in tail {
                if fuzzy::matches(t, &["guided"], 0.9) {
                    continue;
                }
                if t.contains("unguid") || t.starts_with("un") || t.starts_with("on") {
                    profile.add_alias("unguided", t);
                    applied.unguided.push(t.clone());
                }
            }
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn profile() -> VoiceProfile {
        VoiceProfile::new(PathBuf::from("/nonexistent"))
    }

    fn captured(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| (*l).to_owned()).collect()
    }

    #[test]
    fn test_script_is_templated_with_name() {
        let lines = script("Alice");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Alice mode guided");
        assert!(lines.iter().all(|l| l.starts_with("Alice ")));
    }

    #[test]
    fn test_misheard_wake_word_becomes_alias() {
        let mut p = profile();
        let applied = apply_samples(
            &captured(&["Alyce mode guided", "Ellis mode unguided"]),
            "Alice",
            &mut p,
        );
        assert_eq!(applied.wake, vec!["alyce", "ellis"]);
        let wake = p.get_aliases("alice", &[]);
        assert!(wake.contains(&"alyce".to_owned()));
        assert!(wake.contains(&"ellis".to_owned()));
    }

    #[test]
    fn test_exact_wake_word_not_self_aliased() {
        let mut p = profile();
        let applied = apply_samples(&captured(&["alice mode guided"]), "Alice", &mut p);
        assert!(applied.wake.is_empty());
        assert!(p.get_aliases("alice", &[]).is_empty());
    }

    #[test]
    fn test_guided_tail_classified_from_first_line() {
        let mut p = profile();
        let applied = apply_samples(&captured(&["alice node guy did"]), "Alice", &mut p);
        // "node" fuzzy-matches the mode keyword; "guy" misses the guided
        // heuristics but "did" does too, so only substring hits land.
        assert!(applied.guided.is_empty());

        let applied = apply_samples(&captured(&["alice mode guidid"]), "Alice", &mut p);
        assert_eq!(applied.guided, vec!["guidid"]);
        assert_eq!(p.get_aliases("guided", &[]), vec!["guidid"]);
    }

    #[test]
    fn test_unguided_tail_from_second_line() {
        let mut p = profile();
        let applied = apply_samples(
            &captured(&["alice mode guided", "alice mode on guided"]),
            "Alice",
            &mut p,
        );
        // "on" starts the unguided heuristic; the trailing "guided" token is
        // skipped because it matches "guided" too closely.
        assert_eq!(applied.unguided, vec!["on"]);
        assert_eq!(p.get_aliases("unguided", &[]), vec!["on"]);
    }

    #[test]
    fn test_phrase_without_mode_keyword_is_skipped() {
        let mut p = profile();
        let applied = apply_samples(&captured(&["alice hello there"]), "Alice", &mut p);
        assert!(applied.guided.is_empty());
        assert!(applied.unguided.is_empty());
    }

    #[test]
    fn test_empty_capture_applies_nothing() {
        let mut p = profile();
        let applied = apply_samples(&[], "Alice", &mut p);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_later_lines_only_teach_wake_word() {
        let mut p = profile();
        let applied = apply_samples(
            &captured(&["", "", "ellis prompt", "ellis reasoning high"]),
            "Alice",
            &mut p,
        );
        assert_eq!(applied.wake, vec!["ellis", "ellis"]);
        assert!(applied.guided.is_empty());
        assert_eq!(p.get_aliases("alice", &[]), vec!["ellis"]);
    }
}
