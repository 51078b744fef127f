use tracing::trace;

/// Default acceptance threshold for command-word matching.
pub const DEFAULT_THRESHOLD: f64 = 0.78;

/// Looser threshold for the wake word, which varies a lot between speakers.
pub const WAKE_THRESHOLD: f64 = 0.72;

/// Loosest threshold, used for the mode keyword during calibration.
pub const MODE_THRESHOLD: f64 = 0.70;

/// Threshold for yes/no decisions while a confirmation is pending.
pub const CONFIRM_THRESHOLD: f64 = 0.75;

/// Strip surrounding whitespace and punctuation and lowercase a token.
pub fn normalize_token(token: &str) -> String {
    token
        .trim_matches(|c: char| c.is_whitespace() || ",.!?'\"".contains(c))
        .to_lowercase()
}

/// Similarity ratio in [0, 1] between two already-normalized strings.
///
/// Order-sensitive sequence alignment: "guided" vs "guy did" scores high,
/// "guided" vs "diugde" does not.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Whether `word` denotes the same canonical word as any of `candidates`.
///
/// Both sides are normalized before comparison. Returns true iff the best
/// similarity over all candidates is at least `threshold`. An empty word or
/// empty candidate set never matches.
pub fn matches<S: AsRef<str>>(word: &str, candidates: &[S], threshold: f64) -> bool {
    let word = normalize_token(word);
    if word.is_empty() || candidates.is_empty() {
        return false;
    }

    let mut best = 0.0_f64;
    for candidate in candidates {
        let candidate = normalize_token(candidate.as_ref());
        if candidate.is_empty() {
            continue;
        }
        let ratio = similarity(&word, &candidate);
        trace!(word = %word, candidate = %candidate, ratio, "fuzzy check");
        if ratio > best {
            best = ratio;
        }
    }
    best >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_at_default_threshold() {
        assert!(matches("guided", &["guided"], DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_unrelated_word_rejected() {
        assert!(!matches("xyz123", &["guided"], DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        assert!(matches("Guided!", &["guided"], DEFAULT_THRESHOLD));
        assert!(matches("guided", &["GUIDED"], DEFAULT_THRESHOLD));
        assert!(matches("'guided,'", &["guided"], DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_empty_inputs_never_match() {
        assert!(!matches("", &["guided"], DEFAULT_THRESHOLD));
        let none: [&str; 0] = [];
        assert!(!matches("guided", &none, DEFAULT_THRESHOLD));
        assert!(!matches("?!", &["guided"], DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_near_miss_accepted_at_loose_threshold() {
        // Typical recognizer slip for "mode"
        assert!(matches("node", &["mode"], MODE_THRESHOLD));
        assert!(!matches("node", &["mode"], 0.9));
    }

    #[test]
    fn test_best_candidate_wins() {
        assert!(matches("mowed", &["prompt", "mode", "mowed"], DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_similarity_bounds() {
        assert!((similarity("guided", "guided") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("guided", "zzzzzz") < 0.2);
    }
}
