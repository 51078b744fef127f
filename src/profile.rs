use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default number of alias samples that counts as fully calibrated.
pub const DEFAULT_TARGET_SAMPLES: usize = 3;

/// Canonical words seeded into a fresh profile so the calibration table is
/// never empty. Derived from the command vocabulary.
const BASE_WORDS: &[&str] = &[
    "buffer", "clear", "continue", "done", "enter", "execute", "exit", "guided", "help",
    "history", "listen", "log", "mode", "model", "no", "pause", "prompt", "reasoning",
    "repeat", "respond", "run", "save", "settings", "speed", "stop", "unguided", "yes",
];

/// Calibration progress for a canonical word, derived from alias count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    Uncalibrated,
    Partial,
    Calibrated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WordRecord {
    aliases: BTreeSet<String>,
    last_calibrated: Option<String>,
    status: Option<CalibrationStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileData {
    target_samples: usize,
    words: BTreeMap<String, WordRecord>,
}

/// Persistent per-word pronunciation profile.
///
/// Maps each canonical command word to the spellings the recognizer tends to
/// produce for it. Statuses are a pure function of alias count versus
/// `target_samples` and are recomputed on every read; the stored value only
/// exists for export fidelity.
#[derive(Debug)]
pub struct VoiceProfile {
    path: PathBuf,
    target_samples: usize,
    words: BTreeMap<String, WordRecord>,
}

impl VoiceProfile {
    /// Create an empty profile bound to `path`, seeded with the base command
    /// vocabulary. Does not touch the filesystem.
    pub fn new(path: PathBuf) -> Self {
        let mut words = BTreeMap::new();
        for w in BASE_WORDS {
            words.insert((*w).to_owned(), WordRecord::default());
        }
        Self {
            path,
            target_samples: DEFAULT_TARGET_SAMPLES,
            words,
        }
    }

    /// Load the profile from its bound path, merging over the seeded
    /// vocabulary. A missing or malformed file is treated as an empty
    /// profile, never an error.
    pub fn load(path: PathBuf) -> Self {
        let mut profile = Self::new(path);
        let contents = match fs::read_to_string(&profile.path) {
            Ok(c) => c,
            Err(_) => return profile,
        };
        match serde_json::from_str::<ProfileData>(&contents) {
            Ok(data) => {
                profile.merge(data);
                info!(path = %profile.path.display(), "voice profile loaded");
            }
            Err(e) => {
                warn!(path = %profile.path.display(), error = %e, "malformed voice profile ignored");
            }
        }
        profile
    }

    fn merge(&mut self, data: ProfileData) {
        if data.target_samples > 0 {
            self.target_samples = data.target_samples;
        }
        for (word, record) in data.words {
            let key = word.to_lowercase();
            let entry = self.words.entry(key).or_default();
            entry.aliases = record
                .aliases
                .into_iter()
                .map(|a| a.to_lowercase())
                .filter(|a| !a.is_empty())
                .collect();
            entry.last_calibrated = record.last_calibrated;
        }
    }

    fn serialized(&self) -> ProfileData {
        let words = self
            .words
            .iter()
            .map(|(w, r)| {
                let mut record = r.clone();
                record.status = Some(self.status_for(&record));
                (w.clone(), record)
            })
            .collect();
        ProfileData {
            target_samples: self.target_samples,
            words,
        }
    }

    /// Persist to the bound path. Failures are logged, never raised.
    pub fn save(&self) {
        if let Err(e) = self.write_to(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to save voice profile");
        }
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create profile directory")?;
        }
        let json = serde_json::to_string_pretty(&self.serialized())
            .context("failed to serialize voice profile")?;
        fs::write(path, json).context("failed to write voice profile")?;
        Ok(())
    }

    /// Export the full profile (words, aliases, target, timestamps, status)
    /// to an arbitrary path.
    pub fn export(&self, path: &Path) -> Result<()> {
        self.write_to(path)
    }

    /// Import a profile file. With `replace`, every existing word's aliases
    /// are cleared before the imported data is merged; all statuses are then
    /// recomputed from the merged alias sets.
    pub fn import(&mut self, path: &Path, replace: bool) -> Result<()> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let data: ProfileData = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse profile {}", path.display()))?;

        if replace {
            for record in self.words.values_mut() {
                record.aliases.clear();
                record.last_calibrated = None;
            }
        }
        self.merge(data);
        Ok(())
    }

    /// Guarantee an entry exists for `word`; no-op when already present.
    pub fn ensure_word(&mut self, word: &str) {
        let key = word.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        self.words.entry(key).or_default();
    }

    /// Aliases recorded for `word`, or `default` when none are.
    pub fn get_aliases(&self, word: &str, default: &[&str]) -> Vec<String> {
        match self.words.get(&word.to_lowercase()) {
            Some(record) if !record.aliases.is_empty() => {
                record.aliases.iter().cloned().collect()
            }
            _ => default.iter().map(|d| (*d).to_lowercase()).collect(),
        }
    }

    /// Add a single alias for `word`. Idempotent; empty input is ignored.
    pub fn add_alias(&mut self, word: &str, alias: &str) {
        self.add_aliases(word, std::slice::from_ref(&alias));
    }

    /// Add several aliases for `word`, normalizing and deduplicating.
    pub fn add_aliases<S: AsRef<str>>(&mut self, word: &str, aliases: &[S]) {
        let key = word.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        let record = self.words.entry(key).or_default();
        let mut changed = false;
        for alias in aliases {
            let a = alias.as_ref().trim().to_lowercase();
            if !a.is_empty() && record.aliases.insert(a) {
                changed = true;
            }
        }
        if changed || !aliases.is_empty() {
            record.last_calibrated = Some(Utc::now().to_rfc3339());
        }
    }

    /// Replace the entire alias set for `word`. An empty set leaves the word
    /// `Uncalibrated`.
    pub fn set_aliases<S: AsRef<str>>(&mut self, word: &str, aliases: &[S]) {
        let key = word.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        let record = self.words.entry(key).or_default();
        record.aliases = aliases
            .iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        record.last_calibrated = Some(Utc::now().to_rfc3339());
    }

    /// Remove aliases for `word`: all of them when `which` is `None`,
    /// otherwise just the listed subset.
    pub fn delete_aliases(&mut self, word: &str, which: Option<&[String]>) {
        let Some(record) = self.words.get_mut(&word.to_lowercase()) else {
            return;
        };
        match which {
            None => record.aliases.clear(),
            Some(subset) => {
                for a in subset {
                    record.aliases.remove(&a.to_lowercase());
                }
            }
        }
    }

    fn status_for(&self, record: &WordRecord) -> CalibrationStatus {
        let n = record.aliases.len();
        if n == 0 {
            CalibrationStatus::Uncalibrated
        } else if n < self.target_samples {
            CalibrationStatus::Partial
        } else {
            CalibrationStatus::Calibrated
        }
    }

    /// Calibration status for `word`, recomputed from the current alias
    /// count and target.
    pub fn status(&self, word: &str) -> CalibrationStatus {
        self.words
            .get(&word.to_lowercase())
            .map_or(CalibrationStatus::Uncalibrated, |r| self.status_for(r))
    }

    pub fn target_samples(&self) -> usize {
        self.target_samples
    }

    /// Change the calibration target. Statuses follow automatically since
    /// they are derived on read; alias data is untouched.
    pub fn set_target_samples(&mut self, target: usize) {
        if target > 0 {
            self.target_samples = target;
        }
    }

    /// All known canonical words, sorted.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scratch_profile() -> VoiceProfile {
        VoiceProfile::new(PathBuf::from("/nonexistent/profile.json"))
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let mut p = scratch_profile();
        p.set_aliases("guided", &["Guy Did", "guidance", "guy did"]);
        assert_eq!(p.get_aliases("guided", &[]), vec!["guidance", "guy did"]);
    }

    #[test]
    fn test_unknown_word_yields_default() {
        let p = scratch_profile();
        assert_eq!(
            p.get_aliases("wake", &["alice", "alyce"]),
            vec!["alice", "alyce"]
        );
        assert!(p.get_aliases("wake", &[]).is_empty());
    }

    #[test]
    fn test_add_alias_is_idempotent() {
        let mut p = scratch_profile();
        p.add_alias("guided", "guy did");
        p.add_alias("guided", "guy did");
        assert_eq!(p.get_aliases("guided", &[]), vec!["guy did"]);
    }

    #[test]
    fn test_status_tracks_count_against_target() {
        let mut p = scratch_profile();
        assert_eq!(p.status("yes"), CalibrationStatus::Uncalibrated);
        p.add_alias("yes", "yeah");
        assert_eq!(p.status("yes"), CalibrationStatus::Partial);
        p.add_aliases("yes", &["yep", "sure"]);
        assert_eq!(p.status("yes"), CalibrationStatus::Calibrated);
    }

    #[test]
    fn test_target_change_recomputes_status_without_touching_aliases() {
        let mut p = scratch_profile();
        p.add_aliases("no", &["nope", "nah"]);
        assert_eq!(p.status("no"), CalibrationStatus::Partial);
        p.set_target_samples(2);
        assert_eq!(p.status("no"), CalibrationStatus::Calibrated);
        assert_eq!(p.get_aliases("no", &[]), vec!["nah", "nope"]);
        // Zero is rejected
        p.set_target_samples(0);
        assert_eq!(p.target_samples(), 2);
    }

    #[test]
    fn test_set_empty_returns_to_uncalibrated() {
        let mut p = scratch_profile();
        p.add_alias("mode", "node");
        let none: [&str; 0] = [];
        p.set_aliases("mode", &none);
        assert_eq!(p.status("mode"), CalibrationStatus::Uncalibrated);
    }

    #[test]
    fn test_delete_subset_and_all() {
        let mut p = scratch_profile();
        p.add_aliases("stop", &["stahp", "staup", "stob"]);
        p.delete_aliases("stop", Some(&["STAHP".to_owned()]));
        assert_eq!(p.get_aliases("stop", &[]), vec!["staup", "stob"]);
        p.delete_aliases("stop", None);
        assert_eq!(p.status("stop"), CalibrationStatus::Uncalibrated);
    }

    #[test]
    fn test_ensure_word_creates_empty_entry() {
        let mut p = scratch_profile();
        p.ensure_word("Kodak");
        assert!(p.words().any(|w| w == "kodak"));
        assert_eq!(p.status("kodak"), CalibrationStatus::Uncalibrated);
    }

    #[test]
    fn test_load_missing_file_is_empty_profile() {
        let p = VoiceProfile::load(PathBuf::from("/definitely/not/here.json"));
        assert_eq!(p.target_samples(), DEFAULT_TARGET_SAMPLES);
    }

    #[test]
    fn test_load_malformed_file_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.json");
        fs::write(&path, "{ not json").unwrap();
        let p = VoiceProfile::load(path);
        assert_eq!(p.target_samples(), DEFAULT_TARGET_SAMPLES);
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exported.json");

        let mut a = scratch_profile();
        a.set_target_samples(5);
        a.set_aliases("guided", &["guy did", "guidance"]);
        a.add_alias("wake", "alyce");
        a.export(&path).unwrap();

        let mut b = scratch_profile();
        b.add_alias("guided", "stale alias");
        b.import(&path, true).unwrap();

        assert_eq!(b.target_samples(), 5);
        assert_eq!(b.get_aliases("guided", &[]), vec!["guidance", "guy did"]);
        assert_eq!(b.get_aliases("wake", &[]), vec!["alyce"]);
    }

    #[test]
    fn test_import_without_replace_merges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exported.json");

        let mut a = scratch_profile();
        a.add_alias("yes", "yeah");
        a.export(&path).unwrap();

        let mut b = scratch_profile();
        b.add_alias("no", "nah");
        b.import(&path, false).unwrap();
        assert_eq!(b.get_aliases("yes", &[]), vec!["yeah"]);
        assert_eq!(b.get_aliases("no", &[]), vec!["nah"]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let mut p = VoiceProfile::new(path.clone());
        p.add_aliases("unguided", &["on guided", "unguarded"]);
        p.save();

        let reloaded = VoiceProfile::load(path);
        assert_eq!(
            reloaded.get_aliases("unguided", &[]),
            vec!["on guided", "unguarded"]
        );
    }
}
