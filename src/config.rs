use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::buffer::BufferMode;

/// Models the code-generation tool accepts, in cycling order.
pub const MODEL_OPTIONS: &[&str] = &["gpt-5", "gpt-5-codex", "gpt-4.1", "gpt-4o"];

/// Reasoning-effort levels, lowest to highest.
pub const REASONING_OPTIONS: &[&str] = &["none", "low", "medium", "high"];

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 2.0;
pub const SPEED_STEP: f64 = 0.25;

/// Persisted user settings. Read at startup, written only on an explicit
/// confirmed save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub name: String,
    pub guided: bool,
    pub model: String,
    pub reasoning: String,
    pub debug: bool,
    pub save_recordings: bool,
    pub save_prompts: bool,
    pub use_color: bool,
    pub speed: f64,
    pub buffer_mode: BufferMode,
    pub voice_index: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "Alice".to_owned(),
            guided: true,
            model: "gpt-5".to_owned(),
            reasoning: "medium".to_owned(),
            debug: true,
            save_recordings: true,
            save_prompts: true,
            use_color: true,
            speed: 1.20,
            buffer_mode: BufferMode::Session,
            voice_index: 1,
        }
    }
}

impl Settings {
    /// Load from the default location, falling back to defaults on any
    /// missing or malformed file.
    pub fn load() -> Self {
        let Ok(path) = Self::settings_path() else {
            return Self::default();
        };
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match toml::from_str::<Self>(&contents) {
            Ok(mut settings) => {
                settings.speed = clamp_speed(settings.speed);
                if !MODEL_OPTIONS.contains(&settings.model.as_str()) {
                    settings.model = Self::default().model;
                }
                if !REASONING_OPTIONS.contains(&settings.reasoning.as_str()) {
                    settings.reasoning = Self::default().reasoning;
                }
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed settings file ignored");
                Self::default()
            }
        }
    }

    /// Write to the default location. Called only after a confirmed save.
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create settings directory")?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Directory holding settings, profile, logs and recordings.
    pub fn data_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".voice-shell"))
    }

    fn settings_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("settings.toml"))
    }

    pub fn profile_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("profile.json"))
    }

    /// Apply launch-flag overrides for this run without writing them back.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(v) = overrides.debug {
            self.debug = v;
        }
        if let Some(v) = overrides.save_recordings {
            self.save_recordings = v;
        }
        if let Some(v) = overrides.save_prompts {
            self.save_prompts = v;
        }
        if let Some(v) = overrides.use_color {
            self.use_color = v;
        }
        if let Some(v) = overrides.guided {
            self.guided = v;
        }
        if let Some(v) = overrides.voice_index {
            self.voice_index = v;
        }
        if let Some(v) = overrides.speed {
            self.speed = clamp_speed(v);
        }
    }
}

/// Clamp a requested playback speed to the supported range, snapped to the
/// step size.
pub fn clamp_speed(speed: f64) -> f64 {
    let clamped = speed.clamp(MIN_SPEED, MAX_SPEED);
    (clamped / SPEED_STEP).round() * SPEED_STEP
}

/// Launch flags that override persisted settings for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overrides {
    pub debug: Option<bool>,
    pub save_recordings: Option<bool>,
    pub save_prompts: Option<bool>,
    pub use_color: Option<bool>,
    pub guided: Option<bool>,
    pub voice_index: Option<usize>,
    pub speed: Option<f64>,
}

impl Overrides {
    /// Parse launch flags. Unknown flags are reported, not fatal.
    pub fn parse<I, S>(args: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::default();
        let mut unknown = Vec::new();
        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "-logdebug" => overrides.debug = Some(true),
                "-nodebug" => overrides.debug = Some(false),
                "-record" => overrides.save_recordings = Some(true),
                "-norecord" => overrides.save_recordings = Some(false),
                "-saveprompts" => overrides.save_prompts = Some(true),
                "-nosaveprompts" => overrides.save_prompts = Some(false),
                "-color" => overrides.use_color = Some(true),
                "-nocolor" => overrides.use_color = Some(false),
                "-guided" => overrides.guided = Some(true),
                "-unguided" => overrides.guided = Some(false),
                _ => {
                    if let Some(rest) = arg.strip_prefix("-voice:") {
                        match rest.parse() {
                            Ok(n) => overrides.voice_index = Some(n),
                            Err(_) => unknown.push(arg.to_owned()),
                        }
                    } else if let Some(rest) = arg.strip_prefix("-speed:") {
                        match rest.parse() {
                            Ok(x) => overrides.speed = Some(x),
                            Err(_) => unknown.push(arg.to_owned()),
                        }
                    } else {
                        unknown.push(arg.to_owned());
                    }
                }
            }
        }
        (overrides, unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.name, "Alice");
        assert!(s.guided);
        assert_eq!(s.model, "gpt-5");
        assert_eq!(s.reasoning, "medium");
        assert!((s.speed - 1.20).abs() < f64::EPSILON);
        assert_eq!(s.buffer_mode, BufferMode::Session);
    }

    #[test]
    fn test_clamp_speed_bounds_and_step() {
        assert!((clamp_speed(0.1) - 0.5).abs() < f64::EPSILON);
        assert!((clamp_speed(3.0) - 2.0).abs() < f64::EPSILON);
        assert!((clamp_speed(1.3) - 1.25).abs() < f64::EPSILON);
        assert!((clamp_speed(1.25) - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_boolean_flags() {
        let (o, unknown) =
            Overrides::parse(["-nodebug", "-record", "-nocolor", "-unguided"]);
        assert_eq!(o.debug, Some(false));
        assert_eq!(o.save_recordings, Some(true));
        assert_eq!(o.use_color, Some(false));
        assert_eq!(o.guided, Some(false));
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_parse_valued_flags() {
        let (o, unknown) = Overrides::parse(["-voice:2", "-speed:1.5"]);
        assert_eq!(o.voice_index, Some(2));
        assert_eq!(o.speed, Some(1.5));
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_flags_reported() {
        let (o, unknown) = Overrides::parse(["-bogus", "-voice:abc", "-speed:fast"]);
        assert_eq!(o, Overrides::default());
        assert_eq!(unknown, vec!["-bogus", "-voice:abc", "-speed:fast"]);
    }

    #[test]
    fn test_apply_overrides_clamps_speed() {
        let mut s = Settings::default();
        let (o, _) = Overrides::parse(["-speed:9.0", "-nodebug"]);
        s.apply(&o);
        assert!((s.speed - 2.0).abs() < f64::EPSILON);
        assert!(!s.debug);
        // untouched fields keep their values
        assert!(s.guided);
    }

    #[test]
    fn test_settings_toml_round_trip() {
        let mut s = Settings::default();
        s.buffer_mode = BufferMode::Anchor;
        s.voice_index = 3;
        let text = toml::to_string(&s).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back.buffer_mode, BufferMode::Anchor);
        assert_eq!(back.voice_index, 3);
    }
}
