//! Voice Shell - a voice- and keyboard-driven front end for a
//! code-generation CLI.
//!
//! This library exports core modules for testing and potential future reuse.

/// Microphone capture and audio resampling
pub mod audio;
/// Rolling console history with windowing policies
pub mod buffer;
/// Guided calibration script and alias derivation
pub mod calibrate;
/// Code-generation tool invocation
pub mod codegen;
/// Settings persistence and command-line overrides
pub mod config;
/// Yes/no confirmation gates
pub mod confirm;
/// Messages flowing into the run loop
pub mod events;
/// CMD/EXPL proposal extraction
pub mod extract;
/// Fuzzy token matching
pub mod fuzzy;
/// The command interpreter and its state machine
pub mod interpreter;
/// Flag-gated debug and session log files
pub mod logs;
/// Per-word pronunciation profile
pub mod profile;
/// Shell command execution
pub mod runner;
/// Per-run interpreter state
pub mod session;
/// Text-to-speech pipeline
pub mod speech;
/// Speech recognition and endpointing
pub mod stt;
/// ANSI styling for tagged output lines
pub mod style;
/// Tracing setup
pub mod telemetry;
/// Utterance normalization
pub mod transcript;
