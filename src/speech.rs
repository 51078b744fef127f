use anyhow::{Context, Result};
use chrono::Local;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

use crate::audio::CpalSink;

/// Longest text chunk handed to the synthesizer in one call.
pub const MAX_CHUNK_CHARS: usize = 320;

const DEFAULT_PIPER_RATE: u32 = 22_050;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("piper not found - install piper and download a voice model")]
    NotInstalled,
    #[error("no voice models available")]
    NoVoices,
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("a speech request is already playing")]
    Busy,
}

/// Synthesized audio at a model-declared rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Turns a text chunk into audio. Voice selection is by index into the
/// installed voice list, wrapping when out of range.
#[cfg_attr(test, mockall::automock)]
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, voice_index: usize) -> Result<Clip, SpeechError>;
    fn voice_count(&self) -> usize;
}

/// Plays a mono clip, blocking until it drains.
#[cfg_attr(test, mockall::automock)]
pub trait Playback: Send + Sync {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

impl Playback for CpalSink {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        Self::play(self, samples, sample_rate)
    }
}

/// Strip formatting noise before synthesis: code fences, markdown markers,
/// bracketed tags, collapsed whitespace.
pub fn clean_for_speech(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("```") {
            continue;
        }
        let stripped: String = line
            .chars()
            .filter(|c| !matches!(c, '`' | '*' | '#' | '_' | '|' | '>'))
            .collect();
        let stripped = stripped.trim();
        if stripped.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(stripped);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentence-grouped chunks no longer than `max` characters.
/// Oversized sentences are hard-split on word boundaries.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut acc = String::new();
    for sentence in sentences {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if sentence.len() > max {
            if !acc.is_empty() {
                chunks.push(std::mem::take(&mut acc));
            }
            let mut piece = String::new();
            for word in sentence.split_whitespace() {
                if !piece.is_empty() && piece.len() + 1 + word.len() > max {
                    chunks.push(std::mem::take(&mut piece));
                }
                if !piece.is_empty() {
                    piece.push(' ');
                }
                piece.push_str(word);
            }
            if !piece.is_empty() {
                chunks.push(piece);
            }
            continue;
        }
        if !acc.is_empty() && acc.len() + 1 + sentence.len() > max {
            chunks.push(std::mem::take(&mut acc));
        }
        if !acc.is_empty() {
            acc.push(' ');
        }
        acc.push_str(sentence);
    }
    if !acc.is_empty() {
        chunks.push(acc);
    }
    chunks
}

/// External `piper` synthesizer. Voices are `.onnx` models found in the
/// voices directory, sorted by name; each model's sample rate comes from its
/// sidecar JSON when present.
pub struct PiperTts {
    voices: Vec<PathBuf>,
}

impl PiperTts {
    pub fn new(voices_dir: &Path) -> Self {
        let mut voices: Vec<PathBuf> = std::fs::read_dir(voices_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "onnx"))
            .collect();
        voices.sort();
        info!(count = voices.len(), dir = %voices_dir.display(), "piper voices discovered");
        Self { voices }
    }

    fn model_rate(model: &Path) -> u32 {
        let sidecar = PathBuf::from(format!("{}.json", model.display()));
        let Ok(text) = std::fs::read_to_string(sidecar) else {
            return DEFAULT_PIPER_RATE;
        };
        serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v["audio"]["sample_rate"].as_u64())
            .and_then(|r| u32::try_from(r).ok())
            .unwrap_or(DEFAULT_PIPER_RATE)
    }
}

impl Synthesizer for PiperTts {
    fn synthesize(&self, text: &str, voice_index: usize) -> Result<Clip, SpeechError> {
        if self.voices.is_empty() {
            return Err(SpeechError::NoVoices);
        }
        let model = &self.voices[voice_index % self.voices.len()];
        debug!(model = %model.display(), chars = text.len(), "synthesizing");

        let mut child = Command::new("piper")
            .arg("--model")
            .arg(model)
            .arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SpeechError::NotInstalled
                } else {
                    SpeechError::Synthesis(e.to_string())
                }
            })?;

        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            let _ = stdin.write_all(text.as_bytes());
        }
        let output = child
            .wait_with_output()
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        if !output.status.success() {
            return Err(SpeechError::Synthesis(format!(
                "piper exited with {}",
                output.status
            )));
        }

        // Raw output is s16le mono.
        let samples: Vec<f32> = output
            .stdout
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / f32::from(i16::MAX))
            .collect();
        Ok(Clip {
            samples,
            sample_rate: Self::model_rate(model),
        })
    }

    fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

/// Per-request playback options.
#[derive(Debug, Clone, Copy)]
pub struct SpeakOptions {
    pub speed: f64,
    pub voice_index: usize,
    pub record: bool,
}

/// Chunked playback progress, shared between the owner and the worker.
#[derive(Debug, Default)]
struct PlaybackState {
    chunks: Vec<String>,
    index: usize,
    stop: bool,
    paused: bool,
}

/// What the interpreter needs from the speech subsystem.
#[cfg_attr(test, mockall::automock)]
pub trait Speaker: Send {
    /// Start speaking `text`. Fails with [`SpeechError::Busy`] while a
    /// previous request is still playing.
    fn speak(&self, text: &str, opts: SpeakOptions) -> Result<(), SpeechError>;
    /// Resume a paused request at its stored chunk index.
    fn resume(&self, opts: SpeakOptions) -> Result<(), SpeechError>;
    fn pause(&self);
    fn stop(&self);
    fn is_active(&self) -> bool;
}

/// Drives chunked synthesis and playback on a worker thread. Stop and pause
/// are cooperative flags checked between synthesis and playback of each
/// chunk, never mid-chunk. Each chunk plays at most once.
pub struct SpeechService {
    synth: Arc<dyn Synthesizer>,
    sink: Arc<dyn Playback>,
    state: Arc<Mutex<PlaybackState>>,
    active: Arc<AtomicBool>,
    recordings_dir: PathBuf,
}

impl SpeechService {
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        sink: Arc<dyn Playback>,
        recordings_dir: PathBuf,
    ) -> Self {
        Self {
            synth,
            sink,
            state: Arc::new(Mutex::new(PlaybackState::default())),
            active: Arc::new(AtomicBool::new(false)),
            recordings_dir,
        }
    }

    fn spawn_worker(&self, opts: SpeakOptions) {
        let synth = Arc::clone(&self.synth);
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let active = Arc::clone(&self.active);
        let recordings_dir = self.recordings_dir.clone();

        thread::spawn(move || {
            let mut recorded: Vec<f32> = Vec::new();
            let mut recorded_rate = DEFAULT_PIPER_RATE;
            loop {
                let chunk = {
                    let Ok(mut st) = state.lock() else { break };
                    if st.stop || st.index >= st.chunks.len() {
                        if !st.paused {
                            st.chunks.clear();
                            st.index = 0;
                        }
                        break;
                    }
                    st.chunks[st.index].clone()
                };

                let clip = match synth.synthesize(&chunk, opts.voice_index) {
                    Ok(clip) => clip,
                    Err(e) => {
                        warn!(error = %e, "synthesis failed, abandoning playback");
                        if let Ok(mut st) = state.lock() {
                            st.chunks.clear();
                            st.index = 0;
                        }
                        break;
                    }
                };

                // Re-check between synthesis and playback so stop/pause act
                // within one chunk of latency.
                let stopped = state.lock().map(|st| st.stop).unwrap_or(true);
                if stopped {
                    break;
                }

                if opts.record {
                    recorded.extend_from_slice(&clip.samples);
                    recorded_rate = clip.sample_rate;
                }

                // Speed control: declare the clip at a scaled rate and let
                // the sink resample to the device rate.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let scaled_rate = (f64::from(clip.sample_rate) * opts.speed) as u32;
                if let Err(e) = sink.play(&clip.samples, scaled_rate.max(1)) {
                    warn!(error = %e, "playback failed, abandoning request");
                    if let Ok(mut st) = state.lock() {
                        st.chunks.clear();
                        st.index = 0;
                    }
                    break;
                }

                if let Ok(mut st) = state.lock() {
                    st.index += 1;
                }
            }

            if opts.record && !recorded.is_empty() {
                if let Err(e) = write_recording(&recordings_dir, &recorded, recorded_rate) {
                    warn!(error = %e, "failed to write speech recording");
                }
            }
            active.store(false, Ordering::Release);
        });
    }
}

impl Speaker for SpeechService {
    fn speak(&self, text: &str, opts: SpeakOptions) -> Result<(), SpeechError> {
        let chunks = chunk_text(&clean_for_speech(text), MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Ok(());
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SpeechError::Busy);
        }
        if let Ok(mut st) = self.state.lock() {
            st.chunks = chunks;
            st.index = 0;
            st.stop = false;
            st.paused = false;
        }
        self.spawn_worker(opts);
        Ok(())
    }

    fn resume(&self, opts: SpeakOptions) -> Result<(), SpeechError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SpeechError::Busy);
        }
        let resumable = self.state.lock().map_or(false, |mut st| {
            if st.paused && st.index < st.chunks.len() {
                st.stop = false;
                st.paused = false;
                true
            } else {
                false
            }
        });
        if !resumable {
            self.active.store(false, Ordering::Release);
            return Ok(());
        }
        self.spawn_worker(opts);
        Ok(())
    }

    fn pause(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.stop = true;
            st.paused = true;
        }
    }

    fn stop(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.stop = true;
            st.paused = false;
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

fn write_recording(dir: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    std::fs::create_dir_all(dir).context("failed to create recordings directory")?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("speech-{stamp}.wav"));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).context("failed to create WAV")?;
    for &s in samples {
        #[allow(clippy::cast_possible_truncation)]
        let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(v).context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize WAV")?;
    info!(path = %path.display(), samples = samples.len(), "speech recording saved");
    Ok(())
}
