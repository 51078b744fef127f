use anyhow::Context as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{self, CaptureHandle, FRAME_SAMPLES, TARGET_SAMPLE_RATE};
use crate::events::Event;

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("failed to load whisper model from {path}: {source}")]
    ModelLoad {
        path: String,
        source: anyhow::Error,
    },
    #[error("failed to create whisper state")]
    StateCreation,
    #[error("failed to transcribe audio")]
    Inference(#[from] anyhow::Error),
}

/// Finalized-transcript recognition over 16 kHz mono samples.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, RecognizerError>;
}

/// Whisper-backed recognizer.
pub struct WhisperRecognizer {
    ctx: Mutex<WhisperContext>,
    threads: i32,
    language: Option<String>,
}

impl WhisperRecognizer {
    pub fn new(model_path: &Path, language: Option<String>) -> Result<Self, RecognizerError> {
        let path_str = model_path
            .to_str()
            .ok_or_else(|| RecognizerError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("model path contains invalid UTF-8"),
            })?;

        info!(path = %model_path.display(), "loading whisper model");
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| RecognizerError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("{e:?}"),
            })?;
        info!("whisper model loaded");

        let threads = i32::try_from(thread::available_parallelism().map_or(4, usize::from))
            .unwrap_or(4);
        Ok(Self {
            ctx: Mutex::new(ctx),
            threads,
            language,
        })
    }
}

impl SpeechToText for WhisperRecognizer {
    fn transcribe(&self, audio: &[f32]) -> Result<String, RecognizerError> {
        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| RecognizerError::StateCreation)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref());
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, audio)
            .context("whisper inference failed")?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }
        let text = text.trim().to_owned();
        debug!(
            samples = audio.len(),
            text_len = text.len(),
            inference_ms = start.elapsed().as_millis(),
            "transcription completed"
        );
        Ok(text)
    }
}

// SAFETY: the WhisperContext is only touched under the mutex; no other
// state is shared.
#[allow(unsafe_code)]
unsafe impl Send for WhisperRecognizer {}
#[allow(unsafe_code)]
unsafe impl Sync for WhisperRecognizer {}

/// Energy-based utterance segmentation. Frames accumulate while speech is
/// present; a run of quiet frames closes the segment.
#[derive(Debug)]
pub struct Endpointer {
    threshold: f32,
    quiet_limit: usize,
    max_samples: usize,
    segment: Vec<f32>,
    quiet_run: usize,
    in_speech: bool,
}

impl Default for Endpointer {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            // One second of quiet at the frame size ends the utterance.
            quiet_limit: (TARGET_SAMPLE_RATE as usize) / FRAME_SAMPLES,
            max_samples: (TARGET_SAMPLE_RATE as usize) * 30,
            segment: Vec::new(),
            quiet_run: 0,
            in_speech: false,
        }
    }
}

impl Endpointer {
    fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        {
            ((sum / frame.len() as f64).sqrt()) as f32
        }
    }

    /// Feed one frame; returns a complete utterance's samples when the
    /// segment closes.
    pub fn push_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let loud = Self::rms(frame) >= self.threshold;

        if loud {
            self.in_speech = true;
            self.quiet_run = 0;
            self.segment.extend_from_slice(frame);
            if self.segment.len() >= self.max_samples {
                self.in_speech = false;
                return Some(std::mem::take(&mut self.segment));
            }
            return None;
        }

        if !self.in_speech {
            return None;
        }
        // Keep a little trailing quiet so words are not clipped.
        self.segment.extend_from_slice(frame);
        self.quiet_run += 1;
        if self.quiet_run >= self.quiet_limit {
            self.in_speech = false;
            self.quiet_run = 0;
            return Some(std::mem::take(&mut self.segment));
        }
        None
    }
}

/// Running capture + recognition. Dropping it (or calling `stop`) tears
/// both loops down; in-flight partial recognition is discarded.
pub struct Listening {
    capture: CaptureHandle,
    stop: Arc<AtomicBool>,
}

impl Listening {
    pub fn stop(&self) {
        self.capture.stop();
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for Listening {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Interpreter-facing control over the microphone loops.
#[cfg_attr(test, mockall::automock)]
pub trait ListeningControl: Send {
    fn start(&mut self) -> anyhow::Result<()>;
    fn stop(&mut self);
    fn is_listening(&self) -> bool;
}

/// Live microphone control. Holds the recognizer and the event channel so
/// listening can be torn down and restarted on demand.
pub struct MicControl {
    stt: Arc<dyn SpeechToText>,
    events: UnboundedSender<Event>,
    handle: Option<Listening>,
}

impl MicControl {
    pub const fn new(stt: Arc<dyn SpeechToText>, events: UnboundedSender<Event>) -> Self {
        Self {
            stt,
            events,
            handle: None,
        }
    }
}

impl ListeningControl for MicControl {
    fn start(&mut self) -> anyhow::Result<()> {
        if self.handle.is_none() {
            self.handle = Some(start_listening(
                Arc::clone(&self.stt),
                self.events.clone(),
            )?);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }

    fn is_listening(&self) -> bool {
        self.handle.is_some()
    }
}

/// Stand-in when no recognizer model could be loaded. The shell stays fully
/// usable from the keyboard.
pub struct NoMic;

impl ListeningControl for NoMic {
    fn start(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("speech recognition is unavailable (no model loaded)")
    }

    fn stop(&mut self) {}

    fn is_listening(&self) -> bool {
        false
    }
}

/// Start the capture and recognition loops. Finalized transcripts go out as
/// [`Event::Transcript`] messages; the recognizer itself never touches
/// interpreter state.
pub fn start_listening(
    stt: Arc<dyn SpeechToText>,
    events: UnboundedSender<Event>,
) -> anyhow::Result<Listening> {
    let (frame_tx, frame_rx) = std::sync::mpsc::sync_channel::<Vec<f32>>(32);
    let capture = audio::start_capture(frame_tx)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_loop = Arc::clone(&stop);
    thread::spawn(move || {
        recognition_loop(&stt, &frame_rx, &events, &stop_loop);
    });

    Ok(Listening { capture, stop })
}

fn recognition_loop(
    stt: &Arc<dyn SpeechToText>,
    frames: &Receiver<Vec<f32>>,
    events: &UnboundedSender<Event>,
    stop: &Arc<AtomicBool>,
) {
    let mut endpointer = Endpointer::default();
    while let Ok(frame) = frames.recv() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let Some(utterance) = endpointer.push_frame(&frame) else {
            continue;
        };
        match stt.transcribe(&utterance) {
            Ok(text) => {
                if !text.is_empty() && events.send(Event::Transcript(text)).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "recognition failed");
                let _ = events.send(Event::Notice(format!("[ERROR] Recognition failed: {e}")));
            }
        }
    }
    debug!("recognition loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> Vec<f32> {
        vec![0.5; FRAME_SAMPLES]
    }

    fn quiet_frame() -> Vec<f32> {
        vec![0.0; FRAME_SAMPLES]
    }

    #[test]
    fn test_quiet_only_never_yields() {
        let mut ep = Endpointer::default();
        for _ in 0..10 {
            assert!(ep.push_frame(&quiet_frame()).is_none());
        }
    }

    #[test]
    fn test_segment_closes_after_quiet_run() {
        let mut ep = Endpointer::default();
        assert!(ep.push_frame(&loud_frame()).is_none());
        assert!(ep.push_frame(&loud_frame()).is_none());

        let mut segment = None;
        for _ in 0..ep.quiet_limit {
            segment = ep.push_frame(&quiet_frame());
            if segment.is_some() {
                break;
            }
        }
        let segment = segment.unwrap();
        // Two loud frames plus the trailing quiet tail.
        assert!(segment.len() >= 2 * FRAME_SAMPLES);
    }

    #[test]
    fn test_new_utterance_after_close() {
        let mut ep = Endpointer::default();
        ep.push_frame(&loud_frame());
        for _ in 0..ep.quiet_limit {
            ep.push_frame(&quiet_frame());
        }
        // Second utterance segments independently.
        assert!(ep.push_frame(&loud_frame()).is_none());
        let mut closed = false;
        for _ in 0..ep.quiet_limit {
            if ep.push_frame(&quiet_frame()).is_some() {
                closed = true;
                break;
            }
        }
        assert!(closed);
    }

    #[test]
    fn test_overlong_segment_force_closed() {
        let mut ep = Endpointer::default();
        ep.max_samples = 3 * FRAME_SAMPLES;
        assert!(ep.push_frame(&loud_frame()).is_none());
        assert!(ep.push_frame(&loud_frame()).is_none());
        let segment = ep.push_frame(&loud_frame()).unwrap();
        assert_eq!(segment.len(), 3 * FRAME_SAMPLES);
    }

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert!(Endpointer::rms(&quiet_frame()) < f32::EPSILON);
        assert!(Endpointer::rms(&[]) < f32::EPSILON);
    }

    #[test]
    fn test_recognition_loop_posts_transcripts() {
        let mut stt = MockSpeechToText::new();
        stt.expect_transcribe()
            .returning(|_| Ok("alice run".to_owned()));

        let (frame_tx, frame_rx) = std::sync::mpsc::sync_channel(8);
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stt: Arc<dyn SpeechToText> = Arc::new(stt);
        frame_tx.send(loud_frame()).unwrap();
        for _ in 0..4 {
            frame_tx.send(quiet_frame()).unwrap();
        }
        drop(frame_tx);
        recognition_loop(&stt, &frame_rx, &event_tx, &stop);

        assert_eq!(
            event_rx.try_recv().ok(),
            Some(Event::Transcript("alice run".to_owned()))
        );
    }

    #[test]
    fn test_recognition_loop_reports_errors_as_notices() {
        let mut stt = MockSpeechToText::new();
        stt.expect_transcribe()
            .returning(|_| Err(RecognizerError::StateCreation));

        let (frame_tx, frame_rx) = std::sync::mpsc::sync_channel(8);
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stt: Arc<dyn SpeechToText> = Arc::new(stt);
        frame_tx.send(loud_frame()).unwrap();
        for _ in 0..4 {
            frame_tx.send(quiet_frame()).unwrap();
        }
        drop(frame_tx);
        recognition_loop(&stt, &frame_rx, &event_tx, &stop);

        match event_rx.try_recv() {
            Ok(Event::Notice(msg)) => assert!(msg.contains("Recognition failed")),
            other => panic!("expected notice, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_transcript_is_dropped() {
        let mut stt = MockSpeechToText::new();
        stt.expect_transcribe().returning(|_| Ok(String::new()));

        let (frame_tx, frame_rx) = std::sync::mpsc::sync_channel(8);
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stt: Arc<dyn SpeechToText> = Arc::new(stt);
        frame_tx.send(loud_frame()).unwrap();
        for _ in 0..4 {
            frame_tx.send(quiet_frame()).unwrap();
        }
        drop(frame_tx);
        recognition_loop(&stt, &frame_rx, &event_tx, &stop);

        assert!(event_rx.try_recv().is_err());
    }
}
