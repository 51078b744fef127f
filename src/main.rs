use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use voice_shell::codegen::CodexCli;
use voice_shell::config::{Overrides, Settings};
use voice_shell::events::Event;
use voice_shell::interpreter::Shell;
use voice_shell::logs::ShellLogger;
use voice_shell::profile::VoiceProfile;
use voice_shell::runner::ShRunner;
use voice_shell::speech::{PiperTts, SpeechService};
use voice_shell::stt::{
    ListeningControl, MicControl, NoMic, SpeechToText, WhisperRecognizer,
};
use voice_shell::{audio, telemetry};

/// Newest .bin file in the models directory, if any.
fn find_whisper_model(dir: &std::path::Path) -> Option<std::path::PathBuf> {
    let mut models: Vec<std::path::PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "bin"))
        .collect();
    models.sort();
    models.pop()
}

#[tokio::main]
async fn main() -> Result<()> {
    let (overrides, unknown) = Overrides::parse(std::env::args().skip(1));
    let mut settings = Settings::load();
    settings.apply(&overrides);

    telemetry::init(settings.debug);
    info!("voice-shell starting");
    for flag in unknown {
        eprintln!("warning: ignoring unknown flag: {flag}");
    }

    let data_dir = Settings::data_dir()?;
    let logger = ShellLogger::new(settings.debug, settings.save_prompts, data_dir.clone());
    let profile = VoiceProfile::load(Settings::profile_path()?);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    // Speech recognition is optional; the shell stays usable from the
    // keyboard when no model is installed.
    let mut listening: Box<dyn ListeningControl> =
        match find_whisper_model(&data_dir.join("models")) {
            Some(model_path) => match WhisperRecognizer::new(&model_path, None) {
                Ok(recognizer) => {
                    let stt: Arc<dyn SpeechToText> = Arc::new(recognizer);
                    Box::new(MicControl::new(stt, event_tx.clone()))
                }
                Err(e) => {
                    eprintln!("warning: {e}; continuing without speech recognition");
                    Box::new(NoMic)
                }
            },
            None => {
                eprintln!(
                    "note: no whisper model in {}; continuing without speech recognition",
                    data_dir.join("models").display()
                );
                Box::new(NoMic)
            }
        };
    if let Err(e) = listening.start() {
        eprintln!("note: listening not started: {e}");
    }

    let synth = Arc::new(PiperTts::new(&data_dir.join("voices")));
    let sink = Arc::new(audio::CpalSink);
    let speaker = SpeechService::new(synth, sink, data_dir.join("recordings"));

    let mut shell = Shell::new(
        settings,
        profile,
        logger,
        Box::new(CodexCli),
        Box::new(speaker),
        Box::new(ShRunner),
        listening,
    );
    shell.print_banner();

    // Blocking stdin reader; typed lines become events like everything else.
    let line_tx = event_tx.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    let _ = line_tx.send(Event::Eof);
                    break;
                }
                Ok(_) => {
                    if line_tx
                        .send(Event::Line(line.trim_end_matches(['\r', '\n']).to_owned()))
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        shell.handle_event(event);
                        if shell.exit_requested() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                println!();
                break;
            }
        }
    }

    info!("voice-shell stopped");
    Ok(())
}
