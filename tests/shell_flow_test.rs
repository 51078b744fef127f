//! End-to-end interpreter scenarios driven through the public event API,
//! with scripted collaborators standing in for audio and external tools.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use voice_shell::codegen::{CodeGenerator, CodegenError};
use voice_shell::config::Settings;
use voice_shell::events::Event;
use voice_shell::interpreter::Shell;
use voice_shell::logs::ShellLogger;
use voice_shell::profile::VoiceProfile;
use voice_shell::runner::{CommandRunner, RunOutcome};
use voice_shell::speech::{SpeakOptions, Speaker, SpeechError};
use voice_shell::stt::ListeningControl;

/// Returns a fixed response and records every prompt it was given.
struct ScriptedCodegen {
    response: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl CodeGenerator for ScriptedCodegen {
    fn generate(
        &self,
        prompt: &str,
        _model: &str,
        _reasoning: &str,
    ) -> Result<String, CodegenError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        Ok(self.response.clone())
    }
}

/// Records spoken text instead of playing it.
#[derive(Default)]
struct RecordingSpeaker {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl Speaker for RecordingSpeaker {
    fn speak(&self, text: &str, _opts: SpeakOptions) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_owned());
        Ok(())
    }

    fn resume(&self, _opts: SpeakOptions) -> Result<(), SpeechError> {
        Ok(())
    }

    fn pause(&self) {}
    fn stop(&self) {}

    fn is_active(&self) -> bool {
        false
    }
}

/// Records commands instead of running them.
#[derive(Default)]
struct RecordingRunner {
    commands: Arc<Mutex<Vec<String>>>,
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &str) -> std::io::Result<RunOutcome> {
        self.commands.lock().unwrap().push(command.to_owned());
        Ok(RunOutcome {
            lines: vec![format!("ok: {command}")],
            exit_code: 0,
        })
    }
}

struct NoListening;

impl ListeningControl for NoListening {
    fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_listening(&self) -> bool {
        false
    }
}

struct Harness {
    shell: Shell,
    prompts: Arc<Mutex<Vec<String>>>,
    spoken: Arc<Mutex<Vec<String>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(response: &str) -> Self {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let codegen = ScriptedCodegen {
            response: response.to_owned(),
            prompts: Arc::clone(&prompts),
        };
        let speaker = RecordingSpeaker {
            spoken: Arc::clone(&spoken),
        };
        let runner = RecordingRunner {
            commands: Arc::clone(&commands),
        };

        let shell = Shell::new(
            Settings::default(),
            VoiceProfile::new(PathBuf::from("/nonexistent")),
            ShellLogger::new(false, false, std::env::temp_dir()),
            Box::new(codegen),
            Box::new(speaker),
            Box::new(runner),
            Box::new(NoListening),
        );
        Self {
            shell,
            prompts,
            spoken,
            commands,
        }
    }

    fn say(&mut self, text: &str) {
        self.shell.handle_event(Event::Transcript(text.to_owned()));
    }

    fn type_line(&mut self, text: &str) {
        self.shell.handle_event(Event::Line(text.to_owned()));
    }

    fn ran_commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn sent_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[test]
fn test_voice_workflow_from_dictation_to_execution() {
    let mut h = Harness::new("CMD: df -h\nEXPL: show disk usage");

    h.say("Alice prompt");
    h.say("check how much disk space is left");
    h.say("done");
    h.say("Alice shell command");

    // The dictated request made it into the generation prompt.
    let prompts = h.sent_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("check how much disk space is left"));

    // Nothing runs until the confirmation is accepted.
    h.say("Alice execute");
    assert!(h.ran_commands().is_empty());
    h.say("yes");
    assert_eq!(h.ran_commands(), vec!["df -h"]);
}

#[test]
fn test_declined_execution_keeps_proposal_for_later() {
    let mut h = Harness::new("CMD: rm -rf ./build\nEXPL: remove the build directory");

    h.type_line("v-prompt clean out the build artifacts");
    h.type_line("v-command");
    h.say("Alice execute");
    h.say("no");
    assert!(h.ran_commands().is_empty());

    // The pair survived the decline; a second attempt can still run it.
    h.say("Alice execute");
    h.say("yes");
    assert_eq!(h.ran_commands(), vec!["rm -rf ./build"]);
}

#[test]
fn test_buffer_clear_narrows_history_sent_to_generator() {
    let mut h = Harness::new("CMD: true\nEXPL: noop");

    h.type_line("echo before-the-anchor");
    h.type_line("v-buffer clear");
    h.type_line("echo after-the-anchor");
    h.type_line("v-command");

    let prompts = h.sent_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("BUFFER MODE: anchor"));
    assert!(prompts[0].contains("after-the-anchor"));
    assert!(!prompts[0].contains("before-the-anchor"));
}

#[test]
fn test_typed_lines_fall_through_to_the_shell() {
    let mut h = Harness::new("unused");
    h.type_line("git status");
    h.type_line("ls -la");
    assert_eq!(h.ran_commands(), vec!["git status", "ls -la"]);
}

#[test]
fn test_typed_exit_and_clear_are_gated() {
    let mut h = Harness::new("unused");
    h.type_line("exit");
    assert!(!h.shell.exit_requested());
    h.type_line("no");
    assert!(!h.shell.exit_requested());

    h.type_line("clear");
    h.type_line("yes");
    // Still running; only the buffer was cleared.
    assert!(!h.shell.exit_requested());

    h.type_line("quit");
    h.type_line("y");
    assert!(h.shell.exit_requested());
}

#[test]
fn test_unguided_mode_silences_confirmation_chatter() {
    let mut h = Harness::new("unused");
    h.say("Alice mode unguided");
    let announcements = h.spoken().len();

    // Settings narration is guided-only.
    h.say("Alice settings");
    assert_eq!(h.spoken().len(), announcements);

    // Direct read-back requests still speak.
    h.type_line("v-prompt read this back");
    h.say("Alice repeat");
    assert_eq!(h.spoken().len(), announcements + 1);
    assert_eq!(h.spoken().last().map(String::as_str), Some("read this back"));
}

#[test]
fn test_misheard_command_is_ignored_while_confirming() {
    let mut h = Harness::new("CMD: uptime\nEXPL: show uptime");
    h.type_line("v-prompt how long has this machine been up");
    h.type_line("v-command");
    h.say("Alice execute");

    // Neither a yes nor a no; the gate stays closed.
    h.say("please play some music");
    assert!(h.ran_commands().is_empty());

    h.say("yeah");
    assert_eq!(h.ran_commands(), vec!["uptime"]);
}

#[test]
fn test_proposed_internal_command_round_trips() {
    let mut h = Harness::new("CMD: v-history\nEXPL: preview the buffer slice");
    h.type_line("v-voicecmd");
    h.say("Alice execute");
    h.say("yes");
    // The internal command was dispatched, not handed to the shell.
    assert!(h.ran_commands().is_empty());
}
