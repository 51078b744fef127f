use std::io;
use std::process::Command;
use tracing::{debug, warn};

/// Errors surfaced to the user as text; none of these abort the run loop.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("codex not found - install the codex CLI and authenticate")]
    NotInstalled,
    #[error("failed to invoke codex: {0}")]
    Spawn(#[from] io::Error),
}

/// Synchronous code-generation client. The prompt goes out, the raw
/// response text comes back; extraction happens upstream.
#[cfg_attr(test, mockall::automock)]
pub trait CodeGenerator: Send {
    fn generate(&self, prompt: &str, model: &str, reasoning: &str)
        -> Result<String, CodegenError>;
}

/// Shells out to the `codex` CLI.
pub struct CodexCli;

impl CodexCli {
    /// Argument vector for one invocation, prompt last.
    fn build_args(prompt: &str, model: &str, reasoning: &str) -> Vec<String> {
        vec![
            "exec".to_owned(),
            "--skip-git-repo-check".to_owned(),
            "--model".to_owned(),
            model.to_owned(),
            "--config".to_owned(),
            format!("model_reasoning_effort=\"{reasoning}\""),
            prompt.to_owned(),
        ]
    }
}

impl CodeGenerator for CodexCli {
    fn generate(
        &self,
        prompt: &str,
        model: &str,
        reasoning: &str,
    ) -> Result<String, CodegenError> {
        let args = Self::build_args(prompt, model, reasoning);
        debug!(model, reasoning, prompt_len = prompt.len(), "invoking codex");

        let output = Command::new("codex").args(&args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CodegenError::NotInstalled
            } else {
                CodegenError::Spawn(e)
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            warn!(code, "codex exited non-zero");
            let detail = if stderr.is_empty() { "(no stderr)" } else { stderr };
            Ok(format!("Error (exit code {code}):\n{detail}"))
        }
    }
}
