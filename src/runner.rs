use std::io;
use std::process::Command;
use tracing::debug;

/// Result of one shell invocation: combined output lines plus exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub lines: Vec<String>,
    pub exit_code: i32,
}

/// Executes an OS shell command line. Non-zero status is reported in the
/// outcome, never an error; only failure to spawn is.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send {
    fn run(&self, command: &str) -> io::Result<RunOutcome>;
}

/// Runs commands through `sh -c`.
pub struct ShRunner;

impl CommandRunner for ShRunner {
    fn run(&self, command: &str) -> io::Result<RunOutcome> {
        debug!(command, "running shell command");
        let output = Command::new("sh").arg("-c").arg(command).output()?;

        let mut lines = Vec::new();
        for chunk in [&output.stdout, &output.stderr] {
            let text = String::from_utf8_lossy(chunk);
            lines.extend(text.lines().map(str::to_owned));
        }
        Ok(RunOutcome {
            lines,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_lines() {
        let out = ShRunner.run("printf 'a\\nb\\n'").unwrap();
        assert_eq!(out.lines, vec!["a", "b"]);
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let out = ShRunner.run("printf oops >&2; exit 3").unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.lines, vec!["oops"]);
    }

    #[test]
    fn test_stderr_follows_stdout() {
        let out = ShRunner.run("printf 'out\\n'; printf 'err\\n' >&2").unwrap();
        assert_eq!(out.lines, vec!["out", "err"]);
    }
}
