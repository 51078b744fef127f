use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

const DEBUG_LOG: &str = "voice-shell-debug.log";
const SESSION_LOG: &str = "voice-shell-session.log";

/// Flag-gated append-only log files: a debug trace and a prompt/response
/// session log. Each line is timestamped; write failures are swallowed so
/// logging can never take down the run loop.
#[derive(Debug)]
pub struct ShellLogger {
    pub enable_debug: bool,
    pub enable_session: bool,
    debug_path: PathBuf,
    session_path: PathBuf,
}

impl ShellLogger {
    pub fn new(enable_debug: bool, enable_session: bool, base_dir: PathBuf) -> Self {
        Self {
            enable_debug,
            enable_session,
            debug_path: base_dir.join(DEBUG_LOG),
            session_path: base_dir.join(SESSION_LOG),
        }
    }

    fn append(path: &PathBuf, msg: &str) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(f, "[{ts}] {msg}");
        }
    }

    pub fn debug(&self, msg: &str) {
        if self.enable_debug {
            Self::append(&self.debug_path, msg);
        }
    }

    pub fn session(&self, msg: &str) {
        if self.enable_session {
            Self::append(&self.session_path, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = tempdir().unwrap();
        let logger = ShellLogger::new(false, false, dir.path().to_path_buf());
        logger.debug("hidden");
        logger.session("hidden");
        assert!(!dir.path().join(DEBUG_LOG).exists());
        assert!(!dir.path().join(SESSION_LOG).exists());
    }

    #[test]
    fn test_enabled_logger_appends_timestamped_lines() {
        let dir = tempdir().unwrap();
        let logger = ShellLogger::new(true, true, dir.path().to_path_buf());
        logger.debug("first");
        logger.debug("second");
        logger.session("prompt: hi");

        let debug = std::fs::read_to_string(dir.path().join(DEBUG_LOG)).unwrap();
        assert_eq!(debug.lines().count(), 2);
        assert!(debug.lines().all(|l| l.starts_with('[')));
        assert!(debug.contains("first"));

        let session = std::fs::read_to_string(dir.path().join(SESSION_LOG)).unwrap();
        assert!(session.contains("prompt: hi"));
    }

    #[test]
    fn test_unwritable_path_is_tolerated() {
        let logger = ShellLogger::new(true, true, PathBuf::from("/proc/definitely/not"));
        logger.debug("dropped");
        logger.session("dropped");
    }
}
