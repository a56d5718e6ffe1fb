//! Script running and the bounded source cache.
//!
//! The cache is keyed by path and validated by mtime on every hit, LRU
//! over a fixed entry count. `source` and the script runner share it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use lazy_static::lazy_static;

use crate::interpreter::executor;
use crate::interpreter::io::CommandIo;
use crate::interpreter::{ExecError, ShellState};

const CACHE_CAPACITY: usize = 64;

struct CacheEntry {
    mtime: SystemTime,
    text: String,
}

struct SourceCache {
    entries: HashMap<PathBuf, CacheEntry>,
    /// Access order, oldest first.
    order: Vec<PathBuf>,
}

impl SourceCache {
    fn touch(&mut self, path: &Path) {
        self.order.retain(|p| p != path);
        self.order.push(path.to_path_buf());
    }

    fn evict(&mut self) {
        while self.entries.len() > CACHE_CAPACITY {
            let Some(oldest) = self.order.first().cloned() else {
                break;
            };
            self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

lazy_static! {
    static ref SOURCE_CACHE: Mutex<SourceCache> = Mutex::new(SourceCache {
        entries: HashMap::new(),
        order: Vec::new(),
    });
}

/// Load a script, via the cache when the stored mtime still matches.
pub fn load_source(path: &Path) -> io::Result<String> {
    let mtime = std::fs::metadata(path)?.modified()?;

    if let Ok(mut cache) = SOURCE_CACHE.lock() {
        if let Some(entry) = cache.entries.get(path) {
            if entry.mtime == mtime {
                let text = entry.text.clone();
                cache.touch(path);
                return Ok(text);
            }
        }
    }

    let text = std::fs::read_to_string(path)?;
    if let Ok(mut cache) = SOURCE_CACHE.lock() {
        cache.entries.insert(
            path.to_path_buf(),
            CacheEntry { mtime, text: text.clone() },
        );
        cache.touch(path);
        cache.evict();
    }
    Ok(text)
}

/// Run a script file with positional arguments. `$0` becomes the script
/// path; the EXIT trap fires before returning. The result is the script's
/// exit status.
pub fn run_script(
    state: &mut ShellState,
    path: &Path,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, String> {
    let text = load_source(path).map_err(|e| format!("{}: {}", path.display(), e))?;

    state.script_name = path.display().to_string();
    state.positional = args.to_vec();

    let status = run_source(state, &text, io);
    executor::fire_exit_trap(state, io);
    status
}

/// Parse and execute script text against the given state, mapping shell
/// teardown errors to an exit status.
pub fn run_source(state: &mut ShellState, text: &str, io: &CommandIo) -> Result<i32, String> {
    let script = match crate::parser::parse(text) {
        Ok(script) => script,
        Err(err) => {
            use std::io::Write;
            let mut stderr = io.stderr_writer();
            let _ = writeln!(stderr, "den: syntax error: {}", err);
            return Ok(2);
        }
    };

    match executor::execute_script(state, &script, io) {
        Ok(status) => Ok(status),
        Err(ExecError::Exit(code)) | Err(ExecError::Errexit(code)) => Ok(code),
        Err(ExecError::Return(code)) => Ok(code),
        Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => Ok(0),
        Err(err) => Err(err.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ShellState {
        let mut state = ShellState::default();
        state.set_string("PATH", "/usr/bin:/bin".to_string()).unwrap();
        state
    }

    #[test]
    fn runs_script_with_positional_args() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.sh");
        std::fs::write(&path, "result=$1-$2\n").unwrap();

        let mut state = test_state();
        let status = run_script(
            &mut state,
            &path,
            &["a".to_string(), "b".to_string()],
            &CommandIo::inherit(),
        )
        .unwrap();
        assert_eq!(status, 0);
        assert_eq!(state.get_string("result"), Some("a-b".to_string()));
        assert_eq!(state.script_name, path.display().to_string());
    }

    #[test]
    fn exit_status_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.sh");
        std::fs::write(&path, "exit 9\n").unwrap();

        let mut state = test_state();
        let status =
            run_script(&mut state, &path, &[], &CommandIo::inherit()).unwrap();
        assert_eq!(status, 9);
    }

    #[test]
    fn syntax_error_is_status_2() {
        let mut state = test_state();
        let status = run_source(&mut state, "if then fi", &CommandIo::inherit()).unwrap();
        assert_eq!(status, 2);
    }

    #[test]
    fn cache_serves_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.sh");
        std::fs::write(&path, "x=1\n").unwrap();

        let first = load_source(&path).unwrap();
        let second = load_source(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cache_reloads_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changing.sh");
        std::fs::write(&path, "old\n").unwrap();
        load_source(&path).unwrap();

        // Force a different mtime.
        let past = SystemTime::now() - std::time::Duration::from_secs(60);
        std::fs::write(&path, "new\n").unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let _ = file.set_modified(past);

        assert_eq!(load_source(&path).unwrap(), "new\n");
    }
}
