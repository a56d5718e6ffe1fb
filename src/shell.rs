//! The shell façade: owns the interpreter state, loads startup files and
//! drives the three run modes (interactive, `-c` string, script file).

use std::path::{Path, PathBuf};

use crate::history;
use crate::interpreter::executor;
use crate::interpreter::io::CommandIo;
use crate::interpreter::{signals, ShellState};
use crate::script;

#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    pub interactive: bool,
    pub login: bool,
    /// `--config PATH`: this file replaces the default startup files.
    pub config_path: Option<PathBuf>,
}

pub struct Shell {
    pub state: ShellState,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        signals::install_base_handlers();

        let mut state = ShellState::from_env();
        state.interactive = config.interactive;
        let _ = state.set_string("SHELL", "den".to_string());

        let mut shell = Shell { state };
        shell.load_startup_files(&config);
        shell
    }

    /// Startup file order: `--config` replaces everything; login shells
    /// read /etc/profile, ~/.den_profile, ~/.denrc; interactive non-login
    /// shells read ~/.denrc; non-interactive shells read nothing.
    fn load_startup_files(&mut self, config: &ShellConfig) {
        if let Some(path) = &config.config_path {
            self.source_if_exists(path.clone());
            return;
        }

        let home = self.state.get_string("HOME").map(PathBuf::from);
        if config.login {
            self.source_if_exists(PathBuf::from("/etc/profile"));
            if let Some(home) = &home {
                self.source_if_exists(home.join(".den_profile"));
                self.source_if_exists(home.join(".denrc"));
            }
        } else if config.interactive {
            if let Some(home) = &home {
                self.source_if_exists(home.join(".denrc"));
            }
        }
    }

    fn source_if_exists(&mut self, path: PathBuf) {
        if !path.is_file() {
            return;
        }
        let Ok(text) = script::load_source(&path) else {
            return;
        };
        let io = CommandIo::inherit();
        if let Err(message) = script::run_source(&mut self.state, &text, &io) {
            eprintln!("den: {}: {}", path.display(), message);
        }
    }

    /// `den -c "CMD"`: run a command string and return its exit status.
    /// The EXIT trap fires before returning.
    pub fn run_command(&mut self, text: &str) -> i32 {
        let io = CommandIo::inherit();
        let status = match script::run_source(&mut self.state, text, &io) {
            Ok(status) => status,
            Err(message) => {
                eprintln!("den: {}", message);
                1
            }
        };
        self.state.last_exit_code = status;
        executor::fire_exit_trap(&mut self.state, &io);
        self.state.jobs.wait_all();
        status
    }

    /// `den SCRIPT [ARGS…]`.
    pub fn run_script(&mut self, path: &Path, args: &[String]) -> i32 {
        let io = CommandIo::inherit();
        let status = match script::run_script(&mut self.state, path, args, &io) {
            Ok(status) => status,
            Err(message) => {
                eprintln!("den: {}", message);
                127
            }
        };
        self.state.last_exit_code = status;
        self.state.jobs.wait_all();
        status
    }

    /// Interactive session; returns the final exit status.
    pub fn run_interactive(&mut self) -> i32 {
        let status = crate::repl::run(self);
        let io = CommandIo::inherit();
        executor::fire_exit_trap(&mut self.state, &io);
        self.save_history_bound();
        status
    }

    fn save_history_bound(&self) {
        if let Some(path) = history::history_path(&self.state) {
            let _ = history::trim_to_size(&path, history::history_size(&self.state));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> ShellConfig {
        ShellConfig {
            interactive: false,
            login: false,
            config_path: None,
        }
    }

    #[test]
    fn run_command_returns_status() {
        let mut shell = Shell::new(quiet_config());
        assert_eq!(shell.run_command("exit 5"), 5);
    }

    #[test]
    fn run_command_keeps_state_between_calls() {
        let mut shell = Shell::new(quiet_config());
        shell.run_command("X=persist");
        assert_eq!(shell.state.get_string("X"), Some("persist".to_string()));
    }

    #[test]
    fn config_file_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join("custom_rc");
        std::fs::write(&rc, "from_config=1\n").unwrap();

        let shell = Shell::new(ShellConfig {
            interactive: false,
            login: false,
            config_path: Some(rc),
        });
        assert_eq!(shell.state.get_string("from_config"), Some("1".to_string()));
    }

    #[test]
    fn exit_trap_fires_for_command_mode() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let mut shell = Shell::new(quiet_config());
        let cmd = format!("trap 'echo bye > {}' EXIT; exit 3", marker.display());
        assert_eq!(shell.run_command(&cmd), 3);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "bye\n");
    }
}
