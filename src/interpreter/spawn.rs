//! External command resolution and spawning.
//!
//! Resolution walks `$PATH` with a name→path hash cache (`hash -r` and
//! PATH assignment invalidate it). Children reset SIGINT/SIGQUIT to the
//! default disposition before exec; exec failures map to 126/127 and a
//! death by signal N reports 128+N.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use super::errors::ExecError;
use super::io::CommandIo;
use super::signals;
use super::state::ShellState;

/// A failed spawn, carrying the shell-level exit status.
#[derive(Debug)]
pub struct SpawnFailure {
    pub status: i32,
    pub message: String,
}

/// Resolve a command name to an executable path.
pub fn resolve_external(state: &mut ShellState, name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            state.cwd.join(name)
        };
        return path.is_file().then_some(path);
    }

    if let Some(cached) = state.path_cache.get(name) {
        if cached.is_file() {
            return Some(cached.clone());
        }
        state.path_cache.remove(name);
    }

    let path_var = state.get_string("PATH").unwrap_or_default();
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() && is_executable(&candidate) {
            state.path_cache.insert(name.to_string(), candidate.clone());
            return Some(candidate);
        }
    }
    None
}

pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Spawn an external command with the given io routing and extra
/// environment bindings.
pub fn spawn_external(
    state: &ShellState,
    path: &Path,
    argv: &[String],
    extra_env: &HashMap<String, String>,
    io: &CommandIo,
) -> Result<Child, SpawnFailure> {
    use std::os::unix::process::CommandExt;

    let mut command = Command::new(path);
    command.args(&argv[1..]);
    command.arg0(&argv[0]);
    command.env_clear();
    command.envs(state.exported_env());
    command.envs(extra_env);
    command.current_dir(&state.cwd);

    let map_io = |e: std::io::Error| SpawnFailure {
        status: 125,
        message: format!("cannot set up file descriptors: {}", e),
    };
    command.stdin(io.stdio_for(0).map_err(map_io)?);
    command.stdout(io.stdio_for(1).map_err(map_io)?);
    command.stderr(io.stdio_for(2).map_err(map_io)?);

    let extra_fds = io.extra_raw_fds();
    unsafe {
        command.pre_exec(move || {
            for (target, raw) in &extra_fds {
                if libc::dup2(*raw, *target) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            libc::signal(libc::SIGINT, libc::SIG_DFL);
            libc::signal(libc::SIGQUIT, libc::SIG_DFL);
            Ok(())
        });
    }

    command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SpawnFailure {
            status: 127,
            message: format!("{}: command not found", argv[0]),
        },
        std::io::ErrorKind::PermissionDenied => SpawnFailure {
            status: 126,
            message: format!("{}: permission denied", argv[0]),
        },
        _ => SpawnFailure { status: 126, message: format!("{}: {}", argv[0], e) },
    })
}

/// Wait for a foreground child, mapping death-by-signal to 128+N.
pub fn wait_foreground(mut child: Child) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    signals::set_foreground_pid(child.id() as i32);
    let status = child.wait();
    signals::clear_foreground_pid();

    match status {
        Ok(status) => match status.code() {
            Some(code) => code,
            None => 128 + status.signal().unwrap_or(0),
        },
        Err(_) => 127,
    }
}

/// Run one external command to completion.
pub fn run_external(
    state: &mut ShellState,
    argv: &[String],
    extra_env: &HashMap<String, String>,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let Some(path) = resolve_external(state, &argv[0]) else {
        use std::io::Write;
        let mut stderr = io.stderr_writer();
        let _ = writeln!(stderr, "den: {}: command not found", argv[0]);
        return Ok(127);
    };

    if !is_executable(&path) {
        use std::io::Write;
        let mut stderr = io.stderr_writer();
        let _ = writeln!(stderr, "den: {}: permission denied", argv[0]);
        return Ok(126);
    }

    match spawn_external(state, &path, argv, extra_env, io) {
        Ok(child) => Ok(wait_foreground(child)),
        Err(failure) => {
            use std::io::Write;
            let mut stderr = io.stderr_writer();
            let _ = writeln!(stderr, "den: {}", failure.message);
            Ok(failure.status)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
