//! `eval`, `source`/`.`, `exec`.

use std::io::Write;

use crate::ast::Redirection;
use crate::interpreter::errors::ExecError;
use crate::interpreter::executor;
use crate::interpreter::io::CommandIo;
use crate::interpreter::redirect;
use crate::interpreter::spawn;
use crate::interpreter::state::ShellState;

use super::fail;

pub fn eval(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let text = args.join(" ");
    if text.trim().is_empty() {
        return Ok(0);
    }
    let script = match crate::parser::parse(&text) {
        Ok(script) => script,
        Err(err) => return Ok(fail(io, "eval", err, 2)),
    };
    executor::execute_script(state, &script, io)
}

pub fn source(
    state: &mut ShellState,
    name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let Some(path_arg) = args.first() else {
        return Ok(fail(io, name, "filename argument required", 2));
    };

    let path = resolve_source_path(state, path_arg);
    let text = match crate::script::load_source(&path) {
        Ok(text) => text,
        Err(err) => return Ok(fail(io, name, format!("{}: {}", path_arg, err), 1)),
    };

    let script = match crate::parser::parse(&text) {
        Ok(script) => script,
        Err(err) => return Ok(fail(io, name, format!("{}: {}", path_arg, err), 2)),
    };

    // Extra arguments become the positional parameters for the file.
    let saved_positional = if args.len() > 1 {
        Some(std::mem::replace(&mut state.positional, args[1..].to_vec()))
    } else {
        None
    };

    state.source_depth += 1;
    let result = executor::execute_script(state, &script, io);
    state.source_depth -= 1;

    if let Some(saved) = saved_positional {
        state.positional = saved;
    }

    match result {
        Ok(status) => Ok(status),
        // `return` inside a sourced file terminates that file only.
        Err(ExecError::Return(code)) => Ok(code),
        Err(err) => Err(err),
    }
}

/// `source` searches PATH for relative names without a slash, then the
/// working directory.
fn resolve_source_path(state: &mut ShellState, name: &str) -> std::path::PathBuf {
    if !name.contains('/') {
        let path_var = state.get_string("PATH").unwrap_or_default();
        for dir in path_var.split(':') {
            if dir.is_empty() {
                continue;
            }
            let candidate = std::path::Path::new(dir).join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    state.resolve_path(name)
}

pub fn exec_cmd(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.is_empty() {
        return Ok(0);
    }
    // The shell gives way to the command: run it on the shell's fds and
    // leave with its status.
    let status = spawn::run_external(state, args, &std::collections::HashMap::new(), io)?;
    Err(ExecError::Exit(status))
}

/// `exec` with redirections and no command: rewrite the shell's fds for
/// the rest of the session. Called from the executor, which holds the
/// un-expanded redirection list.
pub fn run_exec_redirections(
    state: &mut ShellState,
    redirections: &[Redirection],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    match redirect::apply_permanent(state, redirections) {
        Ok(()) => Ok(0),
        Err(err) => {
            let mut stderr = io.stderr_writer();
            let _ = writeln!(stderr, "den: exec: {}", err);
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ShellState {
        let mut state = ShellState::default();
        state.set_string("PATH", "/usr/bin:/bin".to_string()).unwrap();
        state
    }

    #[test]
    fn eval_executes_in_current_state() {
        let mut state = test_state();
        let io = CommandIo::inherit();
        eval(&mut state, "eval", &["X=evaluated".to_string()], &io).unwrap();
        assert_eq!(state.get_string("X"), Some("evaluated".to_string()));
    }

    #[test]
    fn eval_joins_arguments() {
        let mut state = test_state();
        let io = CommandIo::inherit();
        eval(
            &mut state,
            "eval",
            &["Y=".to_string() + "joined", "Z=2".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.get_string("Y"), Some("joined".to_string()));
        assert_eq!(state.get_string("Z"), Some("2".to_string()));
    }

    #[test]
    fn eval_syntax_error_is_status_2() {
        let mut state = test_state();
        let io = CommandIo::inherit();
        assert_eq!(
            eval(&mut state, "eval", &["if then".to_string()], &io).unwrap(),
            2
        );
    }

    #[test]
    fn source_runs_file_in_shell() {
        let mut state = test_state();
        let io = CommandIo::inherit();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.sh");
        std::fs::write(&file, "sourced=yes\nreturn 3\nsourced=no\n").unwrap();

        let status = source(
            &mut state,
            "source",
            &[file.display().to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(status, 3);
        assert_eq!(state.get_string("sourced"), Some("yes".to_string()));
    }

    #[test]
    fn source_passes_positional_args() {
        let mut state = test_state();
        state.positional = vec!["outer".to_string()];
        let io = CommandIo::inherit();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("args.sh");
        std::fs::write(&file, "first=$1\n").unwrap();

        source(
            &mut state,
            ".",
            &[file.display().to_string(), "inner".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.get_string("first"), Some("inner".to_string()));
        assert_eq!(state.positional, vec!["outer".to_string()]);
    }

    #[test]
    fn source_missing_file_fails() {
        let mut state = test_state();
        let io = CommandIo::inherit();
        assert_eq!(
            source(&mut state, ".", &["/no/such/file.sh".to_string()], &io).unwrap(),
            1
        );
    }

    #[test]
    fn exec_with_command_exits_shell() {
        let mut state = test_state();
        let io = CommandIo::inherit();
        let result = exec_cmd(
            &mut state,
            "exec",
            &["sh".to_string(), "-c".to_string(), "exit 9".to_string()],
            &io,
        );
        assert_eq!(result, Err(ExecError::Exit(9)));
    }
}
