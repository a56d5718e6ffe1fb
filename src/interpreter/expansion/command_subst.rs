//! Command substitution: run a script against a cloned state with stdout
//! captured, strip trailing newlines, splice the text.

use crate::ast::Script;
use crate::interpreter::errors::ExecError;
use crate::interpreter::io::{pipe_pair, CommandIo, FdSlot, PipeDrain};
use crate::interpreter::state::ShellState;

/// Execute `script` in a subshell context and capture its stdout.
/// Returns (output, exit status); trailing newlines are stripped.
pub fn run_captured(state: &ShellState, script: &Script) -> Result<(String, i32), ExecError> {
    let (read_end, write_end) = pipe_pair()
        .map_err(|e| ExecError::Fatal(format!("cannot create pipe: {}", e)))?;
    let drain = PipeDrain::start(read_end);

    let mut sub_state = state.clone();
    sub_state.is_subshell = true;
    if !sub_state.options.errtrace {
        sub_state.traps.err = None;
    }

    let mut io = CommandIo::inherit();
    io.set(1, FdSlot::Owned(write_end));

    let status = match crate::interpreter::executor::execute_script(&mut sub_state, script, &io) {
        Ok(status) => status,
        Err(ExecError::Exit(code)) => code,
        Err(ExecError::Errexit(code)) => code,
        Err(ExecError::Return(code)) => code,
        Err(err) => match err.command_status() {
            Some(status) => {
                let mut stderr = io.stderr_writer();
                use std::io::Write;
                let _ = writeln!(stderr, "den: {}", err);
                status
            }
            None => return Err(err),
        },
    };

    // Close our write end so the drain sees EOF.
    drop(io);

    let mut output = drain.finish();
    while output.ends_with('\n') {
        output.pop();
    }
    Ok((output, status))
}
