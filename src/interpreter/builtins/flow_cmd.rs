//! Control-flow builtins: `exit`, `return`, `break`, `continue`.

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;

use super::fail;

fn numeric_arg(args: &[String], default: i32) -> Result<i32, String> {
    match args.first() {
        None => Ok(default),
        Some(text) => text
            .parse::<i64>()
            .map(|n| (n & 0xff) as i32)
            .map_err(|_| format!("{}: numeric argument required", text)),
    }
}

pub fn exit(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    match numeric_arg(args, state.last_exit_code) {
        Ok(code) => Err(ExecError::Exit(code)),
        Err(message) => {
            fail(io, "exit", message, 2);
            Err(ExecError::Exit(2))
        }
    }
}

pub fn return_cmd(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if state.call_depth == 0 && state.source_depth == 0 {
        return Ok(fail(io, "return", "can only `return' from a function or sourced script", 1));
    }
    match numeric_arg(args, state.last_exit_code) {
        Ok(code) => Err(ExecError::Return(code)),
        Err(message) => Ok(fail(io, "return", message, 2)),
    }
}

fn loop_count(args: &[String]) -> Result<u32, String> {
    match args.first() {
        None => Ok(1),
        Some(text) => match text.parse::<i64>() {
            Ok(n) if n >= 1 => Ok(n as u32),
            Ok(n) => Err(format!("{}: loop count out of range", n)),
            Err(_) => Err(format!("{}: numeric argument required", text)),
        },
    }
}

pub fn break_cmd(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if state.loop_depth == 0 {
        return Ok(fail(io, "break", "only meaningful in a `for', `while', or `until' loop", 0));
    }
    match loop_count(args) {
        Ok(n) => Err(ExecError::Break(n.min(state.loop_depth))),
        Err(message) => Ok(fail(io, "break", message, 1)),
    }
}

pub fn continue_cmd(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if state.loop_depth == 0 {
        return Ok(fail(
            io,
            "continue",
            "only meaningful in a `for', `while', or `until' loop",
            0,
        ));
    }
    match loop_count(args) {
        Ok(n) => Err(ExecError::Continue(n.min(state.loop_depth))),
        Err(message) => Ok(fail(io, "continue", message, 1)),
    }
}
