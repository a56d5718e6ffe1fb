//! The `test` / `[` builtin.

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;
use crate::interpreter::test_expr;

use super::fail;

pub fn test(
    state: &mut ShellState,
    name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let args: Vec<String> = if name == "[" {
        match args.last().map(|s| s.as_str()) {
            Some("]") => args[..args.len() - 1].to_vec(),
            _ => return Ok(fail(io, "[", "missing `]'", 2)),
        }
    } else {
        args.to_vec()
    };

    match test_expr::evaluate_test_args(state, &args) {
        Ok(status) => Ok(status),
        Err(ExecError::Expansion { message, status }) => Ok(fail(io, name, message, status)),
        Err(err) => Err(err),
    }
}
