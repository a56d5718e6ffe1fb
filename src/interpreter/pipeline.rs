//! Pipeline execution.
//!
//! A pipeline of N commands gets N−1 real pipes. Every stage of a
//! multi-command pipeline runs against a cloned state (child semantics:
//! stage-local mutations never reach the shell) on its own thread, so a
//! builtin stage cannot deadlock the pipe plumbing; external commands
//! within a stage spawn as normal children. A single-command pipeline
//! runs in the shell process so builtins can mutate state.

use crate::ast::Pipeline;

use super::errors::ExecError;
use super::executor;
use super::io::{pipe_pair, CommandIo, FdSlot};
use super::state::ShellState;

/// Execute a pipeline; returns the final status with negation applied,
/// and commits `$?`/`PIPESTATUS`.
pub fn execute_pipeline(
    state: &mut ShellState,
    pipeline: &Pipeline,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let statuses = run_stages(state, pipeline, io)?;

    let status = if state.options.pipefail {
        statuses.iter().rev().find(|s| **s != 0).copied().unwrap_or(0)
    } else {
        *statuses.last().unwrap_or(&0)
    };

    let status = if pipeline.negated {
        if status == 0 {
            1
        } else {
            0
        }
    } else {
        status
    };

    state.commit_status(status, statuses);
    Ok(status)
}

fn run_stages(
    state: &mut ShellState,
    pipeline: &Pipeline,
    io: &CommandIo,
) -> Result<Vec<i32>, ExecError> {
    let commands = &pipeline.commands;

    if commands.len() == 1 {
        let status = executor::execute_command(state, &commands[0], io)?;
        return Ok(vec![status]);
    }

    let fatal = |e: std::io::Error| ExecError::Fatal(format!("pipeline setup failed: {}", e));

    let mut handles = Vec::with_capacity(commands.len());
    let mut prev_read = None;

    for (index, command) in commands.iter().enumerate() {
        let mut stage_io = io.try_clone().map_err(fatal)?;
        if let Some(read_end) = prev_read.take() {
            stage_io.set(0, FdSlot::Owned(read_end));
        }
        if index + 1 < commands.len() {
            let (read_end, write_end) = pipe_pair().map_err(fatal)?;
            stage_io.set(1, FdSlot::Owned(write_end));
            prev_read = Some(read_end);
        }

        let mut stage_state = state.clone();
        stage_state.is_subshell = true;
        let command = command.clone();

        handles.push(std::thread::spawn(move || {
            let status = match executor::execute_command(&mut stage_state, &command, &stage_io) {
                Ok(status) => status,
                Err(ExecError::Exit(code))
                | Err(ExecError::Errexit(code))
                | Err(ExecError::Return(code)) => code,
                Err(err) => {
                    use std::io::Write;
                    let mut stderr = stage_io.stderr_writer();
                    let _ = writeln!(stderr, "den: {}", err);
                    err.command_status().unwrap_or(1)
                }
            };
            // stage_io drops here, closing this stage's pipe ends.
            status
        }));
    }

    let mut statuses = Vec::with_capacity(handles.len());
    for handle in handles {
        statuses.push(handle.join().unwrap_or(1));
    }
    Ok(statuses)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Command;
    use crate::parser::parse;

    fn pipeline_of(input: &str) -> Pipeline {
        parse(input).unwrap().statements.remove(0).pipelines.remove(0)
    }

    fn run(state: &mut ShellState, input: &str) -> i32 {
        let pipeline = pipeline_of(input);
        execute_pipeline(state, &pipeline, &CommandIo::inherit()).unwrap()
    }

    fn test_state() -> ShellState {
        let mut state = ShellState::default();
        state.set_string("PATH", "/usr/bin:/bin".to_string()).unwrap();
        state
    }

    #[test]
    fn pipe_status_last_by_default() {
        let mut state = test_state();
        assert_eq!(run(&mut state, "false | true"), 0);
        assert_eq!(state.pipe_status, vec![1, 0]);
    }

    #[test]
    fn pipefail_picks_rightmost_failure() {
        let mut state = test_state();
        state.options.pipefail = true;
        assert_eq!(run(&mut state, "false | true"), 1);
        assert_eq!(run(&mut state, "true | false | true"), 1);
        assert_eq!(run(&mut state, "true | true"), 0);
    }

    #[test]
    fn negation_inverts() {
        let mut state = test_state();
        assert_eq!(run(&mut state, "! false"), 0);
        assert_eq!(run(&mut state, "! true"), 1);
    }

    #[test]
    fn data_flows_between_externals() {
        let mut state = test_state();
        // `printf` feeds `grep`; grep succeeds only if the data arrived.
        assert_eq!(run(&mut state, "printf 'x\\ny\\n' | grep -q y"), 0);
        assert_eq!(run(&mut state, "printf 'x\\n' | grep -q y"), 1);
    }

    #[test]
    fn builtin_stage_is_isolated() {
        let mut state = test_state();
        state.set_string("V", "before".to_string()).unwrap();
        // The assignment runs in a pipeline stage clone.
        run(&mut state, "V=inside | true");
        assert_eq!(state.get_string("V"), Some("before".to_string()));
    }

    #[test]
    fn single_command_builtin_mutates_shell() {
        let mut state = test_state();
        run(&mut state, "true");
        assert_eq!(state.last_exit_code, 0);
    }
}
