//! The `trap` builtin.

use std::io::Write;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;
use crate::interpreter::traps::{parse_condition, signal_name};

use super::fail;
use super::set_cmd::quote_value;

pub fn trap(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.is_empty() || args == ["-p"] {
        let mut out = io.stdout_writer();
        for (name, command) in state.traps.listing() {
            let _ = writeln!(out, "trap -- {} {}", quote_value(&command), name);
        }
        return Ok(0);
    }

    if args[0] == "-l" {
        let mut out = io.stdout_writer();
        let mut line = String::new();
        for n in 1..=22 {
            if let Some(name) = signal_name(n) {
                line.push_str(&format!("{:>2}) SIG{:<8}", n, name));
                if n % 4 == 0 {
                    let _ = writeln!(out, "{}", line.trim_end());
                    line.clear();
                }
            }
        }
        if !line.is_empty() {
            let _ = writeln!(out, "{}", line.trim_end());
        }
        return Ok(0);
    }

    let mut index = 0;
    if args[index] == "--" {
        index += 1;
    }
    if index >= args.len() {
        return Ok(0);
    }

    // Reset forms: `trap - COND…`, `trap N…` (first operand numeric), and
    // the single-argument `trap COND`. Otherwise the first word is the
    // action.
    let (action, conditions): (Option<String>, &[String]) = {
        let first = &args[index];
        let numeric = first.chars().all(|c| c.is_ascii_digit());
        let lone_condition = args.len() == index + 1 && parse_condition(first).is_some();
        if first == "-" {
            (None, &args[index + 1..])
        } else if numeric || lone_condition {
            (None, &args[index..])
        } else {
            (Some(first.clone()), &args[index + 1..])
        }
    };

    if conditions.is_empty() {
        return Ok(fail(io, "trap", "usage: trap [-lp] [action] condition …", 2));
    }

    let mut status = 0;
    for condition_name in conditions {
        match parse_condition(condition_name) {
            Some(condition) => {
                state.traps.set(condition, action.clone());
            }
            None => {
                status = fail(
                    io,
                    "trap",
                    format!("{}: invalid signal specification", condition_name),
                    1,
                );
            }
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::traps::TrapCondition;

    #[test]
    fn set_and_reset_trap() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        trap(
            &mut state,
            "trap",
            &["echo bye".to_string(), "EXIT".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.traps.get(TrapCondition::Exit), Some("echo bye"));

        trap(
            &mut state,
            "trap",
            &["-".to_string(), "EXIT".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.traps.get(TrapCondition::Exit), None);
    }

    #[test]
    fn bare_condition_resets() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        state
            .traps
            .set(TrapCondition::Err, Some("echo e".to_string()));
        trap(&mut state, "trap", &["ERR".to_string()], &io).unwrap();
        assert_eq!(state.traps.get(TrapCondition::Err), None);
    }

    #[test]
    fn invalid_condition_fails() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        let status = trap(
            &mut state,
            "trap",
            &["echo x".to_string(), "NOSIG".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(status, 1);
    }
}
