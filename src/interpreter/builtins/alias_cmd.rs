//! `alias` and `unalias`.

use std::io::Write;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;

use super::fail;
use super::set_cmd::quote_value;

pub fn alias(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.is_empty() || args == ["-p"] {
        let mut names: Vec<&String> = state.aliases.keys().collect();
        names.sort();
        let mut out = io.stdout_writer();
        for name in names {
            let _ = writeln!(out, "alias {}={}", name, quote_value(&state.aliases[name]));
        }
        return Ok(0);
    }

    let mut status = 0;
    for word in args {
        if word == "-p" {
            continue;
        }
        match word.split_once('=') {
            Some((name, value)) => {
                state.aliases.insert(name.to_string(), value.to_string());
            }
            None => match state.aliases.get(word) {
                Some(value) => {
                    let mut out = io.stdout_writer();
                    let _ = writeln!(out, "alias {}={}", word, quote_value(value));
                }
                None => {
                    status = fail(io, "alias", format!("{}: not found", word), 1);
                }
            },
        }
    }
    Ok(status)
}

pub fn unalias(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.first().map(|s| s.as_str()) == Some("-a") {
        state.aliases.clear();
        return Ok(0);
    }

    let mut status = 0;
    for word in args {
        if state.aliases.remove(word).is_none() {
            status = fail(io, "unalias", format!("{}: not found", word), 1);
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_remove() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        alias(&mut state, "alias", &["ll=ls -l".to_string()], &io).unwrap();
        assert_eq!(state.aliases.get("ll"), Some(&"ls -l".to_string()));

        unalias(&mut state, "unalias", &["ll".to_string()], &io).unwrap();
        assert!(state.aliases.is_empty());
    }

    #[test]
    fn unalias_all() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        state.aliases.insert("a".to_string(), "1".to_string());
        state.aliases.insert("b".to_string(), "2".to_string());
        unalias(&mut state, "unalias", &["-a".to_string()], &io).unwrap();
        assert!(state.aliases.is_empty());
    }

    #[test]
    fn missing_alias_reports_failure() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        assert_eq!(
            unalias(&mut state, "unalias", &["nope".to_string()], &io).unwrap(),
            1
        );
    }
}
