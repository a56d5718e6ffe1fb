//! `set`, `shopt`, `shift`.

use std::io::Write;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;
use crate::interpreter::vars::Value;

use super::fail;

pub fn set(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.is_empty() {
        return print_variables(state, io);
    }

    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "--" => {
                index += 1;
                break;
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                index += 1;
                match args.get(index) {
                    None => {
                        let mut out = io.stdout_writer();
                        for (name, on) in state.options.all() {
                            let _ = writeln!(
                                out,
                                "{:<15} {}",
                                name,
                                if on { "on" } else { "off" }
                            );
                        }
                    }
                    Some(option) => {
                        if !state.options.set(option, enable) {
                            return Ok(fail(
                                io,
                                "set",
                                format!("{}: invalid option name", option),
                                2,
                            ));
                        }
                        index += 1;
                        continue;
                    }
                }
                index += 1;
            }
            flag if flag.starts_with('-') && flag.len() > 1 && !flag.starts_with("--") => {
                for c in flag.chars().skip(1) {
                    if !state.options.set_flag(c, true) {
                        return Ok(fail(io, "set", format!("-{}: invalid option", c), 2));
                    }
                }
                index += 1;
            }
            flag if flag.starts_with('+') && flag.len() > 1 => {
                for c in flag.chars().skip(1) {
                    if !state.options.set_flag(c, false) {
                        return Ok(fail(io, "set", format!("+{}: invalid option", c), 2));
                    }
                }
                index += 1;
            }
            _ => break,
        }
    }

    // Remaining words replace the positional parameters.
    if index < args.len() {
        state.positional = args[index..].to_vec();
    }
    Ok(0)
}

fn print_variables(state: &ShellState, io: &CommandIo) -> Result<i32, ExecError> {
    let mut names: Vec<&String> = state.global.keys().collect();
    names.sort();
    let mut out = io.stdout_writer();
    for name in names {
        if let Some(var) = state.global.get(name) {
            match &var.value {
                Value::String(s) => {
                    let _ = writeln!(out, "{}={}", name, quote_value(s));
                }
                Value::Indexed(map) => {
                    let items: Vec<String> = map
                        .iter()
                        .map(|(k, v)| format!("[{}]={}", k, quote_value(v)))
                        .collect();
                    let _ = writeln!(out, "{}=({})", name, items.join(" "));
                }
                Value::Assoc(map) => {
                    let items: Vec<String> = map
                        .iter()
                        .map(|(k, v)| format!("[{}]={}", k, quote_value(v)))
                        .collect();
                    let _ = writeln!(out, "{}=({})", name, items.join(" "));
                }
            }
        }
    }
    Ok(0)
}

pub fn quote_value(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | ',' | '@' | '%'))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

pub fn shopt(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut mode: Option<bool> = None;
    let mut quiet = false;
    let mut names = Vec::new();

    for arg in args {
        match arg.as_str() {
            "-s" => mode = Some(true),
            "-u" => mode = Some(false),
            "-q" => quiet = true,
            "-p" => {}
            _ => names.push(arg.clone()),
        }
    }

    if names.is_empty() {
        match mode {
            None => {
                let mut out = io.stdout_writer();
                for (name, on) in state.shopt.all() {
                    let _ = writeln!(out, "{:<15} {}", name, if on { "on" } else { "off" });
                }
                return Ok(0);
            }
            Some(enable) => {
                let mut out = io.stdout_writer();
                for (name, on) in state.shopt.all() {
                    if on == enable {
                        let _ = writeln!(out, "{:<15} {}", name, if on { "on" } else { "off" });
                    }
                }
                return Ok(0);
            }
        }
    }

    let mut status = 0;
    for name in names {
        match mode {
            Some(enable) => {
                if !state.shopt.set(&name, enable) {
                    status = fail(io, "shopt", format!("{}: invalid shell option name", name), 1);
                }
            }
            None => match state.shopt.get(&name) {
                Some(on) => {
                    if !quiet {
                        let mut out = io.stdout_writer();
                        let _ =
                            writeln!(out, "{:<15} {}", name, if on { "on" } else { "off" });
                    }
                    if !on {
                        status = 1;
                    }
                }
                None => {
                    status = fail(io, "shopt", format!("{}: invalid shell option name", name), 1);
                }
            },
        }
    }
    Ok(status)
}

pub fn shift(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let count = match args.first() {
        None => 1,
        Some(text) => match text.parse::<i64>() {
            Ok(n) if n >= 0 => n as usize,
            _ => return Ok(fail(io, "shift", format!("{}: numeric argument required", text), 2)),
        },
    };
    if state.shift_positional(count) {
        Ok(0)
    } else {
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_flags_and_options() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        set(&mut state, "set", &["-eu".to_string()], &io).unwrap();
        assert!(state.options.errexit);
        assert!(state.options.nounset);

        set(&mut state, "set", &["+e".to_string()], &io).unwrap();
        assert!(!state.options.errexit);

        set(
            &mut state,
            "set",
            &["-o".to_string(), "pipefail".to_string()],
            &io,
        )
        .unwrap();
        assert!(state.options.pipefail);
    }

    #[test]
    fn set_positional_params() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        set(
            &mut state,
            "set",
            &["--".to_string(), "a".to_string(), "b".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.positional, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn invalid_option_is_usage_error() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        assert_eq!(set(&mut state, "set", &["-Z".to_string()], &io).unwrap(), 2);
    }

    #[test]
    fn shopt_toggles() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        shopt(
            &mut state,
            "shopt",
            &["-s".to_string(), "nullglob".to_string()],
            &io,
        )
        .unwrap();
        assert!(state.shopt.nullglob);
        shopt(
            &mut state,
            "shopt",
            &["-u".to_string(), "nullglob".to_string()],
            &io,
        )
        .unwrap();
        assert!(!state.shopt.nullglob);
    }

    #[test]
    fn shift_behavior() {
        let mut state = ShellState::default();
        state.positional = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let io = CommandIo::inherit();
        assert_eq!(shift(&mut state, "shift", &[], &io).unwrap(), 0);
        assert_eq!(state.positional.len(), 2);
        assert_eq!(shift(&mut state, "shift", &["5".to_string()], &io).unwrap(), 1);
    }

    #[test]
    fn quoting_for_listing() {
        assert_eq!(quote_value("simple"), "simple");
        assert_eq!(quote_value("has space"), "'has space'");
        assert_eq!(quote_value(""), "''");
    }
}
