//! Command-introspection builtins: `type`, `command`, `builtin`, `hash`,
//! `enable`.

use std::io::Write;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::spawn;
use crate::interpreter::state::ShellState;

use super::fail;

const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "while", "until", "for", "do", "done", "case", "esac",
    "in", "function", "{", "}", "[[", "]]", "!",
];

pub fn type_cmd(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut brief = false;
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "-t" => brief = true,
            "-a" | "-p" | "--" => {}
            _ => break,
        }
        index += 1;
    }

    let mut status = 0;
    for word in &args[index..] {
        let mut out = io.stdout_writer();
        if KEYWORDS.contains(&word.as_str()) {
            let _ = if brief {
                writeln!(out, "keyword")
            } else {
                writeln!(out, "{} is a shell keyword", word)
            };
        } else if let Some(text) = state.aliases.get(word) {
            let _ = if brief {
                writeln!(out, "alias")
            } else {
                writeln!(out, "{} is aliased to `{}'", word, text)
            };
        } else if state.functions.contains_key(word) {
            let _ = if brief {
                writeln!(out, "function")
            } else {
                writeln!(out, "{} is a function", word)
            };
        } else if super::is_builtin(word) {
            let _ = if brief {
                writeln!(out, "builtin")
            } else {
                writeln!(out, "{} is a shell builtin", word)
            };
        } else if let Some(path) = spawn::resolve_external(state, word) {
            let _ = if brief {
                writeln!(out, "file")
            } else {
                writeln!(out, "{} is {}", word, path.display())
            };
        } else {
            drop(out);
            status = fail(io, "type", format!("{}: not found", word), 1);
        }
    }
    Ok(status)
}

/// `command [-v|-V] name [args…]`: bypass functions (and aliases).
pub fn command(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut verify = false;
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "-v" | "-V" => verify = true,
            "-p" | "--" => {}
            _ => break,
        }
        index += 1;
    }

    let Some(name) = args.get(index) else {
        return Ok(0);
    };

    if verify {
        let mut out = io.stdout_writer();
        if super::is_builtin(name) || KEYWORDS.contains(&name.as_str()) {
            let _ = writeln!(out, "{}", name);
            return Ok(0);
        }
        if let Some(path) = spawn::resolve_external(state, name) {
            let _ = writeln!(out, "{}", path.display());
            return Ok(0);
        }
        return Ok(1);
    }

    let rest: Vec<String> = args[index + 1..].to_vec();
    if let Some(handler) = super::lookup(state, name) {
        return handler(state, name, &rest, io);
    }
    let mut argv = vec![name.clone()];
    argv.extend(rest);
    spawn::run_external(state, &argv, &std::collections::HashMap::new(), io)
}

/// `builtin name [args…]`: run a builtin even when a function shadows it.
pub fn builtin(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let Some(name) = args.first() else {
        return Ok(0);
    };
    match super::lookup(state, name) {
        Some(handler) => handler(state, name, &args[1..], io),
        None => Ok(fail(io, "builtin", format!("{}: not a shell builtin", name), 1)),
    }
}

pub fn hash(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.first().map(|s| s.as_str()) == Some("-r") {
        state.path_cache.clear();
        return Ok(0);
    }

    if args.is_empty() {
        let mut entries: Vec<(&String, &std::path::PathBuf)> = state.path_cache.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());
        let mut out = io.stdout_writer();
        for (name, path) in entries {
            let _ = writeln!(out, "{}\t{}", name, path.display());
        }
        return Ok(0);
    }

    let mut status = 0;
    for name in args {
        if spawn::resolve_external(state, name).is_none() {
            status = fail(io, "hash", format!("{}: not found", name), 1);
        }
    }
    Ok(status)
}

pub fn enable(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut disable = false;
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "-n" => disable = true,
            "-a" | "--" => {}
            _ => break,
        }
        index += 1;
    }

    if args[index..].is_empty() {
        let mut out = io.stdout_writer();
        let mut names: Vec<&str> = Vec::new();
        for name in [
            "alias", "bg", "break", "builtin", "cd", "command", "continue", "declare", "echo",
            "enable", "eval", "exec", "exit", "export", "false", "fg", "hash", "jobs", "kill",
            "local", "printf", "pwd", "read", "readonly", "return", "set", "shift", "shopt",
            "source", "test", "times", "trap", "true", "type", "typeset", "umask", "unalias",
            "unset", "wait",
        ] {
            names.push(name);
        }
        for name in names {
            let masked = state.disabled_builtins.contains(name);
            let _ = writeln!(out, "enable {}{}", if masked { "-n " } else { "" }, name);
        }
        return Ok(0);
    }

    let mut status = 0;
    for name in &args[index..] {
        if !super::is_builtin(name) {
            status = fail(io, "enable", format!("{}: not a shell builtin", name), 1);
            continue;
        }
        if disable {
            state.disabled_builtins.insert(name.clone());
        } else {
            state.disabled_builtins.remove(name);
        }
    }
    Ok(status)
}
