//! `cd` and `pwd`.
//!
//! The shell tracks a logical working directory in its state (`PWD` /
//! `OLDPWD` are maintained on every change); the process cwd is never
//! touched so pipeline-stage clones stay isolated.

use std::io::Write;
use std::path::{Component, PathBuf};

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;

use super::fail;

pub fn cd(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let target = match args.first().map(|s| s.as_str()) {
        None => match state.get_string("HOME") {
            Some(home) => home,
            None => return Ok(fail(io, "cd", "HOME not set", 1)),
        },
        Some("-") => {
            let previous = state.previous_dir.display().to_string();
            let mut out = io.stdout_writer();
            let _ = writeln!(out, "{}", previous);
            previous
        }
        Some(dir) => dir.to_string(),
    };

    let resolved = normalize(&state.resolve_path(&target));
    if !resolved.is_dir() {
        return Ok(fail(io, "cd", format!("{}: No such file or directory", target), 1));
    }

    state.previous_dir = std::mem::replace(&mut state.cwd, resolved);
    let pwd = state.cwd.display().to_string();
    let oldpwd = state.previous_dir.display().to_string();
    let _ = state.set_string("PWD", pwd);
    let _ = state.set_string("OLDPWD", oldpwd);
    let _ = state.modify_attrs("PWD", |a| a.exported = true);
    let _ = state.modify_attrs("OLDPWD", |a| a.exported = true);
    Ok(0)
}

pub fn pwd(
    state: &mut ShellState,
    _name: &str,
    _args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut out = io.stdout_writer();
    let _ = writeln!(out, "{}", state.cwd.display());
    Ok(0)
}

/// Logical normalization: collapse `.` and `..` without touching the
/// filesystem (symlinks are not resolved).
fn normalize(path: &std::path::Path) -> PathBuf {
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => prefix = PathBuf::from("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(p) => parts.push(p.to_os_string()),
            Component::Prefix(_) => {}
        }
    }
    let mut out = prefix;
    for part in parts {
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        PathBuf::from("/")
    } else {
        out
    }
}
