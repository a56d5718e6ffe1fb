//! Variable declaration builtins: `declare`/`typeset`/`local`, `export`,
//! `readonly`, `unset`.

use std::io::Write;

use indexmap::IndexMap;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;
use crate::interpreter::vars::{Attributes, Value, Variable};

use super::fail;
use super::set_cmd::quote_value;

#[derive(Default)]
struct DeclareFlags {
    integer: Option<bool>,
    lowercase: Option<bool>,
    uppercase: Option<bool>,
    nameref: Option<bool>,
    readonly: Option<bool>,
    exported: Option<bool>,
    indexed_array: bool,
    assoc_array: bool,
    print: bool,
    global: bool,
    function_scope: bool,
}

fn parse_flags(args: &[String], flags: &mut DeclareFlags) -> Result<usize, String> {
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        let (enable, rest) = if let Some(rest) = arg.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = arg.strip_prefix('+') {
            (false, rest)
        } else {
            break;
        };
        if rest.is_empty() || rest.starts_with('-') && arg == "--" {
            index += 1;
            break;
        }
        for c in rest.chars() {
            match c {
                'i' => flags.integer = Some(enable),
                'l' => flags.lowercase = Some(enable),
                'u' => flags.uppercase = Some(enable),
                'n' => flags.nameref = Some(enable),
                'r' => flags.readonly = Some(enable),
                'x' => flags.exported = Some(enable),
                'a' => flags.indexed_array = enable,
                'A' => flags.assoc_array = enable,
                'p' => flags.print = true,
                'g' => flags.global = enable,
                'f' | 'F' => {}
                _ => return Err(format!("-{}: invalid option", c)),
            }
        }
        index += 1;
    }
    Ok(index)
}

pub fn declare(
    state: &mut ShellState,
    name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut flags = DeclareFlags {
        function_scope: name == "local",
        ..DeclareFlags::default()
    };
    let first = match parse_flags(args, &mut flags) {
        Ok(index) => index,
        Err(message) => return Ok(fail(io, name, message, 2)),
    };

    if name == "local" && state.frames.is_empty() {
        return Ok(fail(io, "local", "can only be used in a function", 1));
    }

    // `declare` inside a function binds locally unless -g.
    let local = (flags.function_scope || (name == "declare" && !state.frames.is_empty()))
        && !flags.global
        && !state.frames.is_empty();

    let words = &args[first..];
    if words.is_empty() {
        return print_declarations(state, io, &flags);
    }

    let mut status = 0;
    for word in words {
        if flags.print {
            status = print_one(state, io, word).max(status);
            continue;
        }

        let (var_name, value) = match word.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (word.clone(), None),
        };
        if !is_name(&var_name) {
            status = fail(io, name, format!("`{}': not a valid identifier", word), 1);
            continue;
        }

        if local {
            if let Err(message) = state.set_local(&var_name, value.clone()) {
                status = fail(io, name, message, 1);
                continue;
            }
        } else if flags.assoc_array {
            if state.lookup(&var_name).is_none() {
                state.global.insert(
                    var_name.clone(),
                    Variable {
                        value: Value::Assoc(IndexMap::new()),
                        attrs: Attributes::default(),
                    },
                );
            }
        } else if flags.indexed_array {
            if state.lookup(&var_name).is_none() {
                state.global.insert(
                    var_name.clone(),
                    Variable {
                        value: Value::Indexed(Default::default()),
                        attrs: Attributes::default(),
                    },
                );
            }
            if let Some(v) = value.clone() {
                if let Err(message) = state.set_string(&var_name, v) {
                    status = fail(io, name, message, 1);
                    continue;
                }
            }
        } else if let Some(v) = value.clone() {
            if let Err(message) = state.set_string(&var_name, v) {
                status = fail(io, name, message, 1);
                continue;
            }
        } else if state.lookup(&var_name).is_none() && !local {
            state
                .global
                .insert(var_name.clone(), Variable::string(String::new()));
        }

        let result = state.modify_attrs(&var_name, |attrs| {
            if let Some(v) = flags.integer {
                attrs.integer = v;
            }
            if let Some(v) = flags.lowercase {
                attrs.lowercase = v;
            }
            if let Some(v) = flags.uppercase {
                attrs.uppercase = v;
            }
            if let Some(v) = flags.nameref {
                attrs.nameref = v;
            }
            if let Some(v) = flags.exported {
                attrs.exported = v;
            }
            if flags.readonly == Some(true) {
                attrs.readonly = true;
            }
        });
        if let Err(message) = result {
            status = fail(io, name, message, 1);
        }
    }
    Ok(status)
}

fn print_declarations(
    state: &ShellState,
    io: &CommandIo,
    _flags: &DeclareFlags,
) -> Result<i32, ExecError> {
    let mut names: Vec<&String> = state.global.keys().collect();
    names.sort();
    let mut out = io.stdout_writer();
    for name in names {
        if let Some(line) = declaration_line(state, name) {
            let _ = writeln!(out, "{}", line);
        }
    }
    Ok(0)
}

fn print_one(state: &ShellState, io: &CommandIo, name: &str) -> i32 {
    match declaration_line(state, name) {
        Some(line) => {
            let mut out = io.stdout_writer();
            let _ = writeln!(out, "{}", line);
            0
        }
        None => fail(io, "declare", format!("{}: not found", name), 1),
    }
}

fn declaration_line(state: &ShellState, name: &str) -> Option<String> {
    let var = state.lookup(name)?;
    let mut letters = String::new();
    if matches!(var.value, Value::Indexed(_)) {
        letters.push('a');
    }
    if matches!(var.value, Value::Assoc(_)) {
        letters.push('A');
    }
    if var.attrs.integer {
        letters.push('i');
    }
    if var.attrs.lowercase {
        letters.push('l');
    }
    if var.attrs.nameref {
        letters.push('n');
    }
    if var.attrs.readonly {
        letters.push('r');
    }
    if var.attrs.uppercase {
        letters.push('u');
    }
    if var.attrs.exported {
        letters.push('x');
    }
    let flags = if letters.is_empty() { "--".to_string() } else { format!("-{}", letters) };

    let rendered = match &var.value {
        Value::String(s) => format!("{}=\"{}\"", name, s.replace('"', "\\\"")),
        Value::Indexed(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]={}", k, quote_value(v)))
                .collect();
            format!("{}=({})", name, items.join(" "))
        }
        Value::Assoc(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]={}", quote_value(k), quote_value(v)))
                .collect();
            format!("{}=({})", name, items.join(" "))
        }
    };
    Some(format!("declare {} {}", flags, rendered))
}

pub fn export(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut remove = false;
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "-n" => remove = true,
            "-p" | "--" => {}
            _ => break,
        }
        index += 1;
    }

    if args[index..].is_empty() {
        let mut names: Vec<&String> = state
            .global
            .iter()
            .filter(|(_, v)| v.attrs.exported)
            .map(|(n, _)| n)
            .collect();
        names.sort();
        let mut out = io.stdout_writer();
        for name in names {
            if let Some(value) = state.get_string(name) {
                let _ = writeln!(out, "declare -x {}=\"{}\"", name, value.replace('"', "\\\""));
            }
        }
        return Ok(0);
    }

    let mut status = 0;
    for word in &args[index..] {
        let (name, value) = match word.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (word.clone(), None),
        };
        if !is_name(&name) {
            status = fail(io, "export", format!("`{}': not a valid identifier", word), 1);
            continue;
        }
        if let Some(v) = value {
            if let Err(message) = state.set_string(&name, v) {
                status = fail(io, "export", message, 1);
                continue;
            }
        }
        if let Err(message) = state.modify_attrs(&name, |a| a.exported = !remove) {
            status = fail(io, "export", message, 1);
        }
    }
    Ok(status)
}

pub fn readonly(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.is_empty() || args == ["-p"] {
        let mut names: Vec<&String> = state
            .global
            .iter()
            .filter(|(_, v)| v.attrs.readonly)
            .map(|(n, _)| n)
            .collect();
        names.sort();
        let mut out = io.stdout_writer();
        for name in names {
            if let Some(value) = state.get_string(name) {
                let _ = writeln!(out, "declare -r {}=\"{}\"", name, value.replace('"', "\\\""));
            }
        }
        return Ok(0);
    }

    let mut status = 0;
    for word in args {
        if word == "--" {
            continue;
        }
        let (name, value) = match word.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (word.clone(), None),
        };
        if !is_name(&name) {
            status = fail(io, "readonly", format!("`{}': not a valid identifier", word), 1);
            continue;
        }
        if let Some(v) = value {
            if let Err(message) = state.set_string(&name, v) {
                status = fail(io, "readonly", message, 1);
                continue;
            }
        }
        if let Err(message) = state.modify_attrs(&name, |a| a.readonly = true) {
            status = fail(io, "readonly", message, 1);
        }
    }
    Ok(status)
}

pub fn unset(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut functions = false;
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "-f" => functions = true,
            "-v" => functions = false,
            "--" => {}
            _ => break,
        }
        index += 1;
    }

    let mut status = 0;
    for word in &args[index..] {
        if functions {
            state.functions.remove(word);
            continue;
        }
        // `unset arr[3]` removes one element.
        if let Some(open) = word.find('[') {
            if word.ends_with(']') {
                let name = &word[..open];
                let key = &word[open + 1..word.len() - 1];
                if let Err(message) = state.unset_element(name, key) {
                    status = fail(io, "unset", message, 1);
                }
                continue;
            }
        }
        if let Err(message) = state.unset(word) {
            status = fail(io, "unset", message, 1);
        } else {
            // A name can shadow a function; unset clears both per POSIX.
            state.functions.remove(word);
        }
    }
    Ok(status)
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
