//! The `read` builtin.
//!
//! Reads byte-at-a-time so a shared input fd is not over-consumed (a
//! following `read` or external command sees the rest of the stream).

use std::io::{Read, Write};

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;

use super::fail;

pub fn read(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut raw = false;
    let mut prompt: Option<String> = None;
    let mut array: Option<String> = None;
    let mut delimiter = b'\n';
    let mut max_chars: Option<usize> = None;
    let mut silent = false;
    let mut names: Vec<String> = Vec::new();

    let mut index = 0;
    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "-r" => raw = true,
            "-s" => silent = true,
            "-p" => {
                index += 1;
                prompt = args.get(index).cloned();
            }
            "-a" => {
                index += 1;
                array = args.get(index).cloned();
            }
            "-d" => {
                index += 1;
                delimiter = args
                    .get(index)
                    .and_then(|s| s.bytes().next())
                    .unwrap_or(b'\0');
            }
            "-n" | "-N" => {
                index += 1;
                max_chars = args.get(index).and_then(|s| s.parse().ok());
            }
            "--" => {
                index += 1;
                break;
            }
            other if other.starts_with('-') => {
                return Ok(fail(io, "read", format!("{}: invalid option", other), 2));
            }
            _ => break,
        }
        index += 1;
    }
    names.extend(args[index..].iter().cloned());

    if let Some(text) = prompt {
        let mut err = io.stderr_writer();
        let _ = write!(err, "{}", text);
        let _ = err.flush();
    }
    let _ = silent; // terminal echo control is the line editor's concern

    // Byte-at-a-time until the delimiter, honoring backslash
    // continuation unless -r.
    let mut reader = io.stdin_reader();
    let mut buffer = Vec::new();
    let mut byte = [0u8; 1];
    let mut saw_any = false;

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                saw_any = true;
                let b = byte[0];
                if !raw && b == b'\\' {
                    // Escape: take the next byte literally; a backslash
                    // before the delimiter continues the line.
                    match reader.read(&mut byte) {
                        Ok(0) => break,
                        Ok(_) => {
                            if byte[0] != delimiter {
                                buffer.push(byte[0]);
                            }
                            continue;
                        }
                        Err(_) => break,
                    }
                }
                if b == delimiter {
                    break;
                }
                buffer.push(b);
                if let Some(max) = max_chars {
                    if buffer.len() >= max {
                        break;
                    }
                }
            }
            Err(_) => break,
        }
    }

    let line = String::from_utf8_lossy(&buffer).into_owned();

    let ifs = state.ifs();
    let fields = split_read_fields(&line, &ifs, names.len().max(1));

    if let Some(array_name) = array {
        let items: Vec<String> = split_read_fields(&line, &ifs, usize::MAX);
        if let Err(message) = state.set_array(&array_name, items, false) {
            return Ok(fail(io, "read", message, 1));
        }
    } else if names.is_empty() {
        if let Err(message) = state.set_string("REPLY", line) {
            return Ok(fail(io, "read", message, 1));
        }
    } else {
        for (i, name) in names.iter().enumerate() {
            let value = fields.get(i).cloned().unwrap_or_default();
            if let Err(message) = state.set_string(name, value) {
                return Ok(fail(io, "read", message, 1));
            }
        }
    }

    // EOF without any input fails.
    Ok(if saw_any { 0 } else { 1 })
}

/// Split a line into at most `max` fields: the last field takes the
/// remainder, and IFS whitespace is trimmed at the edges.
fn split_read_fields(line: &str, ifs: &str, max: usize) -> Vec<String> {
    if max <= 1 {
        let trimmed = trim_ifs_whitespace(line, ifs);
        if trimmed.is_empty() && max == 0 {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let mut fields = Vec::new();
    let mut rest = trim_ifs_whitespace(line, ifs);

    while fields.len() + 1 < max {
        match rest.find(|c| ifs.contains(c)) {
            Some(pos) => {
                fields.push(rest[..pos].to_string());
                rest = rest[pos..].trim_start_matches(|c: char| ifs.contains(c));
                if rest.is_empty() {
                    break;
                }
            }
            None => {
                fields.push(rest.to_string());
                rest = "";
                break;
            }
        }
    }
    if !rest.is_empty() {
        fields.push(rest.to_string());
    }
    fields
}

fn trim_ifs_whitespace<'a>(line: &'a str, ifs: &str) -> &'a str {
    let ws: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    line.trim_matches(|c: char| ws.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::io::{string_reader_fd, FdSlot};

    fn io_with_input(text: &str) -> CommandIo {
        let fd = string_reader_fd(text.to_string()).unwrap();
        let mut io = CommandIo::inherit();
        io.set(0, FdSlot::Owned(fd));
        io
    }

    #[test]
    fn reads_into_reply() {
        let mut state = ShellState::default();
        let io = io_with_input("hello world\n");
        assert_eq!(read(&mut state, "read", &[], &io).unwrap(), 0);
        assert_eq!(state.get_string("REPLY"), Some("hello world".to_string()));
    }

    #[test]
    fn splits_into_names() {
        let mut state = ShellState::default();
        let io = io_with_input("one two three four\n");
        read(
            &mut state,
            "read",
            &["a".to_string(), "b".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.get_string("a"), Some("one".to_string()));
        // Last name takes the rest of the line.
        assert_eq!(state.get_string("b"), Some("two three four".to_string()));
    }

    #[test]
    fn eof_returns_failure() {
        let mut state = ShellState::default();
        let io = io_with_input("");
        assert_eq!(read(&mut state, "read", &[], &io).unwrap(), 1);
    }

    #[test]
    fn reads_single_line_only() {
        let mut state = ShellState::default();
        let io = io_with_input("first\nsecond\n");
        read(&mut state, "read", &["x".to_string()], &io).unwrap();
        assert_eq!(state.get_string("x"), Some("first".to_string()));
        // The next read picks up where the first stopped.
        read(&mut state, "read", &["y".to_string()], &io).unwrap();
        assert_eq!(state.get_string("y"), Some("second".to_string()));
    }

    #[test]
    fn backslash_continuation_without_r() {
        let mut state = ShellState::default();
        let io = io_with_input("one\\\ntwo\n");
        read(&mut state, "read", &["x".to_string()], &io).unwrap();
        assert_eq!(state.get_string("x"), Some("onetwo".to_string()));
    }

    #[test]
    fn raw_mode_keeps_backslashes() {
        let mut state = ShellState::default();
        let io = io_with_input("a\\tb\n");
        read(&mut state, "read", &["-r".to_string(), "x".to_string()], &io).unwrap();
        assert_eq!(state.get_string("x"), Some("a\\tb".to_string()));
    }

    #[test]
    fn array_mode() {
        let mut state = ShellState::default();
        let io = io_with_input("p q r\n");
        read(
            &mut state,
            "read",
            &["-a".to_string(), "arr".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(
            state.lookup("arr").unwrap().value.elements(),
            vec!["p", "q", "r"]
        );
    }

    #[test]
    fn custom_delimiter() {
        let mut state = ShellState::default();
        let io = io_with_input("before:after\n");
        read(
            &mut state,
            "read",
            &["-d".to_string(), ":".to_string(), "x".to_string()],
            &io,
        )
        .unwrap();
        assert_eq!(state.get_string("x"), Some("before".to_string()));
    }

    #[test]
    fn field_splitting_helper() {
        assert_eq!(split_read_fields("a b c", " \t\n", 2), vec!["a", "b c"]);
        assert_eq!(split_read_fields("  x  ", " \t\n", 3), vec!["x"]);
        assert_eq!(
            split_read_fields("a:b:c", ": \t\n", usize::MAX),
            vec!["a", "b", "c"]
        );
    }
}
