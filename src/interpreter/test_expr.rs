//! Condition evaluation: the `test`/`[` builtin and the `[[ … ]]`
//! conditional command.

use regex_lite::Regex;

use crate::ast::{CondBinaryOp, CondExpr, CondUnaryOp};
use crate::interpreter::arithmetic;
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::{expand_pattern_word, expand_to_fields, expand_word_single};
use crate::interpreter::pattern::{self, MatchOptions};
use crate::interpreter::state::ShellState;

// ----------------------------------------------------------------------
// [[ … ]]
// ----------------------------------------------------------------------

pub fn evaluate_cond(state: &mut ShellState, expr: &CondExpr) -> Result<bool, ExecError> {
    match expr {
        CondExpr::Word(word) => {
            let value = expand_word_single(state, word)?;
            Ok(!value.is_empty())
        }
        CondExpr::Not(inner) => Ok(!evaluate_cond(state, inner)?),
        CondExpr::And(lhs, rhs) => Ok(evaluate_cond(state, lhs)? && evaluate_cond(state, rhs)?),
        CondExpr::Or(lhs, rhs) => Ok(evaluate_cond(state, lhs)? || evaluate_cond(state, rhs)?),
        CondExpr::Unary(op, operand) => {
            let value = expand_word_single(state, operand)?;
            Ok(unary_test(state, *op, &value))
        }
        CondExpr::Binary(op, lhs, rhs) => {
            let left = expand_word_single(state, lhs)?;
            match op {
                CondBinaryOp::Eq | CondBinaryOp::Ne => {
                    // Unquoted right side is a pattern.
                    let pattern_text = expand_pattern_word(state, rhs)?;
                    let opts = MatchOptions {
                        extglob: true,
                        nocase: state.shopt.nocasematch,
                        pathname: false,
                        require_literal_dot: false,
                    };
                    let matched = pattern::matches(&pattern_text, &left, opts);
                    Ok(if *op == CondBinaryOp::Eq { matched } else { !matched })
                }
                CondBinaryOp::Match => {
                    let regex_text = expand_regex_word(state, rhs)?;
                    let regex = Regex::new(&regex_text).map_err(|e| {
                        ExecError::expansion(format!("invalid regex: {}", e))
                    })?;
                    Ok(regex.is_match(&left))
                }
                CondBinaryOp::Lt => {
                    let right = expand_word_single(state, rhs)?;
                    Ok(left < right)
                }
                CondBinaryOp::Gt => {
                    let right = expand_word_single(state, rhs)?;
                    Ok(left > right)
                }
                CondBinaryOp::NumEq
                | CondBinaryOp::NumNe
                | CondBinaryOp::NumLt
                | CondBinaryOp::NumLe
                | CondBinaryOp::NumGt
                | CondBinaryOp::NumGe => {
                    let right = expand_word_single(state, rhs)?;
                    let a = numeric(state, &left)?;
                    let b = numeric(state, &right)?;
                    Ok(match op {
                        CondBinaryOp::NumEq => a == b,
                        CondBinaryOp::NumNe => a != b,
                        CondBinaryOp::NumLt => a < b,
                        CondBinaryOp::NumLe => a <= b,
                        CondBinaryOp::NumGt => a > b,
                        CondBinaryOp::NumGe => a >= b,
                        _ => unreachable!(),
                    })
                }
                CondBinaryOp::NewerThan | CondBinaryOp::OlderThan | CondBinaryOp::SameFile => {
                    let right = expand_word_single(state, rhs)?;
                    Ok(file_compare(state, *op, &left, &right))
                }
            }
        }
    }
}

/// `=~`: quoted spans match literally, unquoted spans are regex syntax.
fn expand_regex_word(state: &mut ShellState, word: &crate::ast::Word) -> Result<String, ExecError> {
    let fields = expand_to_fields(state, word)?;
    let mut out = String::new();
    for field in &fields {
        for fragment in field {
            if fragment.quoted {
                out.push_str(&pattern::regex_escape(&fragment.text));
            } else {
                out.push_str(&fragment.text);
            }
        }
    }
    Ok(out)
}

// ----------------------------------------------------------------------
// test / [
// ----------------------------------------------------------------------

/// POSIX `test` over already-expanded arguments. Returns the exit status
/// (0 true, 1 false, 2 usage).
pub fn evaluate_test_args(state: &mut ShellState, args: &[String]) -> Result<i32, ExecError> {
    let mut parser = TestParser { state, args, pos: 0 };
    let result = parser.parse_or()?;
    if parser.pos != parser.args.len() {
        return Err(ExecError::Expansion {
            message: format!("test: too many arguments near `{}'", parser.args[parser.pos]),
            status: 2,
        });
    }
    Ok(if result { 0 } else { 1 })
}

struct TestParser<'a> {
    state: &'a mut ShellState,
    args: &'a [String],
    pos: usize,
}

impl<'a> TestParser<'a> {
    fn peek(&self) -> Option<&str> {
        self.args.get(self.pos).map(|s| s.as_str())
    }

    fn advance(&mut self) -> Option<&'a str> {
        let arg = self.args.get(self.pos).map(|s| s.as_str());
        if arg.is_some() {
            self.pos += 1;
        }
        arg
    }

    fn parse_or(&mut self) -> Result<bool, ExecError> {
        let mut result = self.parse_and()?;
        while self.peek() == Some("-o") {
            self.advance();
            let rhs = self.parse_and()?;
            result = result || rhs;
        }
        Ok(result)
    }

    fn parse_and(&mut self) -> Result<bool, ExecError> {
        let mut result = self.parse_term()?;
        while self.peek() == Some("-a") {
            self.advance();
            let rhs = self.parse_term()?;
            result = result && rhs;
        }
        Ok(result)
    }

    fn parse_term(&mut self) -> Result<bool, ExecError> {
        match self.peek() {
            None => Ok(false),
            Some("!") => {
                self.advance();
                Ok(!self.parse_term()?)
            }
            Some("(") => {
                self.advance();
                let inner = self.parse_or()?;
                if self.advance() != Some(")") {
                    return Err(ExecError::Expansion {
                        message: "test: missing `)'".to_string(),
                        status: 2,
                    });
                }
                Ok(inner)
            }
            Some(first) => {
                let first = first.to_string();
                // Binary operator?
                if let Some(op) = self.args.get(self.pos + 1).cloned() {
                    if let Some(result) = self.try_binary(&first, &op)? {
                        return Ok(result);
                    }
                }
                // Unary operator with operand?
                if first.len() == 2 && first.starts_with('-') && self.args.len() > self.pos + 1 {
                    self.advance();
                    let operand = self.advance().unwrap_or("").to_string();
                    if let Some(op) = unary_from_flag(&first) {
                        return Ok(unary_test(self.state, op, &operand));
                    }
                    return Err(ExecError::Expansion {
                        message: format!("test: {}: unary operator expected", first),
                        status: 2,
                    });
                }
                // Bare string.
                self.advance();
                Ok(!first.is_empty())
            }
        }
    }

    fn try_binary(&mut self, left: &str, op: &str) -> Result<Option<bool>, ExecError> {
        let binary = match op {
            "=" | "==" => CondBinaryOp::Eq,
            "!=" => CondBinaryOp::Ne,
            "<" => CondBinaryOp::Lt,
            ">" => CondBinaryOp::Gt,
            "-eq" => CondBinaryOp::NumEq,
            "-ne" => CondBinaryOp::NumNe,
            "-lt" => CondBinaryOp::NumLt,
            "-le" => CondBinaryOp::NumLe,
            "-gt" => CondBinaryOp::NumGt,
            "-ge" => CondBinaryOp::NumGe,
            "-nt" => CondBinaryOp::NewerThan,
            "-ot" => CondBinaryOp::OlderThan,
            "-ef" => CondBinaryOp::SameFile,
            _ => return Ok(None),
        };
        let left = left.to_string();
        self.advance();
        self.advance();
        let right = self.advance().unwrap_or("").to_string();

        let result = match binary {
            CondBinaryOp::Eq => left == right,
            CondBinaryOp::Ne => left != right,
            CondBinaryOp::Lt => left < right,
            CondBinaryOp::Gt => left > right,
            CondBinaryOp::NumEq
            | CondBinaryOp::NumNe
            | CondBinaryOp::NumLt
            | CondBinaryOp::NumLe
            | CondBinaryOp::NumGt
            | CondBinaryOp::NumGe => {
                let a = numeric(self.state, &left)?;
                let b = numeric(self.state, &right)?;
                match binary {
                    CondBinaryOp::NumEq => a == b,
                    CondBinaryOp::NumNe => a != b,
                    CondBinaryOp::NumLt => a < b,
                    CondBinaryOp::NumLe => a <= b,
                    CondBinaryOp::NumGt => a > b,
                    CondBinaryOp::NumGe => a >= b,
                    _ => unreachable!(),
                }
            }
            CondBinaryOp::NewerThan | CondBinaryOp::OlderThan | CondBinaryOp::SameFile => {
                file_compare(self.state, binary, &left, &right)
            }
            CondBinaryOp::Match => unreachable!(),
        };
        Ok(Some(result))
    }
}

fn numeric(state: &mut ShellState, text: &str) -> Result<i64, ExecError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    arithmetic::eval_text(state, trimmed).map_err(|_| ExecError::Expansion {
        message: format!("integer expression expected: {}", text),
        status: 2,
    })
}

fn unary_from_flag(flag: &str) -> Option<CondUnaryOp> {
    Some(match flag {
        "-b" => CondUnaryOp::BlockSpecial,
        "-c" => CondUnaryOp::CharSpecial,
        "-d" => CondUnaryOp::Dir,
        "-e" => CondUnaryOp::Exists,
        "-f" => CondUnaryOp::RegularFile,
        "-g" => CondUnaryOp::SetGid,
        "-h" | "-L" => CondUnaryOp::Symlink,
        "-p" => CondUnaryOp::Fifo,
        "-r" => CondUnaryOp::Readable,
        "-s" => CondUnaryOp::NonEmptyFile,
        "-t" => CondUnaryOp::Tty,
        "-u" => CondUnaryOp::SetUid,
        "-w" => CondUnaryOp::Writable,
        "-x" => CondUnaryOp::Executable,
        "-S" => CondUnaryOp::Socket,
        "-z" => CondUnaryOp::ZeroLength,
        "-n" => CondUnaryOp::NonZeroLength,
        "-v" => CondUnaryOp::VarSet,
        "-o" => CondUnaryOp::OptionSet,
        _ => return None,
    })
}

// ----------------------------------------------------------------------
// Shared operators
// ----------------------------------------------------------------------

pub fn unary_test(state: &ShellState, op: CondUnaryOp, operand: &str) -> bool {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::fs::PermissionsExt;

    let resolved = state.resolve_path(operand);
    let meta = || std::fs::metadata(&resolved);
    let symlink_meta = || std::fs::symlink_metadata(&resolved);

    match op {
        CondUnaryOp::ZeroLength => operand.is_empty(),
        CondUnaryOp::NonZeroLength => !operand.is_empty(),
        CondUnaryOp::VarSet => state.is_set(operand),
        CondUnaryOp::OptionSet => state.options.get(operand) == Some(true),
        CondUnaryOp::Exists => resolved.exists(),
        CondUnaryOp::Dir => meta().map(|m| m.is_dir()).unwrap_or(false),
        CondUnaryOp::RegularFile => meta().map(|m| m.is_file()).unwrap_or(false),
        CondUnaryOp::Symlink => symlink_meta().map(|m| m.file_type().is_symlink()).unwrap_or(false),
        CondUnaryOp::Fifo => meta().map(|m| m.file_type().is_fifo()).unwrap_or(false),
        CondUnaryOp::Socket => meta().map(|m| m.file_type().is_socket()).unwrap_or(false),
        CondUnaryOp::BlockSpecial => {
            meta().map(|m| m.file_type().is_block_device()).unwrap_or(false)
        }
        CondUnaryOp::CharSpecial => {
            meta().map(|m| m.file_type().is_char_device()).unwrap_or(false)
        }
        CondUnaryOp::NonEmptyFile => meta().map(|m| m.len() > 0).unwrap_or(false),
        CondUnaryOp::SetUid => meta().map(|m| m.permissions().mode() & 0o4000 != 0).unwrap_or(false),
        CondUnaryOp::SetGid => meta().map(|m| m.permissions().mode() & 0o2000 != 0).unwrap_or(false),
        CondUnaryOp::Readable => access(&resolved.to_string_lossy(), libc::R_OK),
        CondUnaryOp::Writable => access(&resolved.to_string_lossy(), libc::W_OK),
        CondUnaryOp::Executable => access(&resolved.to_string_lossy(), libc::X_OK),
        CondUnaryOp::Tty => {
            let fd: i32 = operand.parse().unwrap_or(-1);
            fd >= 0 && unsafe { libc::isatty(fd) == 1 }
        }
    }
}

fn access(path: &str, mode: libc::c_int) -> bool {
    let Ok(cpath) = std::ffi::CString::new(path) else {
        return false;
    };
    unsafe { libc::access(cpath.as_ptr(), mode) == 0 }
}

fn file_compare(state: &ShellState, op: CondBinaryOp, left: &str, right: &str) -> bool {
    use std::os::unix::fs::MetadataExt;

    let lm = std::fs::metadata(state.resolve_path(left));
    let rm = std::fs::metadata(state.resolve_path(right));
    match op {
        CondBinaryOp::NewerThan => match (lm, rm) {
            (Ok(a), Ok(b)) => a.mtime() > b.mtime(),
            (Ok(_), Err(_)) => true,
            _ => false,
        },
        CondBinaryOp::OlderThan => match (lm, rm) {
            (Ok(a), Ok(b)) => a.mtime() < b.mtime(),
            (Err(_), Ok(_)) => true,
            _ => false,
        },
        CondBinaryOp::SameFile => match (lm, rm) {
            (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
            _ => false,
        },
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
