//! The `printf` builtin.
//!
//! Supports `%s %d %i %u %o %x %X %c %b %q %%` with flags, width and
//! precision, backslash escapes in the format, and bash's argument
//! cycling: the format is reused until the arguments run out.

use std::io::Write;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;

use super::fail;

pub fn printf(
    _state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let Some(format) = args.first() else {
        return Ok(fail(io, "printf", "usage: printf format [arguments]", 2));
    };
    let mut arguments = args[1..].iter();
    let mut out = io.stdout_writer();
    let mut status = 0;

    loop {
        let mut consumed = false;
        let rendered = render_format(format, &mut arguments, &mut consumed, &mut status);
        if out.write_all(rendered.as_bytes()).is_err() {
            return Ok(1);
        }
        // Cycle the format while arguments remain, but only if the pass
        // consumed at least one (otherwise a constant format would loop).
        if !consumed || arguments.len() == 0 {
            break;
        }
    }
    Ok(status)
}

fn render_format<'a>(
    format: &str,
    arguments: &mut std::slice::Iter<'a, String>,
    consumed: &mut bool,
    status: &mut i32,
) -> String {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let (decoded, advance) = decode_escape(&chars[i..]);
                out.push_str(&decoded);
                i += advance;
            }
            '%' if i + 1 < chars.len() && chars[i + 1] == '%' => {
                out.push('%');
                i += 2;
            }
            '%' => {
                let (spec, advance) = parse_spec(&chars[i..]);
                i += advance;
                match spec {
                    Some(spec) => {
                        let arg = arguments.next();
                        if arg.is_some() {
                            *consumed = true;
                        }
                        let arg = arg.map(|s| s.as_str()).unwrap_or("");
                        out.push_str(&format_one(&spec, arg, status));
                    }
                    None => {
                        out.push('%');
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

struct Spec {
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

fn parse_spec(chars: &[char]) -> (Option<Spec>, usize) {
    let mut i = 1;
    let mut spec = Spec {
        left_align: false,
        zero_pad: false,
        plus_sign: false,
        space_sign: false,
        alternate: false,
        width: 0,
        precision: None,
        conversion: 's',
    };

    while i < chars.len() {
        match chars[i] {
            '-' => spec.left_align = true,
            '0' => spec.zero_pad = true,
            '+' => spec.plus_sign = true,
            ' ' => spec.space_sign = true,
            '#' => spec.alternate = true,
            _ => break,
        }
        i += 1;
    }

    while i < chars.len() && chars[i].is_ascii_digit() {
        spec.width = spec.width * 10 + chars[i].to_digit(10).unwrap() as usize;
        i += 1;
    }

    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let mut precision = 0usize;
        while i < chars.len() && chars[i].is_ascii_digit() {
            precision = precision * 10 + chars[i].to_digit(10).unwrap() as usize;
            i += 1;
        }
        spec.precision = Some(precision);
    }

    match chars.get(i) {
        Some(&c) if "sdiuoxXcbq".contains(c) => {
            spec.conversion = c;
            (Some(spec), i + 1)
        }
        _ => (None, 1),
    }
}

fn format_one(spec: &Spec, arg: &str, status: &mut i32) -> String {
    let body = match spec.conversion {
        's' => {
            let mut text = arg.to_string();
            if let Some(p) = spec.precision {
                text = text.chars().take(p).collect();
            }
            text
        }
        'b' => decode_all_escapes(arg),
        'q' => quote_for_reuse(arg),
        'c' => arg.chars().next().map(|c| c.to_string()).unwrap_or_default(),
        'd' | 'i' => {
            let n = parse_int(arg, status);
            let digits = n.unsigned_abs().to_string();
            let digits = pad_precision(digits, spec.precision);
            if n < 0 {
                format!("-{}", digits)
            } else if spec.plus_sign {
                format!("+{}", digits)
            } else if spec.space_sign {
                format!(" {}", digits)
            } else {
                digits
            }
        }
        'u' => pad_precision((parse_int(arg, status) as u64).to_string(), spec.precision),
        'o' => {
            let n = parse_int(arg, status) as u64;
            let digits = format!("{:o}", n);
            if spec.alternate {
                format!("0{}", digits)
            } else {
                digits
            }
        }
        'x' => {
            let n = parse_int(arg, status) as u64;
            let digits = format!("{:x}", n);
            if spec.alternate {
                format!("0x{}", digits)
            } else {
                digits
            }
        }
        'X' => {
            let n = parse_int(arg, status) as u64;
            let digits = format!("{:X}", n);
            if spec.alternate {
                format!("0X{}", digits)
            } else {
                digits
            }
        }
        _ => arg.to_string(),
    };

    if body.len() >= spec.width {
        return body;
    }
    let pad = spec.width - body.len();
    if spec.left_align {
        format!("{}{}", body, " ".repeat(pad))
    } else if spec.zero_pad && matches!(spec.conversion, 'd' | 'i' | 'u' | 'o' | 'x' | 'X') {
        if let Some(rest) = body.strip_prefix('-') {
            format!("-{}{}", "0".repeat(pad), rest)
        } else {
            format!("{}{}", "0".repeat(pad), body)
        }
    } else {
        format!("{}{}", " ".repeat(pad), body)
    }
}

fn pad_precision(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    }
}

fn parse_int(arg: &str, status: &mut i32) -> i64 {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return 0;
    }
    // Leading quote: the numeric value of the character.
    if let Some(rest) = trimmed.strip_prefix('\'').or(trimmed.strip_prefix('"')) {
        if let Some(c) = rest.chars().next() {
            return c as i64;
        }
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or(trimmed.strip_prefix("0X")) {
        if let Ok(n) = i64::from_str_radix(hex, 16) {
            return n;
        }
    }
    match trimmed.parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            *status = 1;
            0
        }
    }
}

fn decode_escape(chars: &[char]) -> (String, usize) {
    match chars.get(1) {
        Some('n') => ("\n".to_string(), 2),
        Some('t') => ("\t".to_string(), 2),
        Some('r') => ("\r".to_string(), 2),
        Some('a') => ("\x07".to_string(), 2),
        Some('b') => ("\x08".to_string(), 2),
        Some('f') => ("\x0c".to_string(), 2),
        Some('v') => ("\x0b".to_string(), 2),
        Some('e') => ("\x1b".to_string(), 2),
        Some('\\') => ("\\".to_string(), 2),
        Some('"') => ("\"".to_string(), 2),
        Some('\'') => ("'".to_string(), 2),
        Some('0'..='7') => {
            let mut value = 0u32;
            let mut len = 1;
            while len <= 3 {
                match chars.get(len).and_then(|c| c.to_digit(8)) {
                    Some(d) => {
                        value = value * 8 + d;
                        len += 1;
                    }
                    None => break,
                }
            }
            (
                char::from_u32(value).map(|c| c.to_string()).unwrap_or_default(),
                len,
            )
        }
        Some('x') => {
            let mut value = 0u32;
            let mut len = 2;
            while len < 4 {
                match chars.get(len).and_then(|c| c.to_digit(16)) {
                    Some(d) => {
                        value = value * 16 + d;
                        len += 1;
                    }
                    None => break,
                }
            }
            if len == 2 {
                ("\\x".to_string(), 2)
            } else {
                (
                    char::from_u32(value).map(|c| c.to_string()).unwrap_or_default(),
                    len,
                )
            }
        }
        _ => ("\\".to_string(), 1),
    }
}

fn decode_all_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            let (decoded, advance) = decode_escape(&chars[i..]);
            out.push_str(&decoded);
            i += advance;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// `%q`: quote so the result re-enters the shell unchanged.
fn quote_for_reuse(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }
    if text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | ',' | '@' | '%'))
    {
        return text.to_string();
    }
    format!("'{}'", text.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::io::{pipe_pair, FdSlot, PipeDrain};

    fn run_printf(args: &[&str]) -> (String, i32) {
        let mut state = ShellState::default();
        let (read_end, write_end) = pipe_pair().unwrap();
        let drain = PipeDrain::start(read_end);
        let mut io = CommandIo::inherit();
        io.set(1, FdSlot::Owned(write_end));

        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let status = printf(&mut state, "printf", &args, &io).unwrap();
        drop(io);
        (drain.finish(), status)
    }

    #[test]
    fn plain_string_and_newline() {
        assert_eq!(run_printf(&["hello\\n"]).0, "hello\n");
    }

    #[test]
    fn string_substitution() {
        assert_eq!(run_printf(&["<%s>", "x"]).0, "<x>");
        assert_eq!(run_printf(&["%s-%s", "a", "b"]).0, "a-b");
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(run_printf(&["%d", "42"]).0, "42");
        assert_eq!(run_printf(&["%d", "-7"]).0, "-7");
        assert_eq!(run_printf(&["%x", "255"]).0, "ff");
        assert_eq!(run_printf(&["%X", "255"]).0, "FF");
        assert_eq!(run_printf(&["%o", "8"]).0, "10");
        assert_eq!(run_printf(&["%#x", "255"]).0, "0xff");
    }

    #[test]
    fn width_and_alignment() {
        assert_eq!(run_printf(&["%5d", "42"]).0, "   42");
        assert_eq!(run_printf(&["%-5d|", "42"]).0, "42   |");
        assert_eq!(run_printf(&["%05d", "42"]).0, "00042");
        assert_eq!(run_printf(&["%05d", "-42"]).0, "-0042");
    }

    #[test]
    fn precision_truncates_strings() {
        assert_eq!(run_printf(&["%.3s", "abcdef"]).0, "abc");
    }

    #[test]
    fn format_cycles_over_arguments() {
        assert_eq!(run_printf(&["%s\\n", "a", "b"]).0, "a\nb\n");
    }

    #[test]
    fn missing_arguments_are_empty() {
        assert_eq!(run_printf(&["[%s][%d]"]).0, "[][0]");
    }

    #[test]
    fn percent_literal() {
        assert_eq!(run_printf(&["100%%"]).0, "100%");
    }

    #[test]
    fn invalid_number_sets_status() {
        let (out, status) = run_printf(&["%d", "abc"]);
        assert_eq!(out, "0");
        assert_eq!(status, 1);
    }

    #[test]
    fn char_code_argument() {
        assert_eq!(run_printf(&["%d", "'A"]).0, "65");
    }

    #[test]
    fn b_conversion_decodes() {
        assert_eq!(run_printf(&["%b", "x\\ty"]).0, "x\ty");
    }

    #[test]
    fn q_conversion_quotes() {
        assert_eq!(run_printf(&["%q", "a b"]).0, "'a b'");
        assert_eq!(run_printf(&["%q", "plain"]).0, "plain");
    }
}
