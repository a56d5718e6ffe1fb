//! Shell pattern matching.
//!
//! Translates glob patterns (`* ? [..]`, POSIX character classes, and the
//! extglob operators) into anchored regexes for `case`, `[[ == ]]`,
//! parameter pattern operations and the pathname walker. Backslash escapes
//! in the pattern force literal matching.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex_lite::Regex;

lazy_static! {
    /// POSIX character class names and their regex bodies.
    static ref POSIX_CLASSES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("alnum", "a-zA-Z0-9");
        m.insert("alpha", "a-zA-Z");
        m.insert("ascii", "\\x00-\\x7F");
        m.insert("blank", " \\t");
        m.insert("cntrl", "\\x00-\\x1F\\x7F");
        m.insert("digit", "0-9");
        m.insert("graph", "!-~");
        m.insert("lower", "a-z");
        m.insert("print", " -~");
        m.insert("punct", "!-/:-@\\[-`{-~");
        m.insert("space", " \\t\\n\\r\\x0b\\x0c");
        m.insert("upper", "A-Z");
        m.insert("word", "a-zA-Z0-9_");
        m.insert("xdigit", "0-9A-Fa-f");
        m
    };
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    pub extglob: bool,
    pub nocase: bool,
    /// `*` and `?` refuse to cross `/` (pathname segments).
    pub pathname: bool,
    /// Leading dots need an explicit dot in the pattern.
    pub require_literal_dot: bool,
}

/// Escape a string for literal inclusion in a regex.
pub fn regex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// True when the text contains unescaped glob metacharacters.
pub fn has_glob_chars(pattern: &str, extglob: bool) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '*' | '?' | '[' => return true,
            '@' | '+' | '!' if extglob && chars.get(i + 1) == Some(&'(') => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Translate a shell pattern into an anchored regex.
pub fn pattern_to_regex(pattern: &str, opts: MatchOptions) -> String {
    let mut regex = String::from("^");
    if opts.nocase {
        regex.insert_str(0, "(?i)");
    }
    translate_into(&mut regex, pattern, opts);
    regex.push('$');
    regex
}

fn any_char(opts: MatchOptions) -> &'static str {
    if opts.pathname {
        "[^/]"
    } else {
        "(?s:.)"
    }
}

fn translate_into(out: &mut String, pattern: &str, opts: MatchOptions) {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // extglob operators: ?( ) *( ) +( ) @( ) !( )
        if opts.extglob
            && matches!(c, '?' | '*' | '+' | '@' | '!')
            && chars.get(i + 1) == Some(&'(')
        {
            if let Some(end) = find_paren_end(&chars, i + 1) {
                let inner: String = chars[i + 2..end].iter().collect();
                let alternatives: Vec<String> = split_alternatives(&inner)
                    .into_iter()
                    .map(|alt| {
                        let mut sub = String::new();
                        translate_into(&mut sub, &alt, opts);
                        sub
                    })
                    .collect();
                let group = format!("(?:{})", alternatives.join("|"));
                match c {
                    '?' => out.push_str(&format!("{}?", group)),
                    '*' => out.push_str(&format!("{}*", group)),
                    '+' => out.push_str(&format!("{}+", group)),
                    '@' => out.push_str(&group),
                    // Without look-around support a general `!(…)` cannot
                    // be translated inline; a whole-pattern negation is
                    // handled in `matches`, the embedded form matches any
                    // run.
                    '!' => out.push_str(&format!("{}*", any_char(opts))),
                    _ => unreachable!(),
                }
                i = end + 1;
                continue;
            }
        }

        match c {
            '*' => {
                out.push_str(&format!("{}*", any_char(opts)));
                i += 1;
            }
            '?' => {
                out.push_str(any_char(opts));
                i += 1;
            }
            '[' => {
                if let Some(end) = find_bracket_end(&chars, i) {
                    out.push_str(&translate_bracket(&chars[i..=end]));
                    i = end + 1;
                } else {
                    out.push_str("\\[");
                    i += 1;
                }
            }
            '\\' => {
                i += 1;
                if i < chars.len() {
                    out.push_str(&regex_escape(&chars[i].to_string()));
                    i += 1;
                } else {
                    out.push_str("\\\\");
                }
            }
            _ => {
                out.push_str(&regex_escape(&c.to_string()));
                i += 1;
            }
        }
    }
}

/// `[...]` → regex character class, handling `!`/`^` negation and POSIX
/// classes.
fn translate_bracket(chars: &[char]) -> String {
    let mut out = String::from("[");
    let mut i = 1;

    if matches!(chars.get(i), Some('!') | Some('^')) {
        out.push('^');
        i += 1;
    }

    // A leading `]` is literal.
    if chars.get(i) == Some(&']') {
        out.push_str("\\]");
        i += 1;
    }

    while i < chars.len() - 1 {
        let c = chars[i];
        if c == '[' && chars.get(i + 1) == Some(&':') {
            if let Some(close) = find_class_end(chars, i) {
                let name: String = chars[i + 2..close - 1].iter().collect();
                if let Some(body) = POSIX_CLASSES.get(name.as_str()) {
                    out.push_str(body);
                }
                i = close + 1;
                continue;
            }
        }
        match c {
            '\\' => out.push_str("\\\\"),
            '^' => out.push_str("\\^"),
            ']' => out.push_str("\\]"),
            _ => out.push(c),
        }
        i += 1;
    }

    out.push(']');
    out
}

fn find_bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        i += 1;
    }
    // `]` immediately after the opener is literal.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            ']' => return Some(i),
            '[' if chars.get(i + 1) == Some(&':') => {
                i = find_class_end(chars, i)?;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// For `[:name:]`, returns the index of the closing `]` of the class.
fn find_class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == ':' && chars[i + 1] == ']' {
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

fn find_paren_end(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            '\\' => i += 1,
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_alternatives(inner: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' if depth == 0 => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

/// Full-match a text against a shell pattern.
pub fn matches(pattern: &str, text: &str, opts: MatchOptions) -> bool {
    // Whole-pattern `!(…)` negates.
    if opts.extglob && pattern.starts_with("!(") && pattern.ends_with(')') {
        let chars: Vec<char> = pattern.chars().collect();
        if find_paren_end(&chars, 1) == Some(chars.len() - 1) {
            let inner: String = chars[2..chars.len() - 1].iter().collect();
            return !split_alternatives(&inner)
                .iter()
                .any(|alt| matches(alt, text, opts));
        }
    }

    let regex = pattern_to_regex(pattern, opts);
    match Regex::new(&regex) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Remove the shortest/longest prefix or suffix matching a pattern, for
/// `${var#pat}` and friends.
pub fn remove_pattern(
    value: &str,
    pattern: &str,
    suffix: bool,
    greedy: bool,
    opts: MatchOptions,
) -> String {
    let indices: Vec<usize> = {
        let mut v: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
        v.push(value.len());
        v
    };

    if suffix {
        // Candidate suffixes from shortest to longest.
        let order: Box<dyn Iterator<Item = &usize>> = if greedy {
            Box::new(indices.iter())
        } else {
            Box::new(indices.iter().rev())
        };
        for &start in order {
            if matches(pattern, &value[start..], opts) {
                return value[..start].to_string();
            }
        }
    } else {
        let order: Box<dyn Iterator<Item = &usize>> = if greedy {
            Box::new(indices.iter().rev())
        } else {
            Box::new(indices.iter())
        };
        for &end in order {
            if matches(pattern, &value[..end], opts) {
                return value[end..].to_string();
            }
        }
    }
    value.to_string()
}

/// `${var/pat/rep}`: replace the first (or every) occurrence. Matches are
/// found longest-first at each position.
pub fn replace_pattern(
    value: &str,
    pattern: &str,
    replacement: &str,
    all: bool,
    opts: MatchOptions,
) -> String {
    let mut out = String::new();
    let chars: Vec<(usize, char)> = value.char_indices().collect();
    let mut boundaries: Vec<usize> = chars.iter().map(|(i, _)| *i).collect();
    boundaries.push(value.len());

    let mut pos_idx = 0;
    let mut replaced = false;
    while pos_idx < boundaries.len() {
        let start = boundaries[pos_idx];
        if replaced && !all {
            out.push_str(&value[start..]);
            return out;
        }
        // Longest match starting here.
        let mut matched_end = None;
        for &end in boundaries[pos_idx..].iter().rev() {
            if end < start {
                continue;
            }
            if matches(pattern, &value[start..end], opts) {
                matched_end = Some(end);
                break;
            }
        }
        match matched_end {
            Some(end) if end > start => {
                out.push_str(replacement);
                replaced = true;
                while pos_idx < boundaries.len() && boundaries[pos_idx] < end {
                    pos_idx += 1;
                }
            }
            Some(end) if end == start && !replaced => {
                // Empty match: insert once at the start.
                out.push_str(replacement);
                replaced = true;
                if pos_idx < boundaries.len() - 1 {
                    out.push(value[start..].chars().next().unwrap());
                }
                pos_idx += 1;
            }
            _ => {
                if pos_idx < boundaries.len() - 1 {
                    out.push(value[start..].chars().next().unwrap());
                }
                pos_idx += 1;
            }
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
