//! Word parser: raw word text → `Word` part tree.
//!
//! The lexer hands over words with quoting intact. This module recovers the
//! structure: quoted spans, parameter expansions (every `${…}` form),
//! command substitution, arithmetic expansion, brace expansion and tilde
//! prefixes. The expander walks the resulting tree.

use crate::ast::{
    BraceBound, BraceExpansion, BraceRange, ParamOperation, ParameterExpansion, PatternAnchor,
    Subscript, Word, WordPart,
};

use super::arith_parser::parse_arithmetic;
use super::types::ParseError;

/// Parse a full word as produced by the lexer.
pub fn parse_word(text: &str) -> Result<Word, ParseError> {
    let mut parser = WordParser::new(text);
    parser.allow_tilde = true;
    parser.allow_brace = true;
    parser.parse()
}

/// Parse a word fragment inside `${…}` operations or brace alternatives:
/// quoting and `$`-expansions apply, tilde and brace expansion do not.
pub fn parse_word_fragment(text: &str) -> Result<Word, ParseError> {
    let mut parser = WordParser::new(text);
    parser.parse()
}

/// Parse an assignment value: tilde expansion applies at the start, brace
/// expansion does not.
pub fn parse_word_assign(text: &str) -> Result<Word, ParseError> {
    let mut parser = WordParser::new(text);
    parser.allow_tilde = true;
    parser.parse()
}

/// Parse a here-document body: behaves like the inside of double quotes
/// (`$`, backtick and backslash are special, quotes are literal).
pub fn parse_heredoc_body(text: &str) -> Result<Word, ParseError> {
    let mut parser = WordParser::new(text);
    let parts = parser.parse_dquote_interior(None)?;
    Ok(Word { parts })
}

struct WordParser {
    chars: Vec<char>,
    pos: usize,
    allow_tilde: bool,
    allow_brace: bool,
}

impl WordParser {
    fn new(text: &str) -> Self {
        WordParser {
            chars: text.chars().collect(),
            pos: 0,
            allow_tilde: false,
            allow_brace: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn parse(&mut self) -> Result<Word, ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut literal = String::new();

        // Tilde only applies at the very start of the word.
        if self.allow_tilde && self.peek() == Some('~') {
            if let Some(part) = self.try_tilde() {
                parts.push(part);
            }
        }

        while let Some(c) = self.peek() {
            match c {
                '\'' => {
                    flush(&mut parts, &mut literal);
                    self.advance();
                    let mut value = String::new();
                    while let Some(inner) = self.advance() {
                        if inner == '\'' {
                            break;
                        }
                        value.push(inner);
                    }
                    parts.push(WordPart::SingleQuoted(value));
                }
                '"' => {
                    flush(&mut parts, &mut literal);
                    self.advance();
                    let inner = self.parse_dquote_interior(Some('"'))?;
                    parts.push(WordPart::DoubleQuoted(inner));
                }
                '\\' => {
                    self.advance();
                    if let Some(next) = self.advance() {
                        flush(&mut parts, &mut literal);
                        parts.push(WordPart::Escaped(next));
                    } else {
                        literal.push('\\');
                    }
                }
                '`' => {
                    flush(&mut parts, &mut literal);
                    let part = self.parse_backtick()?;
                    parts.push(part);
                }
                '$' => {
                    if let Some(part) = self.parse_dollar()? {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                    } else {
                        self.advance();
                        literal.push('$');
                    }
                }
                '{' if self.allow_brace => {
                    if let Some(part) = self.try_brace()? {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                    } else {
                        self.advance();
                        literal.push('{');
                    }
                }
                _ => {
                    self.advance();
                    literal.push(c);
                }
            }
        }

        flush(&mut parts, &mut literal);
        Ok(Word { parts })
    }

    /// Inside double quotes (or a heredoc body when `close` is None):
    /// only `$`, backtick and backslash are special.
    fn parse_dquote_interior(&mut self, close: Option<char>) -> Result<Vec<WordPart>, ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek() {
            if Some(c) == close {
                self.advance();
                break;
            }
            match c {
                '\\' => {
                    self.advance();
                    match self.peek() {
                        // Backslash escapes only these inside double quotes;
                        // otherwise it stays literal.
                        Some(next @ ('$' | '`' | '"' | '\\')) => {
                            self.advance();
                            literal.push(next);
                        }
                        Some('\n') => {
                            self.advance();
                        }
                        _ => literal.push('\\'),
                    }
                }
                '`' => {
                    flush(&mut parts, &mut literal);
                    let part = self.parse_backtick()?;
                    parts.push(part);
                }
                '$' => {
                    if let Some(part) = self.parse_dollar()? {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                    } else {
                        self.advance();
                        literal.push('$');
                    }
                }
                _ => {
                    self.advance();
                    literal.push(c);
                }
            }
        }

        flush(&mut parts, &mut literal);
        Ok(parts)
    }

    fn parse_backtick(&mut self) -> Result<WordPart, ParseError> {
        self.advance(); // `
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('`') => break,
                Some('\\') => match self.advance() {
                    // Inside backticks, backslash quotes `$`, backtick and
                    // backslash itself.
                    Some(next @ ('$' | '`' | '\\')) => text.push(next),
                    Some(next) => {
                        text.push('\\');
                        text.push(next);
                    }
                    None => {
                        return Err(ParseError::UnterminatedExpansion {
                            construct: "`",
                            line: 0,
                            column: 0,
                        })
                    }
                },
                Some(c) => text.push(c),
                None => {
                    return Err(ParseError::UnterminatedExpansion {
                        construct: "`",
                        line: 0,
                        column: 0,
                    })
                }
            }
        }
        let script = crate::parser::parse(&text)?;
        Ok(WordPart::CommandSubst(script))
    }

    /// Parse a `$`-introduced expansion. Returns None when the `$` is
    /// literal (end of word or no valid construct follows).
    fn parse_dollar(&mut self) -> Result<Option<WordPart>, ParseError> {
        match self.peek_at(1) {
            Some('(') if self.peek_at(2) == Some('(') => {
                // Could still be $( (subshell) ) — try arithmetic first and
                // fall back on unbalanced parens.
                if let Some(part) = self.try_arith_expansion()? {
                    return Ok(Some(part));
                }
                self.parse_command_subst().map(Some)
            }
            Some('(') => self.parse_command_subst().map(Some),
            Some('{') => self.parse_braced_parameter().map(Some),
            Some('\'') => {
                self.advance(); // $
                self.advance(); // '
                let mut raw = String::new();
                loop {
                    match self.advance() {
                        Some('\'') => break,
                        Some('\\') => {
                            raw.push('\\');
                            if let Some(next) = self.advance() {
                                raw.push(next);
                            }
                        }
                        Some(c) => raw.push(c),
                        None => {
                            return Err(ParseError::UnterminatedQuote { line: 0, column: 0 })
                        }
                    }
                }
                Ok(Some(WordPart::AnsiCQuoted(decode_ansi_c(&raw))))
            }
            Some('"') => {
                // $"…" is locale translation; den treats it as plain "…".
                self.advance(); // $
                self.advance(); // "
                let inner = self.parse_dquote_interior(Some('"'))?;
                Ok(Some(WordPart::DoubleQuoted(inner)))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                self.advance(); // $
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Ok(Some(WordPart::Parameter(ParameterExpansion {
                    parameter: name,
                    subscript: None,
                    operation: None,
                })))
            }
            Some(c) if c.is_ascii_digit() => {
                self.advance(); // $
                self.advance();
                Ok(Some(WordPart::Parameter(ParameterExpansion {
                    parameter: c.to_string(),
                    subscript: None,
                    operation: None,
                })))
            }
            Some(c @ ('?' | '#' | '@' | '*' | '$' | '!' | '-' | '_')) => {
                self.advance(); // $
                self.advance();
                Ok(Some(WordPart::Parameter(ParameterExpansion {
                    parameter: c.to_string(),
                    subscript: None,
                    operation: None,
                })))
            }
            _ => Ok(None),
        }
    }

    fn try_arith_expansion(&mut self) -> Result<Option<WordPart>, ParseError> {
        let start = self.pos;
        self.advance(); // $
        self.advance(); // (
        self.advance(); // (
        let mut depth = 2usize;
        let mut inner = String::new();

        while let Some(c) = self.advance() {
            match c {
                '(' => {
                    depth += 1;
                    inner.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        if inner.ends_with(')') {
                            inner.pop();
                            let expr = parse_arithmetic(&inner)?;
                            return Ok(Some(WordPart::Arithmetic(expr)));
                        }
                        break;
                    }
                    inner.push(c);
                }
                _ => inner.push(c),
            }
        }

        self.pos = start;
        Ok(None)
    }

    fn parse_command_subst(&mut self) -> Result<WordPart, ParseError> {
        self.advance(); // $
        self.advance(); // (
        let mut depth = 1usize;
        let mut text = String::new();

        while let Some(c) = self.advance() {
            match c {
                '(' => {
                    depth += 1;
                    text.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let script = crate::parser::parse(&text)?;
                        return Ok(WordPart::CommandSubst(script));
                    }
                    text.push(c);
                }
                '\'' => {
                    text.push(c);
                    while let Some(inner) = self.advance() {
                        text.push(inner);
                        if inner == '\'' {
                            break;
                        }
                    }
                }
                '"' => {
                    text.push(c);
                    while let Some(inner) = self.advance() {
                        text.push(inner);
                        match inner {
                            '"' => break,
                            '\\' => {
                                if let Some(esc) = self.advance() {
                                    text.push(esc);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                '\\' => {
                    text.push(c);
                    if let Some(next) = self.advance() {
                        text.push(next);
                    }
                }
                _ => text.push(c),
            }
        }

        Err(ParseError::UnterminatedExpansion { construct: "$(", line: 0, column: 0 })
    }

    /// Parse `${…}` in all its forms.
    fn parse_braced_parameter(&mut self) -> Result<WordPart, ParseError> {
        self.advance(); // $
        self.advance(); // {
        let start = self.pos;

        // Collect the balanced interior first for error reporting.
        let mut depth = 1usize;
        let mut interior = String::new();
        while let Some(c) = self.advance() {
            match c {
                '{' => {
                    depth += 1;
                    interior.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    interior.push(c);
                }
                '\'' => {
                    interior.push(c);
                    while let Some(inner) = self.advance() {
                        interior.push(inner);
                        if inner == '\'' {
                            break;
                        }
                    }
                }
                '"' => {
                    interior.push(c);
                    while let Some(inner) = self.advance() {
                        interior.push(inner);
                        match inner {
                            '"' => break,
                            '\\' => {
                                if let Some(esc) = self.advance() {
                                    interior.push(esc);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                '\\' => {
                    interior.push(c);
                    if let Some(next) = self.advance() {
                        interior.push(next);
                    }
                }
                '$' if self.peek() == Some('{') => {
                    // Nested ${…} inside an operation word.
                    interior.push('$');
                    interior.push('{');
                    self.advance();
                    depth += 1;
                }
                _ => interior.push(c),
            }
        }
        if depth != 0 {
            return Err(ParseError::UnterminatedExpansion { construct: "${", line: 0, column: 0 });
        }
        let _ = start;

        parse_braced_interior(&interior)
    }

    /// Leading `~` / `~user`, terminated by `/` or end of word.
    fn try_tilde(&mut self) -> Option<WordPart> {
        let mut end = self.pos + 1;
        let mut user = String::new();
        while let Some(&c) = self.chars.get(end) {
            if c == '/' {
                break;
            }
            // Any quoting or expansion character defeats tilde expansion.
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
                return None;
            }
            user.push(c);
            end += 1;
        }
        self.pos = end;
        Some(WordPart::Tilde(if user.is_empty() { None } else { Some(user) }))
    }

    /// Brace expansion `{a,b}` / `{1..5}`. Returns None (position
    /// unchanged) when the braces do not form an expansion.
    fn try_brace(&mut self) -> Result<Option<WordPart>, ParseError> {
        let start = self.pos;
        self.advance(); // {
        let mut depth = 1usize;
        let mut interior = String::new();

        while let Some(c) = self.advance() {
            match c {
                '{' => {
                    depth += 1;
                    interior.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    interior.push(c);
                }
                '\'' | '"' => {
                    interior.push(c);
                    let quote = c;
                    while let Some(inner) = self.advance() {
                        interior.push(inner);
                        if inner == quote {
                            break;
                        }
                    }
                }
                '\\' => {
                    interior.push(c);
                    if let Some(next) = self.advance() {
                        interior.push(next);
                    }
                }
                _ => interior.push(c),
            }
        }

        if depth != 0 {
            self.pos = start;
            return Ok(None);
        }

        // Range form.
        if let Some(range) = parse_brace_range(&interior) {
            return Ok(Some(WordPart::Brace(BraceExpansion::Range(range))));
        }

        // List form needs a top-level comma.
        let alternatives = split_brace_list(&interior);
        if alternatives.len() < 2 {
            self.pos = start;
            return Ok(None);
        }

        let mut words = Vec::new();
        for alt in alternatives {
            let mut sub = WordParser::new(&alt);
            sub.allow_brace = true;
            words.push(sub.parse()?);
        }
        Ok(Some(WordPart::Brace(BraceExpansion::List(words))))
    }
}

fn flush(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

/// Split a brace interior on top-level commas.
fn split_brace_list(interior: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = interior.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

/// `1..5`, `1..10..2`, `a..f`, `01..03` (zero padding preserved).
fn parse_brace_range(interior: &str) -> Option<BraceRange> {
    let parts: Vec<&str> = interior.split("..").collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }

    let step = if parts.len() == 3 {
        Some(parts[2].parse::<i64>().ok()?)
    } else {
        None
    };

    let parse_bound = |s: &str| -> Option<BraceBound> {
        if let Ok(value) = s.parse::<i64>() {
            let digits = s.strip_prefix('-').unwrap_or(s);
            let width = if digits.len() > 1 && digits.starts_with('0') {
                s.len()
            } else {
                0
            };
            return Some(BraceBound::Number { value, width });
        }
        let mut chars = s.chars();
        let c = chars.next()?;
        if chars.next().is_none() && c.is_ascii_alphabetic() {
            return Some(BraceBound::Char(c));
        }
        None
    };

    let start = parse_bound(parts[0])?;
    let end = parse_bound(parts[1])?;
    // Mixed numeric/char ranges are not expansions.
    match (&start, &end) {
        (BraceBound::Number { .. }, BraceBound::Number { .. })
        | (BraceBound::Char(_), BraceBound::Char(_)) => {}
        _ => return None,
    }
    Some(BraceRange { start, end, step })
}

/// Parse the interior of `${…}`.
fn parse_braced_interior(interior: &str) -> Result<WordPart, ParseError> {
    if interior.is_empty() {
        return Err(ParseError::BadSubstitution { text: "${}".to_string() });
    }

    // ${#…}: length, unless the parameter itself is `#` (or `#` with an op,
    // which bash rejects anyway).
    if let Some(rest) = interior.strip_prefix('#') {
        if !rest.is_empty() {
            let (name, subscript) = split_subscript(rest)?;
            if is_valid_parameter(&name) && subscript_only(rest, &name) {
                return Ok(WordPart::Parameter(ParameterExpansion {
                    parameter: name,
                    subscript,
                    operation: Some(ParamOperation::Length),
                }));
            }
            return Err(ParseError::BadSubstitution { text: format!("${{{}}}", interior) });
        }
    }

    // ${!…}: indirection, array keys, or prefix listing.
    if let Some(rest) = interior.strip_prefix('!') {
        if !rest.is_empty() {
            if let Some(prefix) = rest.strip_suffix('@') {
                if is_valid_name(prefix) {
                    return Ok(WordPart::Parameter(ParameterExpansion {
                        parameter: prefix.to_string(),
                        subscript: None,
                        operation: Some(ParamOperation::NamesWithPrefix { star: false }),
                    }));
                }
            }
            if let Some(prefix) = rest.strip_suffix('*') {
                if is_valid_name(prefix) {
                    return Ok(WordPart::Parameter(ParameterExpansion {
                        parameter: prefix.to_string(),
                        subscript: None,
                        operation: Some(ParamOperation::NamesWithPrefix { star: true }),
                    }));
                }
            }
            let (name, subscript) = split_subscript(rest)?;
            if is_valid_name(&name) && subscript_only(rest, &name) {
                match subscript {
                    Some(Subscript::At) => {
                        return Ok(WordPart::Parameter(ParameterExpansion {
                            parameter: name,
                            subscript: None,
                            operation: Some(ParamOperation::ArrayKeys { star: false }),
                        }));
                    }
                    Some(Subscript::Star) => {
                        return Ok(WordPart::Parameter(ParameterExpansion {
                            parameter: name,
                            subscript: None,
                            operation: Some(ParamOperation::ArrayKeys { star: true }),
                        }));
                    }
                    other => {
                        return Ok(WordPart::Parameter(ParameterExpansion {
                            parameter: name,
                            subscript: other,
                            operation: Some(ParamOperation::Indirect),
                        }));
                    }
                }
            }
        }
    }

    // Ordinary parameter, possibly subscripted, possibly with an operation.
    let (name, rest) = take_parameter(interior)
        .ok_or_else(|| ParseError::BadSubstitution { text: format!("${{{}}}", interior) })?;

    let (subscript, rest) = if rest.starts_with('[') {
        let close = find_subscript_end(rest)
            .ok_or_else(|| ParseError::BadSubstitution { text: format!("${{{}}}", interior) })?;
        let sub_text = &rest[1..close];
        let sub = match sub_text {
            "@" => Subscript::At,
            "*" => Subscript::Star,
            other => Subscript::Index(other.to_string()),
        };
        (Some(sub), &rest[close + 1..])
    } else {
        (None, rest)
    };

    if rest.is_empty() {
        return Ok(WordPart::Parameter(ParameterExpansion {
            parameter: name,
            subscript,
            operation: None,
        }));
    }

    let operation = parse_param_operation(rest)?;
    Ok(WordPart::Parameter(ParameterExpansion { parameter: name, subscript, operation: Some(operation) }))
}

fn parse_param_operation(rest: &str) -> Result<ParamOperation, ParseError> {
    let mut chars = rest.chars();
    let first = chars.next().unwrap();
    let remainder: String = chars.collect();

    match first {
        ':' => {
            // `:-`, `:=`, `:?`, `:+` check empty as well as unset; a bare
            // `:` introduces a substring.
            match remainder.chars().next() {
                Some('-') => Ok(ParamOperation::Default {
                    word: parse_word_fragment(&remainder[1..])?,
                    check_empty: true,
                }),
                Some('=') => Ok(ParamOperation::AssignDefault {
                    word: parse_word_fragment(&remainder[1..])?,
                    check_empty: true,
                }),
                Some('?') => Ok(ParamOperation::ErrorIfUnset {
                    word: if remainder.len() > 1 {
                        Some(parse_word_fragment(&remainder[1..])?)
                    } else {
                        None
                    },
                    check_empty: true,
                }),
                Some('+') => Ok(ParamOperation::Alternative {
                    word: parse_word_fragment(&remainder[1..])?,
                    check_empty: true,
                }),
                _ => {
                    let (offset_text, length_text) = split_substring(&remainder);
                    let offset = parse_arithmetic(&offset_text)?;
                    let length = match length_text {
                        Some(t) => Some(parse_arithmetic(&t)?),
                        None => None,
                    };
                    Ok(ParamOperation::Substring { offset, length })
                }
            }
        }
        '-' => Ok(ParamOperation::Default {
            word: parse_word_fragment(&remainder)?,
            check_empty: false,
        }),
        '=' => Ok(ParamOperation::AssignDefault {
            word: parse_word_fragment(&remainder)?,
            check_empty: false,
        }),
        '?' => Ok(ParamOperation::ErrorIfUnset {
            word: if remainder.is_empty() {
                None
            } else {
                Some(parse_word_fragment(&remainder)?)
            },
            check_empty: false,
        }),
        '+' => Ok(ParamOperation::Alternative {
            word: parse_word_fragment(&remainder)?,
            check_empty: false,
        }),
        '#' => {
            let (greedy, pattern) = if let Some(p) = remainder.strip_prefix('#') {
                (true, p)
            } else {
                (false, remainder.as_str())
            };
            Ok(ParamOperation::RemovePattern {
                pattern: parse_word_fragment(pattern)?,
                suffix: false,
                greedy,
            })
        }
        '%' => {
            let (greedy, pattern) = if let Some(p) = remainder.strip_prefix('%') {
                (true, p)
            } else {
                (false, remainder.as_str())
            };
            Ok(ParamOperation::RemovePattern {
                pattern: parse_word_fragment(pattern)?,
                suffix: true,
                greedy,
            })
        }
        '/' => {
            let (all, rest) = if let Some(r) = remainder.strip_prefix('/') {
                (true, r.to_string())
            } else {
                (false, remainder)
            };
            let (anchor, rest) = if !all {
                if let Some(r) = rest.strip_prefix('#') {
                    (Some(PatternAnchor::Start), r.to_string())
                } else if let Some(r) = rest.strip_prefix('%') {
                    (Some(PatternAnchor::End), r.to_string())
                } else {
                    (None, rest)
                }
            } else {
                (None, rest)
            };

            let (pattern_text, replacement_text) = split_replacement(&rest);
            let replacement = match replacement_text {
                Some(t) => Some(parse_word_fragment(&t)?),
                None => None,
            };
            Ok(ParamOperation::ReplacePattern {
                pattern: parse_word_fragment(&pattern_text)?,
                replacement,
                all,
                anchor,
            })
        }
        '^' => {
            let all = remainder.starts_with('^');
            Ok(ParamOperation::CaseConvert { upper: true, all })
        }
        ',' => {
            let all = remainder.starts_with(',');
            Ok(ParamOperation::CaseConvert { upper: false, all })
        }
        _ => Err(ParseError::BadSubstitution { text: rest.to_string() }),
    }
}

/// Split a substring spec `off` / `off:len` at the top-level colon,
/// respecting parentheses so `$((a:b))`-style ternaries survive.
fn split_substring(text: &str) -> (String, Option<String>) {
    let mut depth = 0i32;
    let mut question = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '?' => question += 1,
            ':' if depth == 0 && question > 0 => question -= 1,
            ':' if depth == 0 => {
                return (text[..i].to_string(), Some(text[i + 1..].to_string()));
            }
            _ => {}
        }
    }
    (text.to_string(), None)
}

/// Split `pat/replacement` on the first unescaped `/`.
fn split_replacement(text: &str) -> (String, Option<String>) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_bracket = false;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            '/' if !in_bracket => {
                let pat: String = chars[..i].iter().collect();
                let rep: String = chars[i + 1..].iter().collect();
                return (pat, Some(rep));
            }
            _ => {}
        }
        i += 1;
    }
    (text.to_string(), None)
}

fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_parameter(s: &str) -> bool {
    is_valid_name(s)
        || s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty()
        || matches!(s, "?" | "#" | "@" | "*" | "$" | "!" | "-" | "_")
}

/// Take a parameter name (or special/positional parameter) off the front.
fn take_parameter(text: &str) -> Option<(String, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;

    if first.is_ascii_alphabetic() || first == '_' {
        let mut end = text.len();
        for (i, c) in text.char_indices() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                end = i;
                break;
            }
        }
        return Some((text[..end].to_string(), &text[end..]));
    }
    if first.is_ascii_digit() {
        let mut end = text.len();
        for (i, c) in text.char_indices() {
            if !c.is_ascii_digit() {
                end = i;
                break;
            }
        }
        return Some((text[..end].to_string(), &text[end..]));
    }
    if matches!(first, '?' | '#' | '@' | '*' | '$' | '!' | '-' | '_') {
        return Some((first.to_string(), &text[first.len_utf8()..]));
    }
    None
}

/// For `${#name[sub]}` / `${!name[sub]}`: name plus optional subscript and
/// nothing else.
fn split_subscript(text: &str) -> Result<(String, Option<Subscript>), ParseError> {
    let (name, rest) = take_parameter(text)
        .ok_or_else(|| ParseError::BadSubstitution { text: text.to_string() })?;
    if rest.is_empty() {
        return Ok((name, None));
    }
    if rest.starts_with('[') {
        if let Some(close) = find_subscript_end(rest) {
            let sub_text = &rest[1..close];
            let sub = match sub_text {
                "@" => Subscript::At,
                "*" => Subscript::Star,
                other => Subscript::Index(other.to_string()),
            };
            return Ok((name, Some(sub)));
        }
    }
    Ok((name, None))
}

fn subscript_only(text: &str, name: &str) -> bool {
    let rest = &text[name.len()..];
    rest.is_empty() || (rest.starts_with('[') && rest.ends_with(']'))
}

fn find_subscript_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode `$'…'` escapes.
fn decode_ansi_c(raw: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let c = chars[i];
        i += 1;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'e' | 'E' => out.push('\x1b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '0'..='7' => {
                let mut value = c.to_digit(8).unwrap();
                let mut count = 1;
                while count < 3 && i < chars.len() {
                    if let Some(d) = chars[i].to_digit(8) {
                        value = value * 8 + d;
                        i += 1;
                        count += 1;
                    } else {
                        break;
                    }
                }
                if let Some(decoded) = char::from_u32(value) {
                    out.push(decoded);
                }
            }
            'x' => {
                let mut value = 0u32;
                let mut count = 0;
                while count < 2 && i < chars.len() {
                    if let Some(d) = chars[i].to_digit(16) {
                        value = value * 16 + d;
                        i += 1;
                        count += 1;
                    } else {
                        break;
                    }
                }
                if count == 0 {
                    out.push('\\');
                    out.push('x');
                } else if let Some(decoded) = char::from_u32(value) {
                    out.push(decoded);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
