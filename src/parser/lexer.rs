//! Lexer: raw input → token stream.
//!
//! Words are accumulated as raw text with quoting intact; the word parser
//! recovers the structure later. The lexer tracks balanced `$( )`, `${ }`,
//! `$(( ))` and backtick contexts so operators inside them are not treated
//! as operators, captures here-document bodies, and handles line
//! continuations and comments.

use super::types::{HereDocBody, Operator, ParseError, Token, TokenKind};

/// Characters that terminate an unquoted word.
fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>')
}

struct PendingHereDoc {
    delimiter: String,
    strip_tabs: bool,
    expand: bool,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHereDoc>,
    heredoc_bodies: Vec<HereDocBody>,
    /// Inside `[[ … ]]`, where `<`, `>`, `(`, `)` compare rather than
    /// redirect or group.
    in_cond: bool,
}

/// Tokenize a complete input. Returns the token stream (terminated by Eof)
/// and the captured here-document bodies in order of appearance.
pub fn tokenize(input: &str) -> Result<(Vec<Token>, Vec<HereDocBody>), ParseError> {
    let mut lexer = Lexer {
        chars: input.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
        pending_heredocs: Vec::new(),
        heredoc_bodies: Vec::new(),
        in_cond: false,
    };
    lexer.run()?;
    Ok((lexer.tokens, lexer.heredoc_bodies))
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn push_token(&mut self, kind: TokenKind, text: String, line: usize, column: usize) {
        self.tokens.push(Token { kind, text, line, column });
    }

    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_blanks();

            let line = self.line;
            let column = self.column;
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            // Comments run to end of line. Only at word start, which is
            // guaranteed here because words consume greedily below.
            if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            if c == '\n' {
                self.advance();
                self.collect_heredoc_bodies()?;
                self.push_token(TokenKind::Newline, "\n".to_string(), line, column);
                continue;
            }

            if self.in_cond && matches!(c, '<' | '>' | '(' | ')') {
                self.advance();
                self.push_token(TokenKind::Word, c.to_string(), line, column);
                continue;
            }

            if let Some(op) = self.try_operator()? {
                if matches!(op, Operator::DLess | Operator::DLessDash) {
                    self.push_token(
                        TokenKind::Operator(op),
                        op.as_str().to_string(),
                        line,
                        column,
                    );
                    self.register_heredoc(op == Operator::DLessDash)?;
                    continue;
                }
                self.push_token(TokenKind::Operator(op), op.as_str().to_string(), line, column);
                continue;
            }

            // Arithmetic command `(( … ))`, only where a command can start.
            if c == '(' && self.peek_at(1) == Some('(') && self.arith_position() {
                if let Some(inner) = self.try_scan_arith_command() {
                    self.push_token(TokenKind::ArithCommand, inner, line, column);
                    continue;
                }
            }

            if c == '(' {
                self.advance();
                self.push_token(TokenKind::Operator(Operator::LParen), "(".into(), line, column);
                continue;
            }
            if c == ')' {
                self.advance();
                self.push_token(TokenKind::Operator(Operator::RParen), ")".into(), line, column);
                continue;
            }

            let word = self.scan_word()?;
            if word.is_empty() {
                // Lone backslash-newline; nothing was produced.
                continue;
            }

            // Digits glued to a redirection operator are an fd number.
            if word.chars().all(|c| c.is_ascii_digit())
                && matches!(self.peek(), Some('<') | Some('>'))
                && !self.in_cond
            {
                self.push_token(TokenKind::IoNumber, word, line, column);
                continue;
            }

            if word == "[[" {
                self.in_cond = true;
            } else if word == "]]" {
                self.in_cond = false;
            }

            self.push_token(TokenKind::Word, word, line, column);
        }

        if let Some(pending) = self.pending_heredocs.first() {
            return Err(ParseError::UnterminatedHereDoc {
                delimiter: pending.delimiter.clone(),
            });
        }

        let line = self.line;
        let column = self.column;
        self.push_token(TokenKind::Eof, String::new(), line, column);
        Ok(())
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => {
                    self.advance();
                }
                // Line continuation.
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// True when the previous token allows a command to start here.
    fn arith_position(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(tok) => match &tok.kind {
                TokenKind::Newline => true,
                TokenKind::Operator(op) => !op.is_redirection(),
                TokenKind::Word => {
                    matches!(
                        tok.text.as_str(),
                        "if" | "then" | "elif" | "else" | "while" | "until" | "do" | "for"
                            | "!" | "{" | "time"
                    )
                }
                _ => false,
            },
        }
    }

    /// Try to scan `(( … ))` as one balanced token. Returns the inner text,
    /// or None (position unchanged) when the parens do not close as a pair.
    fn try_scan_arith_command(&mut self) -> Option<String> {
        let start = self.pos;
        let (start_line, start_column) = (self.line, self.column);

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
                        // Final pair must close together: strip the first
                        // `)` that was pushed when depth hit 1.
                        if inner.ends_with(')') {
                            inner.pop();
                            return Some(inner);
                        }
                        break;
                    }
                    inner.push(c);
                }
                _ => inner.push(c),
            }
        }

        self.pos = start;
        self.line = start_line;
        self.column = start_column;
        None
    }

    fn try_operator(&mut self) -> Result<Option<Operator>, ParseError> {
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };
        let c1 = self.peek_at(1);
        let c2 = self.peek_at(2);

        let (op, len) = match c {
            '|' if c1 == Some('|') => (Operator::OrOr, 2),
            '|' => (Operator::Pipe, 1),
            '&' if c1 == Some('&') => (Operator::AndAnd, 2),
            '&' if c1 == Some('>') && c2 == Some('>') => (Operator::AndDGreat, 3),
            '&' if c1 == Some('>') => (Operator::AndGreat, 2),
            '&' => (Operator::Amp, 1),
            ';' if c1 == Some(';') && c2 == Some('&') => (Operator::DSemiAmp, 3),
            ';' if c1 == Some(';') => (Operator::DSemi, 2),
            ';' if c1 == Some('&') => (Operator::SemiAmp, 2),
            ';' => (Operator::Semi, 1),
            '<' if c1 == Some('<') && c2 == Some('<') => (Operator::TLess, 3),
            '<' if c1 == Some('<') && c2 == Some('-') => (Operator::DLessDash, 3),
            '<' if c1 == Some('<') => (Operator::DLess, 2),
            '<' if c1 == Some('&') => (Operator::LessAnd, 2),
            '<' if c1 == Some('>') => (Operator::LessGreat, 2),
            '<' => (Operator::Less, 1),
            '>' if c1 == Some('>') => (Operator::DGreat, 2),
            '>' if c1 == Some('&') => (Operator::GreatAnd, 2),
            '>' if c1 == Some('|') => (Operator::Clobber, 2),
            '>' => (Operator::Great, 1),
            _ => return Ok(None),
        };

        for _ in 0..len {
            self.advance();
        }
        Ok(Some(op))
    }

    /// After `<<`/`<<-`: read the delimiter word and queue the body for
    /// capture at the next newline.
    fn register_heredoc(&mut self, strip_tabs: bool) -> Result<(), ParseError> {
        self.skip_blanks();
        let line = self.line;
        let column = self.column;
        let raw = self.scan_word()?;
        if raw.is_empty() {
            return Err(ParseError::Invalid {
                message: "missing here-document delimiter".to_string(),
                line,
            });
        }

        // A quoted delimiter suppresses expansion of the body.
        let mut delimiter = String::new();
        let mut quoted = false;
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\'' | '"' => {
                    quoted = true;
                    let quote = c;
                    for inner in chars.by_ref() {
                        if inner == quote {
                            break;
                        }
                        delimiter.push(inner);
                    }
                }
                '\\' => {
                    quoted = true;
                    if let Some(next) = chars.next() {
                        delimiter.push(next);
                    }
                }
                _ => delimiter.push(c),
            }
        }

        self.push_token(TokenKind::Word, raw, line, column);
        self.pending_heredocs.push(PendingHereDoc {
            delimiter,
            strip_tabs,
            expand: !quoted,
        });
        Ok(())
    }

    /// Consume heredoc bodies queued on the line that just ended.
    fn collect_heredoc_bodies(&mut self) -> Result<(), ParseError> {
        let pending: Vec<PendingHereDoc> = self.pending_heredocs.drain(..).collect();
        for heredoc in pending {
            let mut body = String::new();
            let mut terminated = false;

            while self.pos < self.chars.len() {
                // Read one raw line.
                let mut line_text = String::new();
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                    line_text.push(c);
                }

                let check: &str = if heredoc.strip_tabs {
                    line_text.trim_start_matches('\t')
                } else {
                    line_text.as_str()
                };
                if check == heredoc.delimiter {
                    terminated = true;
                    break;
                }

                if heredoc.strip_tabs {
                    body.push_str(line_text.trim_start_matches('\t'));
                } else {
                    body.push_str(&line_text);
                }
                body.push('\n');
            }

            if !terminated {
                return Err(ParseError::UnterminatedHereDoc {
                    delimiter: heredoc.delimiter,
                });
            }

            self.heredoc_bodies.push(HereDocBody {
                delimiter: heredoc.delimiter,
                body,
                expand: heredoc.expand,
            });
        }
        Ok(())
    }

    /// Scan one word, raw, with quoting and balanced expansions intact.
    fn scan_word(&mut self) -> Result<String, ParseError> {
        let mut word = String::new();

        while let Some(c) = self.peek() {
            match c {
                _ if is_metachar(c) => break,
                '\\' => {
                    self.advance();
                    match self.advance() {
                        // Line continuation disappears entirely.
                        Some('\n') => {}
                        Some(next) => {
                            word.push('\\');
                            word.push(next);
                        }
                        None => word.push('\\'),
                    }
                }
                '\'' => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    word.push('\'');
                    let mut closed = false;
                    while let Some(c) = self.advance() {
                        word.push(c);
                        if c == '\'' {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(ParseError::UnterminatedQuote { line, column });
                    }
                }
                '"' => {
                    self.scan_double_quoted(&mut word)?;
                }
                '`' => {
                    self.scan_backtick(&mut word)?;
                }
                '$' => {
                    self.scan_dollar(&mut word)?;
                }
                _ => {
                    self.advance();
                    word.push(c);
                }
            }
        }

        Ok(word)
    }

    fn scan_double_quoted(&mut self, out: &mut String) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        out.push('"');

        while let Some(c) = self.peek() {
            match c {
                '"' => {
                    self.advance();
                    out.push('"');
                    return Ok(());
                }
                '\\' => {
                    self.advance();
                    out.push('\\');
                    if let Some(next) = self.advance() {
                        out.push(next);
                    }
                }
                '`' => self.scan_backtick(out)?,
                '$' => self.scan_dollar(out)?,
                _ => {
                    self.advance();
                    out.push(c);
                }
            }
        }

        Err(ParseError::UnterminatedQuote { line, column })
    }

    fn scan_backtick(&mut self, out: &mut String) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        out.push('`');

        while let Some(c) = self.advance() {
            out.push(c);
            match c {
                '`' => return Ok(()),
                '\\' => {
                    if let Some(next) = self.advance() {
                        out.push(next);
                    }
                }
                _ => {}
            }
        }

        Err(ParseError::UnterminatedExpansion { construct: "`", line, column })
    }

    /// Scan `$`-introduced constructs, keeping balanced delimiters whole:
    /// `$(…)`, `$((…))`, `${…}`, `$'…'`, `$"…"`. A lone `$` is literal.
    fn scan_dollar(&mut self, out: &mut String) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        out.push('$');

        match self.peek() {
            Some('(') => {
                // $(( )) is scanned like $( ) — balanced parens either way.
                self.advance();
                out.push('(');
                self.scan_balanced_parens(out, line, column)
            }
            Some('{') => {
                self.advance();
                out.push('{');
                self.scan_balanced_braces(out, line, column)
            }
            Some('\'') => {
                self.advance();
                out.push('\'');
                // ANSI-C quoting: backslash escapes the closing quote.
                while let Some(c) = self.advance() {
                    out.push(c);
                    match c {
                        '\'' => return Ok(()),
                        '\\' => {
                            if let Some(next) = self.advance() {
                                out.push(next);
                            }
                        }
                        _ => {}
                    }
                }
                Err(ParseError::UnterminatedQuote { line, column })
            }
            Some('"') => self.scan_double_quoted(out),
            _ => Ok(()),
        }
    }

    fn scan_balanced_parens(
        &mut self,
        out: &mut String,
        line: usize,
        column: usize,
    ) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => {
                    self.advance();
                    out.push('(');
                    depth += 1;
                }
                ')' => {
                    self.advance();
                    out.push(')');
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                '\'' => {
                    self.advance();
                    out.push('\'');
                    let mut closed = false;
                    while let Some(inner) = self.advance() {
                        out.push(inner);
                        if inner == '\'' {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(ParseError::UnterminatedQuote { line, column });
                    }
                }
                '"' => self.scan_double_quoted(out)?,
                '`' => self.scan_backtick(out)?,
                '\\' => {
                    self.advance();
                    out.push('\\');
                    if let Some(next) = self.advance() {
                        out.push(next);
                    }
                }
                '#' => {
                    // Comment inside command substitution.
                    while let Some(inner) = self.peek() {
                        if inner == '\n' {
                            break;
                        }
                        self.advance();
                        out.push(inner);
                    }
                }
                _ => {
                    self.advance();
                    out.push(c);
                }
            }
        }
        Err(ParseError::UnterminatedExpansion { construct: "$(", line, column })
    }

    fn scan_balanced_braces(
        &mut self,
        out: &mut String,
        line: usize,
        column: usize,
    ) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '{' => {
                    self.advance();
                    out.push('{');
                    depth += 1;
                }
                '}' => {
                    self.advance();
                    out.push('}');
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                '\'' => {
                    self.advance();
                    out.push('\'');
                    while let Some(inner) = self.advance() {
                        out.push(inner);
                        if inner == '\'' {
                            break;
                        }
                    }
                }
                '"' => self.scan_double_quoted(out)?,
                '`' => self.scan_backtick(out)?,
                '$' => self.scan_dollar(out)?,
                '\\' => {
                    self.advance();
                    out.push('\\');
                    if let Some(next) = self.advance() {
                        out.push(next);
                    }
                }
                _ => {
                    self.advance();
                    out.push(c);
                }
            }
        }
        Err(ParseError::UnterminatedExpansion { construct: "${", line, column })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().0.into_iter().map(|t| t.kind).collect()
    }

    fn words(input: &str) -> Vec<String> {
        tokenize(input)
            .unwrap()
            .0
            .into_iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn simple_words_and_operators() {
        let (tokens, _) = tokenize("echo hello | wc -l").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["echo", "hello", "|", "wc", "-l", ""]);
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(
            kinds("a && b || c; d & e"),
            vec![
                TokenKind::Word,
                TokenKind::Operator(Operator::AndAnd),
                TokenKind::Word,
                TokenKind::Operator(Operator::OrOr),
                TokenKind::Word,
                TokenKind::Operator(Operator::Semi),
                TokenKind::Word,
                TokenKind::Operator(Operator::Amp),
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn io_number() {
        let (tokens, _) = tokenize("cmd 2>&1").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::IoNumber);
        assert_eq!(tokens[1].text, "2");
        assert_eq!(tokens[2].kind, TokenKind::Operator(Operator::GreatAnd));
    }

    #[test]
    fn quotes_kept_in_word() {
        assert_eq!(words("echo 'a b' \"c d\""), vec!["echo", "'a b'", "\"c d\""]);
    }

    #[test]
    fn operators_inside_substitution_not_operators() {
        assert_eq!(words("echo $(ls | wc -l)"), vec!["echo", "$(ls | wc -l)"]);
        assert_eq!(words("echo ${VAR:-a;b}"), vec!["echo", "${VAR:-a;b}"]);
    }

    #[test]
    fn comment_skipped() {
        let (tokens, _) = tokenize("echo hi # a comment\n").unwrap();
        let texts: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(texts, vec!["echo", "hi"]);
    }

    #[test]
    fn line_continuation_joins_words() {
        assert_eq!(words("echo ab\\\ncd"), vec!["echo", "abcd"]);
    }

    #[test]
    fn unterminated_quote_is_incomplete() {
        let err = tokenize("echo 'abc").unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn heredoc_body_captured() {
        let (tokens, bodies) = tokenize("cat <<EOF\nline one\nline two\nEOF\n").unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].body, "line one\nline two\n");
        assert!(bodies[0].expand);
        assert!(tokens.iter().any(|t| t.is_word("EOF")));
    }

    #[test]
    fn heredoc_quoted_delimiter_no_expand() {
        let (_, bodies) = tokenize("cat <<'EOF'\n$HOME\nEOF\n").unwrap();
        assert!(!bodies[0].expand);
        assert_eq!(bodies[0].body, "$HOME\n");
    }

    #[test]
    fn heredoc_dash_strips_tabs() {
        let (_, bodies) = tokenize("cat <<-EOF\n\tindented\n\tEOF\n").unwrap();
        assert_eq!(bodies[0].body, "indented\n");
    }

    #[test]
    fn heredoc_unterminated() {
        let err = tokenize("cat <<EOF\nno end\n").unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedHereDoc { .. }));
        assert!(err.is_incomplete());
    }

    #[test]
    fn arith_command_token() {
        let (tokens, _) = tokenize("((x + 1))").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ArithCommand);
        assert_eq!(tokens[0].text, "x + 1");
    }

    #[test]
    fn nested_subshell_not_arith() {
        let (tokens, _) = tokenize("( (echo a) ; echo b )").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Operator(Operator::LParen));
    }

    #[test]
    fn cond_mode_words() {
        let texts = words("[[ a < b ]]");
        assert_eq!(texts, vec!["[[", "a", "<", "b", "]]"]);
    }
}
