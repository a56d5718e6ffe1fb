//! Token and error types shared by the lexer and parser.

use thiserror::Error;

/// Operator tokens recognized by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Pipe,       // |
    AndAnd,     // &&
    OrOr,       // ||
    Amp,        // &
    Semi,       // ;
    DSemi,      // ;;
    SemiAmp,    // ;&
    DSemiAmp,   // ;;&
    LParen,     // (
    RParen,     // )
    Less,       // <
    Great,      // >
    DGreat,     // >>
    LessGreat,  // <>
    Clobber,    // >|
    GreatAnd,   // >&
    LessAnd,    // <&
    AndGreat,   // &>
    AndDGreat,  // &>>
    DLess,      // <<
    DLessDash,  // <<-
    TLess,      // <<<
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "|",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Amp => "&",
            Self::Semi => ";",
            Self::DSemi => ";;",
            Self::SemiAmp => ";&",
            Self::DSemiAmp => ";;&",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Less => "<",
            Self::Great => ">",
            Self::DGreat => ">>",
            Self::LessGreat => "<>",
            Self::Clobber => ">|",
            Self::GreatAnd => ">&",
            Self::LessAnd => "<&",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::DLess => "<<",
            Self::DLessDash => "<<-",
            Self::TLess => "<<<",
        }
    }

    pub fn is_redirection(self) -> bool {
        matches!(
            self,
            Self::Less
                | Self::Great
                | Self::DGreat
                | Self::LessGreat
                | Self::Clobber
                | Self::GreatAnd
                | Self::LessAnd
                | Self::AndGreat
                | Self::AndDGreat
                | Self::DLess
                | Self::DLessDash
                | Self::TLess
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A word, raw text with quoting intact. The word parser recovers the
    /// quoting structure.
    Word,
    /// A digit sequence immediately preceding `<` or `>` (the fd of a
    /// redirection, e.g. the `2` of `2>&1`).
    IoNumber,
    Operator(Operator),
    /// A complete `(( … ))` arithmetic command; `text` is the inner
    /// expression without the parens.
    ArithCommand,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn is_word(&self, s: &str) -> bool {
        self.kind == TokenKind::Word && self.text == s
    }

    pub fn is_operator(&self, op: Operator) -> bool {
        self.kind == TokenKind::Operator(op)
    }
}

/// Heredoc body captured by the lexer, keyed to its redirection by order
/// of appearance on the line.
#[derive(Debug, Clone, PartialEq)]
pub struct HereDocBody {
    pub delimiter: String,
    pub body: String,
    /// False when the delimiter was quoted.
    pub expand: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("syntax error near unexpected token `{token}' (line {line})")]
    UnexpectedToken { token: String, line: usize },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unclosed '{construct}' block (missing '{expected}')")]
    UnclosedBlock { construct: &'static str, expected: &'static str },
    #[error("unterminated quoted string (line {line}, column {column})")]
    UnterminatedQuote { line: usize, column: usize },
    #[error("unterminated `{construct}` (line {line}, column {column})")]
    UnterminatedExpansion { construct: &'static str, line: usize, column: usize },
    #[error("here-document delimited by end-of-file (wanted `{delimiter}')")]
    UnterminatedHereDoc { delimiter: String },
    #[error("{message} (line {line})")]
    Invalid { message: String, line: usize },
    #[error("bad substitution: `{text}'")]
    BadSubstitution { text: String },
    #[error("arithmetic syntax error near `{token}'")]
    Arithmetic { token: String },
}

impl ParseError {
    /// True when more input could complete the construct. Interactive mode
    /// switches to the continuation prompt instead of reporting an error.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ParseError::UnexpectedEof
                | ParseError::UnclosedBlock { .. }
                | ParseError::UnterminatedQuote { .. }
                | ParseError::UnterminatedExpansion { .. }
                | ParseError::UnterminatedHereDoc { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_classification() {
        assert!(ParseError::UnexpectedEof.is_incomplete());
        assert!(ParseError::UnclosedBlock { construct: "if", expected: "fi" }.is_incomplete());
        assert!(!ParseError::UnexpectedToken { token: ")".into(), line: 1 }.is_incomplete());
    }

    #[test]
    fn operator_classification() {
        assert!(Operator::DLess.is_redirection());
        assert!(!Operator::Pipe.is_redirection());
        assert_eq!(Operator::AndDGreat.as_str(), "&>>");
    }
}
