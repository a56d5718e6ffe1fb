//! Parser: token stream → `Script`.
//!
//! Recursive descent over the lexer's tokens. Statements are and-or lists of
//! pipelines; `;`, `&` and newlines separate statements. Compound commands
//! (if/while/until/for/case, subshells, groups, `[[`, `((`) and function
//! definitions are recognized at command position.

use std::collections::VecDeque;

use crate::ast::{
    ArithmeticCommand, Assignment, BlockCommand, CStyleForCommand, CaseCommand, CaseItem,
    CaseTerminator, ChainOperator, Command, CompoundCommand, CondBinaryOp, CondExpr, CondUnaryOp,
    ConditionalCommand, ForCommand, FunctionDef, HereDoc, IfCommand, LoopCommand, Pipeline,
    RedirOperator, RedirTarget, Redirection, Script, SimpleCommand, Statement, Word,
};

use super::arith_parser::parse_arithmetic;
use super::lexer::tokenize;
use super::types::{HereDocBody, Operator, ParseError, Token, TokenKind};
use super::word_parser::{parse_heredoc_body, parse_word};

/// Words that terminate a statement list when they appear at command
/// position.
const RESERVED_TERMINATORS: &[&str] =
    &["then", "elif", "else", "fi", "do", "done", "esac", "}", "in"];

/// Parse a complete input into a `Script`.
pub fn parse(input: &str) -> Result<Script, ParseError> {
    let (tokens, heredocs) = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0, heredocs: heredocs.into() };
    parser.parse_script()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    heredocs: VecDeque<HereDocBody>,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    /// Consume a specific reserved word, or report the enclosing block as
    /// unclosed (at EOF) / the token as unexpected.
    fn expect_word(
        &mut self,
        word: &'static str,
        construct: &'static str,
    ) -> Result<(), ParseError> {
        self.skip_newlines();
        if self.at_eof() {
            return Err(ParseError::UnclosedBlock { construct, expected: word });
        }
        let token = self.peek().clone();
        if token.is_word(word) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken { token: token.text, line: token.line })
        }
    }

    fn parse_script(&mut self) -> Result<Script, ParseError> {
        let statements = self.parse_statement_list(&[])?;
        self.skip_newlines();
        if !self.at_eof() {
            let token = self.peek().clone();
            return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
        }
        Ok(Script { statements })
    }

    /// Parse statements until EOF, a stop word at command position, or a
    /// structural operator (`)`, `;;`, `;&`, `;;&`) the caller handles.
    fn parse_statement_list(&mut self, stop: &[&str]) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();

        loop {
            self.skip_newlines();
            let token = self.peek();
            match &token.kind {
                TokenKind::Eof => break,
                TokenKind::Operator(Operator::RParen)
                | TokenKind::Operator(Operator::DSemi)
                | TokenKind::Operator(Operator::SemiAmp)
                | TokenKind::Operator(Operator::DSemiAmp) => break,
                TokenKind::Word if stop.contains(&token.text.as_str()) => break,
                TokenKind::Word if RESERVED_TERMINATORS.contains(&token.text.as_str()) => {
                    // A terminator we were not asked to stop at is a syntax
                    // error, caught by the enclosing construct.
                    break;
                }
                _ => {}
            }
            statements.push(self.parse_statement()?);
        }

        Ok(statements)
    }

    /// One and-or list plus its terminator.
    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.pos;
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut operators = Vec::new();

        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(Operator::AndAnd) => ChainOperator::And,
                TokenKind::Operator(Operator::OrOr) => ChainOperator::Or,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            operators.push(op);
            pipelines.push(self.parse_pipeline()?);
        }

        let mut background = false;
        match self.peek().kind {
            TokenKind::Operator(Operator::Amp) => {
                background = true;
                self.advance();
            }
            TokenKind::Operator(Operator::Semi) => {
                self.advance();
            }
            // A command can only be followed by a separator or a closing
            // construct; `echo foo (bar)` is a syntax error, not two
            // statements.
            TokenKind::Operator(Operator::LParen) | TokenKind::ArithCommand => {
                let token = self.peek().clone();
                return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
            }
            _ => {}
        }

        let source_text = self.reconstruct_source(start);
        Ok(Statement { pipelines, operators, background, source_text: Some(source_text) })
    }

    fn reconstruct_source(&self, start: usize) -> String {
        let mut out = String::new();
        let mut glue_next = false;
        for token in &self.tokens[start..self.pos] {
            match token.kind {
                TokenKind::Newline | TokenKind::Eof => continue,
                TokenKind::ArithCommand => {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str("((");
                    out.push_str(&token.text);
                    out.push_str("))");
                    glue_next = false;
                }
                _ => {
                    if !out.is_empty() && !glue_next {
                        out.push(' ');
                    }
                    out.push_str(&token.text);
                    // An fd number binds to the operator that follows it:
                    // `2>&1` must not round-trip as `2 >& 1`.
                    glue_next = token.kind == TokenKind::IoNumber;
                }
            }
        }
        out
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut negated = false;
        while self.peek().is_word("!") {
            negated = !negated;
            self.advance();
        }

        let mut commands = vec![self.parse_command()?];
        while self.peek().kind == TokenKind::Operator(Operator::Pipe) {
            self.advance();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }

        Ok(Pipeline { commands, negated })
    }

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let token = self.peek().clone();

        match &token.kind {
            TokenKind::ArithCommand => {
                self.advance();
                let expression = parse_arithmetic(&token.text)?;
                let redirections = self.parse_trailing_redirections()?;
                return Ok(Command::Compound(CompoundCommand::Arithmetic(ArithmeticCommand {
                    expression,
                    redirections,
                })));
            }
            TokenKind::Operator(Operator::LParen) => {
                self.advance();
                let body = self.parse_statement_list(&[])?;
                self.close_paren("(")?;
                let redirections = self.parse_trailing_redirections()?;
                return Ok(Command::Compound(CompoundCommand::Subshell(BlockCommand {
                    body,
                    redirections,
                })));
            }
            TokenKind::Word => match token.text.as_str() {
                "if" => return self.parse_if().map(Command::Compound),
                "while" => return self.parse_loop(false).map(Command::Compound),
                "until" => return self.parse_loop(true).map(Command::Compound),
                "for" => return self.parse_for().map(Command::Compound),
                "case" => return self.parse_case().map(Command::Compound),
                "{" => {
                    self.advance();
                    let body = self.parse_statement_list(&["}"])?;
                    self.expect_word("}", "{")?;
                    let redirections = self.parse_trailing_redirections()?;
                    return Ok(Command::Compound(CompoundCommand::Group(BlockCommand {
                        body,
                        redirections,
                    })));
                }
                "[[" => return self.parse_conditional().map(Command::Compound),
                "function" => return self.parse_function_keyword().map(Command::FunctionDef),
                _ => {
                    // `name () body` function definition.
                    if is_function_name(&token.text)
                        && matches!(
                            self.peek_at(1).map(|t| &t.kind),
                            Some(TokenKind::Operator(Operator::LParen))
                        )
                        && matches!(
                            self.peek_at(2).map(|t| &t.kind),
                            Some(TokenKind::Operator(Operator::RParen))
                        )
                    {
                        return self.parse_function_parens().map(Command::FunctionDef);
                    }
                }
            },
            _ => {}
        }

        self.parse_simple_command().map(Command::Simple)
    }

    fn close_paren(&mut self, construct: &'static str) -> Result<(), ParseError> {
        self.skip_newlines();
        if self.at_eof() {
            return Err(ParseError::UnclosedBlock { construct, expected: ")" });
        }
        let token = self.peek().clone();
        if token.kind == TokenKind::Operator(Operator::RParen) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken { token: token.text, line: token.line })
        }
    }

    // ------------------------------------------------------------------
    // Simple commands
    // ------------------------------------------------------------------

    fn parse_simple_command(&mut self) -> Result<SimpleCommand, ParseError> {
        let line = self.peek().line;
        let mut assignments: Vec<Assignment> = Vec::new();
        let mut name: Option<Word> = None;
        let mut args: Vec<Word> = Vec::new();
        let mut redirections: Vec<Redirection> = Vec::new();

        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::IoNumber => {
                    let fd: i32 = token.text.parse().map_err(|_| ParseError::Invalid {
                        message: format!("bad file descriptor: {}", token.text),
                        line: token.line,
                    })?;
                    self.advance();
                    let redir = self.parse_redirection(Some(fd))?;
                    redirections.push(redir);
                }
                TokenKind::Operator(op) if op.is_redirection() => {
                    let redir = self.parse_redirection(None)?;
                    redirections.push(redir);
                }
                TokenKind::Word => {
                    if name.is_none() {
                        if let Some(assignment) = self.try_parse_assignment(&token)? {
                            assignments.push(assignment);
                            continue;
                        }
                    }
                    self.advance();
                    let word = parse_word(&token.text)?;
                    if name.is_none() {
                        name = Some(word);
                    } else {
                        args.push(word);
                    }
                }
                _ => break,
            }
        }

        if assignments.is_empty() && name.is_none() && redirections.is_empty() {
            let token = self.peek().clone();
            return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
        }

        Ok(SimpleCommand { assignments, name, args, redirections, line })
    }

    /// Recognize `NAME=…`, `NAME+=…`, `NAME[sub]=…` and `NAME=(…)` prefixes.
    fn try_parse_assignment(&mut self, token: &Token) -> Result<Option<Assignment>, ParseError> {
        let Some((name, subscript, append, value_text)) = split_assignment(&token.text) else {
            return Ok(None);
        };
        self.advance();

        // `NAME=` directly followed by `(` is an array literal.
        if value_text.is_empty()
            && self.peek().kind == TokenKind::Operator(Operator::LParen)
            && subscript.is_none()
        {
            self.advance();
            let mut elements = Vec::new();
            loop {
                self.skip_newlines();
                let token = self.peek().clone();
                match &token.kind {
                    TokenKind::Operator(Operator::RParen) => {
                        self.advance();
                        break;
                    }
                    TokenKind::Word | TokenKind::IoNumber => {
                        self.advance();
                        elements.push(parse_word(&token.text)?);
                    }
                    TokenKind::Eof => {
                        return Err(ParseError::UnclosedBlock {
                            construct: "array assignment",
                            expected: ")",
                        })
                    }
                    _ => {
                        return Err(ParseError::UnexpectedToken {
                            token: token.text,
                            line: token.line,
                        })
                    }
                }
            }
            return Ok(Some(Assignment {
                name,
                subscript: None,
                value: None,
                append,
                array: Some(elements),
            }));
        }

        let value = if value_text.is_empty() {
            None
        } else {
            Some(super::word_parser::parse_word_assign(&value_text)?)
        };
        Ok(Some(Assignment { name, subscript, value, append, array: None }))
    }

    // ------------------------------------------------------------------
    // Redirections
    // ------------------------------------------------------------------

    fn parse_redirection(&mut self, fd: Option<i32>) -> Result<Redirection, ParseError> {
        let token = self.advance();
        let op = match token.kind {
            TokenKind::Operator(op) if op.is_redirection() => op,
            _ => {
                return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
            }
        };

        let operator = match op {
            Operator::Less => RedirOperator::Less,
            Operator::Great => RedirOperator::Great,
            Operator::DGreat => RedirOperator::DGreat,
            Operator::LessGreat => RedirOperator::LessGreat,
            Operator::Clobber => RedirOperator::Clobber,
            Operator::GreatAnd => RedirOperator::GreatAnd,
            Operator::LessAnd => RedirOperator::LessAnd,
            Operator::AndGreat => RedirOperator::AndGreat,
            Operator::AndDGreat => RedirOperator::AndDGreat,
            Operator::DLess => RedirOperator::DLess,
            Operator::DLessDash => RedirOperator::DLessDash,
            Operator::TLess => RedirOperator::TLess,
            _ => unreachable!(),
        };

        // The delimiter word follows `<<`; the body was captured by the
        // lexer in order of appearance.
        if matches!(operator, RedirOperator::DLess | RedirOperator::DLessDash) {
            let delim_token = self.advance();
            if delim_token.kind != TokenKind::Word {
                return Err(ParseError::UnexpectedToken {
                    token: delim_token.text,
                    line: delim_token.line,
                });
            }
            let body = self.heredocs.pop_front().ok_or(ParseError::UnterminatedHereDoc {
                delimiter: delim_token.text.clone(),
            })?;
            let word = if body.expand {
                parse_heredoc_body(&body.body)?
            } else {
                Word { parts: vec![crate::ast::WordPart::SingleQuoted(body.body.clone())] }
            };
            return Ok(Redirection {
                fd,
                operator,
                target: RedirTarget::HereDoc(HereDoc {
                    delimiter: body.delimiter,
                    body: word,
                    expand: body.expand,
                }),
            });
        }

        let target_token = self.advance();
        if !matches!(target_token.kind, TokenKind::Word | TokenKind::IoNumber) {
            return Err(ParseError::UnexpectedToken {
                token: target_token.text,
                line: target_token.line,
            });
        }
        let word = parse_word(&target_token.text)?;
        Ok(Redirection { fd, operator, target: RedirTarget::Word(word) })
    }

    fn parse_trailing_redirections(&mut self) -> Result<Vec<Redirection>, ParseError> {
        let mut redirections = Vec::new();
        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::IoNumber => {
                    let fd: i32 = token.text.parse().unwrap_or(0);
                    self.advance();
                    redirections.push(self.parse_redirection(Some(fd))?);
                }
                TokenKind::Operator(op) if op.is_redirection() => {
                    redirections.push(self.parse_redirection(None)?);
                }
                _ => break,
            }
        }
        Ok(redirections)
    }

    // ------------------------------------------------------------------
    // Compound commands
    // ------------------------------------------------------------------

    fn parse_if(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // if
        let mut clauses = Vec::new();

        let condition = self.parse_statement_list(&["then"])?;
        self.expect_word("then", "if")?;
        let body = self.parse_statement_list(&["elif", "else", "fi"])?;
        clauses.push((condition, body));

        let mut else_body = None;
        loop {
            self.skip_newlines();
            let token = self.peek().clone();
            if token.is_word("elif") {
                self.advance();
                let condition = self.parse_statement_list(&["then"])?;
                self.expect_word("then", "elif")?;
                let body = self.parse_statement_list(&["elif", "else", "fi"])?;
                clauses.push((condition, body));
            } else if token.is_word("else") {
                self.advance();
                else_body = Some(self.parse_statement_list(&["fi"])?);
            } else if token.is_word("fi") {
                self.advance();
                break;
            } else if self.at_eof() {
                return Err(ParseError::UnclosedBlock { construct: "if", expected: "fi" });
            } else {
                return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
            }
        }

        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommand::If(IfCommand { clauses, else_body, redirections }))
    }

    fn parse_loop(&mut self, until: bool) -> Result<CompoundCommand, ParseError> {
        let construct = if until { "until" } else { "while" };
        self.advance();
        let condition = self.parse_statement_list(&["do"])?;
        self.expect_word("do", construct)?;
        let body = self.parse_statement_list(&["done"])?;
        self.expect_word("done", construct)?;
        let redirections = self.parse_trailing_redirections()?;

        let node = LoopCommand { condition, body, redirections };
        Ok(if until {
            CompoundCommand::Until(node)
        } else {
            CompoundCommand::While(node)
        })
    }

    fn parse_for(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // for

        // C-style header arrives as one ArithCommand token.
        if self.peek().kind == TokenKind::ArithCommand {
            let header = self.advance().text;
            let sections = split_top_level(&header, ';');
            if sections.len() != 3 {
                return Err(ParseError::Invalid {
                    message: "expected `for ((init; cond; step))'".to_string(),
                    line: self.peek().line,
                });
            }
            let parse_section = |text: &str| -> Result<Option<crate::ast::ArithExpr>, ParseError> {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    parse_arithmetic(trimmed).map(Some)
                }
            };
            let init = parse_section(&sections[0])?;
            let condition = parse_section(&sections[1])?;
            let update = parse_section(&sections[2])?;

            if self.peek().kind == TokenKind::Operator(Operator::Semi) {
                self.advance();
            }
            self.expect_word("do", "for")?;
            let body = self.parse_statement_list(&["done"])?;
            self.expect_word("done", "for")?;
            let redirections = self.parse_trailing_redirections()?;
            return Ok(CompoundCommand::CStyleFor(CStyleForCommand {
                init,
                condition,
                update,
                body,
                redirections,
            }));
        }

        let name_token = self.advance();
        if name_token.kind != TokenKind::Word || !is_function_name(&name_token.text) {
            return Err(ParseError::UnexpectedToken {
                token: name_token.text,
                line: name_token.line,
            });
        }
        let variable = name_token.text;

        self.skip_newlines();
        let mut words = None;
        if self.peek().is_word("in") {
            self.advance();
            let mut list = Vec::new();
            loop {
                let token = self.peek().clone();
                match &token.kind {
                    TokenKind::Word | TokenKind::IoNumber => {
                        self.advance();
                        list.push(parse_word(&token.text)?);
                    }
                    _ => break,
                }
            }
            words = Some(list);
        }

        if self.peek().kind == TokenKind::Operator(Operator::Semi) {
            self.advance();
        }
        self.expect_word("do", "for")?;
        let body = self.parse_statement_list(&["done"])?;
        self.expect_word("done", "for")?;
        let redirections = self.parse_trailing_redirections()?;

        Ok(CompoundCommand::For(ForCommand { variable, words, body, redirections }))
    }

    fn parse_case(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // case
        let subject_token = self.advance();
        if subject_token.kind != TokenKind::Word {
            return Err(ParseError::UnexpectedToken {
                token: subject_token.text,
                line: subject_token.line,
            });
        }
        let word = parse_word(&subject_token.text)?;

        self.expect_word("in", "case")?;

        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_eof() {
                return Err(ParseError::UnclosedBlock { construct: "case", expected: "esac" });
            }
            if self.peek().is_word("esac") {
                self.advance();
                break;
            }

            // Optional opening paren before the pattern list.
            if self.peek().kind == TokenKind::Operator(Operator::LParen) {
                self.advance();
            }

            let mut patterns = Vec::new();
            loop {
                let token = self.advance();
                if token.kind != TokenKind::Word {
                    return Err(ParseError::UnexpectedToken {
                        token: token.text,
                        line: token.line,
                    });
                }
                patterns.push(parse_word(&token.text)?);
                if self.peek().kind == TokenKind::Operator(Operator::Pipe) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.close_paren("case pattern")?;

            let body = self.parse_statement_list(&["esac"])?;

            let terminator = match self.peek().kind {
                TokenKind::Operator(Operator::DSemi) => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenKind::Operator(Operator::SemiAmp) => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenKind::Operator(Operator::DSemiAmp) => {
                    self.advance();
                    CaseTerminator::Continue
                }
                _ => CaseTerminator::Break,
            };

            items.push(CaseItem { patterns, body, terminator });
        }

        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommand::Case(CaseCommand { word, items, redirections }))
    }

    // ------------------------------------------------------------------
    // Conditional command [[ … ]]
    // ------------------------------------------------------------------

    fn parse_conditional(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // [[
        let expression = self.parse_cond_or()?;
        self.expect_word("]]", "[[")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(CompoundCommand::Conditional(ConditionalCommand { expression, redirections }))
    }

    fn parse_cond_or(&mut self) -> Result<CondExpr, ParseError> {
        let mut expr = self.parse_cond_and()?;
        loop {
            self.skip_newlines();
            if self.peek().kind == TokenKind::Operator(Operator::OrOr) {
                self.advance();
                self.skip_newlines();
                let rhs = self.parse_cond_and()?;
                expr = CondExpr::Or(Box::new(expr), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_cond_and(&mut self) -> Result<CondExpr, ParseError> {
        let mut expr = self.parse_cond_primary()?;
        loop {
            self.skip_newlines();
            if self.peek().kind == TokenKind::Operator(Operator::AndAnd) {
                self.advance();
                self.skip_newlines();
                let rhs = self.parse_cond_primary()?;
                expr = CondExpr::And(Box::new(expr), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_cond_primary(&mut self) -> Result<CondExpr, ParseError> {
        self.skip_newlines();
        let token = self.peek().clone();

        if self.at_eof() {
            return Err(ParseError::UnclosedBlock { construct: "[[", expected: "]]" });
        }
        if token.kind != TokenKind::Word {
            return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
        }

        if token.text == "!" {
            self.advance();
            let operand = self.parse_cond_primary()?;
            return Ok(CondExpr::Not(Box::new(operand)));
        }

        if token.text == "(" {
            self.advance();
            let inner = self.parse_cond_or()?;
            self.expect_word(")", "[[")?;
            return Ok(inner);
        }

        if let Some(op) = cond_unary_op(&token.text) {
            self.advance();
            let operand_token = self.advance();
            if operand_token.kind != TokenKind::Word {
                return Err(ParseError::UnexpectedToken {
                    token: operand_token.text,
                    line: operand_token.line,
                });
            }
            let operand = parse_word(&operand_token.text)?;
            return Ok(CondExpr::Unary(op, operand));
        }

        // Bare word, possibly followed by a binary operator.
        self.advance();
        let lhs = parse_word(&token.text)?;

        let next = self.peek().clone();
        if next.kind == TokenKind::Word {
            if let Some(op) = cond_binary_op(&next.text) {
                self.advance();
                let rhs_token = self.advance();
                if rhs_token.kind != TokenKind::Word {
                    return Err(ParseError::UnexpectedToken {
                        token: rhs_token.text,
                        line: rhs_token.line,
                    });
                }
                let rhs = parse_word(&rhs_token.text)?;
                return Ok(CondExpr::Binary(op, lhs, rhs));
            }
        }

        Ok(CondExpr::Word(lhs))
    }

    // ------------------------------------------------------------------
    // Function definitions
    // ------------------------------------------------------------------

    fn parse_function_keyword(&mut self) -> Result<FunctionDef, ParseError> {
        self.advance(); // function
        let name_token = self.advance();
        if name_token.kind != TokenKind::Word || !is_function_name(&name_token.text) {
            return Err(ParseError::UnexpectedToken {
                token: name_token.text,
                line: name_token.line,
            });
        }

        // Optional empty parens.
        if self.peek().kind == TokenKind::Operator(Operator::LParen)
            && self.peek_at(1).map(|t| &t.kind) == Some(&TokenKind::Operator(Operator::RParen))
        {
            self.advance();
            self.advance();
        }

        self.parse_function_body(name_token.text)
    }

    fn parse_function_parens(&mut self) -> Result<FunctionDef, ParseError> {
        let name_token = self.advance();
        self.advance(); // (
        self.advance(); // )
        self.parse_function_body(name_token.text)
    }

    fn parse_function_body(&mut self, name: String) -> Result<FunctionDef, ParseError> {
        self.skip_newlines();
        let body_command = self.parse_command()?;
        let body = match body_command {
            Command::Compound(compound) => compound,
            _ => {
                let token = self.peek().clone();
                return Err(ParseError::UnexpectedToken { token: token.text, line: token.line });
            }
        };
        let redirections = self.parse_trailing_redirections()?;
        Ok(FunctionDef { name, body: Box::new(body), redirections })
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn is_function_name(s: &str) -> bool {
    !s.is_empty()
        && !s.contains(['\'', '"', '$', '`', '\\', '='])
        && !s.starts_with('(')
}

fn cond_unary_op(s: &str) -> Option<CondUnaryOp> {
    Some(match s {
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

fn cond_binary_op(s: &str) -> Option<CondBinaryOp> {
    Some(match s {
        "=" | "==" => CondBinaryOp::Eq,
        "!=" => CondBinaryOp::Ne,
        "<" => CondBinaryOp::Lt,
        ">" => CondBinaryOp::Gt,
        "=~" => CondBinaryOp::Match,
        "-eq" => CondBinaryOp::NumEq,
        "-ne" => CondBinaryOp::NumNe,
        "-lt" => CondBinaryOp::NumLt,
        "-le" => CondBinaryOp::NumLe,
        "-gt" => CondBinaryOp::NumGt,
        "-ge" => CondBinaryOp::NumGe,
        "-nt" => CondBinaryOp::NewerThan,
        "-ot" => CondBinaryOp::OlderThan,
        "-ef" => CondBinaryOp::SameFile,
        _ => return None,
    })
}

/// Split `NAME…=value` at the assignment point. Returns
/// (name, subscript, append, value_text) or None when the word is not an
/// assignment.
fn split_assignment(text: &str) -> Option<(String, Option<String>, bool, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    match chars.first() {
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => {}
        _ => return None,
    }
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    let name: String = chars[..i].iter().collect();

    let mut subscript = None;
    if i < chars.len() && chars[i] == '[' {
        let mut depth = 0usize;
        let start = i;
        while i < chars.len() {
            match chars[i] {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if i >= chars.len() {
            return None;
        }
        subscript = Some(chars[start + 1..i].iter().collect());
        i += 1;
    }

    let append = i < chars.len() && chars[i] == '+';
    if append {
        i += 1;
    }

    if i >= chars.len() || chars[i] != '=' {
        return None;
    }
    i += 1;

    let value: String = chars[i..].iter().collect();
    Some((name, subscript, append, value))
}

/// Split on a separator at paren depth zero.
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == separator && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::WordPart;

    fn first_simple(script: &Script) -> &SimpleCommand {
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Simple(cmd) => cmd,
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn simple_command_with_args() {
        let script = parse("echo hello world").unwrap();
        let cmd = first_simple(&script);
        assert_eq!(cmd.name.as_ref().unwrap().as_literal(), Some("echo"));
        assert_eq!(cmd.args.len(), 2);
    }

    #[test]
    fn pipeline_and_chain() {
        let script = parse("a | b && c || d").unwrap();
        let stmt = &script.statements[0];
        assert_eq!(stmt.pipelines.len(), 3);
        assert_eq!(stmt.pipelines[0].commands.len(), 2);
        assert_eq!(stmt.operators, vec![ChainOperator::And, ChainOperator::Or]);
    }

    #[test]
    fn background_statement() {
        let script = parse("sleep 5 &").unwrap();
        assert!(script.statements[0].background);
    }

    #[test]
    fn semicolons_separate_statements() {
        let script = parse("a; b; c").unwrap();
        assert_eq!(script.statements.len(), 3);
    }

    #[test]
    fn negated_pipeline() {
        let script = parse("! false").unwrap();
        assert!(script.statements[0].pipelines[0].negated);
    }

    #[test]
    fn assignment_prefix() {
        let script = parse("VAR=value cmd arg").unwrap();
        let cmd = first_simple(&script);
        assert_eq!(cmd.assignments.len(), 1);
        assert_eq!(cmd.assignments[0].name, "VAR");
        assert_eq!(cmd.name.as_ref().unwrap().as_literal(), Some("cmd"));
    }

    #[test]
    fn assignment_only() {
        let script = parse("X=1 Y=2").unwrap();
        let cmd = first_simple(&script);
        assert_eq!(cmd.assignments.len(), 2);
        assert!(cmd.name.is_none());
    }

    #[test]
    fn append_and_subscript_assignment() {
        let script = parse("X+=more").unwrap();
        assert!(first_simple(&script).assignments[0].append);

        let script = parse("A[3]=x").unwrap();
        assert_eq!(first_simple(&script).assignments[0].subscript.as_deref(), Some("3"));
    }

    #[test]
    fn array_assignment() {
        let script = parse("A=(one two three)").unwrap();
        let cmd = first_simple(&script);
        assert_eq!(cmd.assignments[0].array.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn redirections_collected_in_order() {
        let script = parse("cmd >out 2>&1 <in").unwrap();
        let cmd = first_simple(&script);
        assert_eq!(cmd.redirections.len(), 3);
        assert_eq!(cmd.redirections[0].operator, RedirOperator::Great);
        assert_eq!(cmd.redirections[1].fd, Some(2));
        assert_eq!(cmd.redirections[1].operator, RedirOperator::GreatAnd);
        assert_eq!(cmd.redirections[2].operator, RedirOperator::Less);
    }

    #[test]
    fn heredoc_redirection() {
        let script = parse("cat <<EOF\nhello\nEOF\n").unwrap();
        let cmd = first_simple(&script);
        match &cmd.redirections[0].target {
            RedirTarget::HereDoc(doc) => {
                assert_eq!(doc.delimiter, "EOF");
                assert!(doc.expand);
            }
            other => panic!("expected heredoc, got {:?}", other),
        }
    }

    #[test]
    fn if_statement() {
        let script = parse("if true; then echo yes; fi").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::If(node)) => {
                assert_eq!(node.clauses.len(), 1);
                assert!(node.else_body.is_none());
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn if_elif_else() {
        let script = parse("if a; then b; elif c; then d; else e; fi").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::If(node)) => {
                assert_eq!(node.clauses.len(), 2);
                assert!(node.else_body.is_some());
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn unclosed_if_is_incomplete() {
        let err = parse("if true; then echo yes").unwrap_err();
        assert!(err.is_incomplete(), "got {:?}", err);
    }

    #[test]
    fn while_loop() {
        let script = parse("while false; do echo x; done").unwrap();
        assert!(matches!(
            &script.statements[0].pipelines[0].commands[0],
            Command::Compound(CompoundCommand::While(_))
        ));
    }

    #[test]
    fn for_loop() {
        let script = parse("for i in 1 2 3; do echo $i; done").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::For(node)) => {
                assert_eq!(node.variable, "i");
                assert_eq!(node.words.as_ref().unwrap().len(), 3);
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn for_without_in() {
        let script = parse("for arg; do echo $arg; done").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::For(node)) => assert!(node.words.is_none()),
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn c_style_for() {
        let script = parse("for ((i=0; i<3; i++)); do echo $i; done").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::CStyleFor(node)) => {
                assert!(node.init.is_some());
                assert!(node.condition.is_some());
                assert!(node.update.is_some());
            }
            other => panic!("expected c-style for, got {:?}", other),
        }
    }

    #[test]
    fn case_statement() {
        let script = parse("case foo in f*) echo match;; *) echo no;; esac").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::Case(node)) => {
                assert_eq!(node.items.len(), 2);
                assert_eq!(node.items[0].terminator, CaseTerminator::Break);
            }
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn case_fallthrough_terminators() {
        let script = parse("case x in a) echo a;& b) echo b;;& c) echo c;; esac").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::Case(node)) => {
                assert_eq!(node.items[0].terminator, CaseTerminator::FallThrough);
                assert_eq!(node.items[1].terminator, CaseTerminator::Continue);
            }
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn subshell_and_group() {
        let script = parse("(echo a; echo b)").unwrap();
        assert!(matches!(
            &script.statements[0].pipelines[0].commands[0],
            Command::Compound(CompoundCommand::Subshell(_))
        ));

        let script = parse("{ echo a; echo b; }").unwrap();
        assert!(matches!(
            &script.statements[0].pipelines[0].commands[0],
            Command::Compound(CompoundCommand::Group(_))
        ));
    }

    #[test]
    fn function_definitions() {
        let script = parse("greet() { echo hi; }").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::FunctionDef(def) => assert_eq!(def.name, "greet"),
            other => panic!("expected function, got {:?}", other),
        }

        let script = parse("function greet { echo hi; }").unwrap();
        assert!(matches!(
            &script.statements[0].pipelines[0].commands[0],
            Command::FunctionDef(_)
        ));
    }

    #[test]
    fn arithmetic_command() {
        let script = parse("((x > 3))").unwrap();
        assert!(matches!(
            &script.statements[0].pipelines[0].commands[0],
            Command::Compound(CompoundCommand::Arithmetic(_))
        ));
    }

    #[test]
    fn conditional_command() {
        let script = parse("[[ -f /etc/passwd && $x = yes ]]").unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Compound(CompoundCommand::Conditional(node)) => {
                assert!(matches!(&node.expression, CondExpr::And(_, _)));
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn unmatched_paren_reported() {
        let err = parse("echo )").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn command_substitution_word() {
        let script = parse("echo $(date)").unwrap();
        let cmd = first_simple(&script);
        assert!(matches!(&cmd.args[0].parts[0], WordPart::CommandSubst(_)));
    }

    #[test]
    fn source_text_reconstructed() {
        let script = parse("echo a | wc -c").unwrap();
        assert_eq!(script.statements[0].source_text.as_deref(), Some("echo a | wc -c"));
    }

    #[test]
    fn statement_round_trips_through_source_text() {
        for input in [
            "echo a b c",
            "cmd >out 2>&1 <in",
            "VAR=1 cmd --flag",
            "a | b && c || d",
            "! false",
        ] {
            let script = parse(input).unwrap();
            let rendered = script.statements[0].source_text.clone().unwrap();
            let reparsed = parse(&rendered).unwrap();
            assert_eq!(
                script.statements[0].pipelines, reparsed.statements[0].pipelines,
                "round-trip changed `{}` (rendered as `{}`)",
                input, rendered
            );
        }
    }
}
