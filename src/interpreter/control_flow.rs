//! Compound command execution: if/while/until/for/case, subshells,
//! groups, `((…))` and `[[…]]`.

use crate::ast::{
    BlockCommand, CaseCommand, CaseTerminator, CompoundCommand, CStyleForCommand, ForCommand,
    IfCommand, LoopCommand, Statement,
};

use super::arithmetic;
use super::errors::ExecError;
use super::executor::execute_statements;
use super::expansion::{expand_pattern_word, expand_word_single, expand_words};
use super::io::CommandIo;
use super::pattern::{self, MatchOptions};
use super::state::ShellState;
use super::test_expr;

pub fn execute_compound(
    state: &mut ShellState,
    compound: &CompoundCommand,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    match compound {
        CompoundCommand::If(node) => execute_if(state, node, io),
        CompoundCommand::While(node) => execute_loop(state, node, false, io),
        CompoundCommand::Until(node) => execute_loop(state, node, true, io),
        CompoundCommand::For(node) => execute_for(state, node, io),
        CompoundCommand::CStyleFor(node) => execute_c_for(state, node, io),
        CompoundCommand::Case(node) => execute_case(state, node, io),
        CompoundCommand::Group(node) => execute_statements(state, &node.body, io),
        CompoundCommand::Subshell(node) => execute_subshell(state, node, io),
        CompoundCommand::Arithmetic(node) => {
            match arithmetic::eval(state, &node.expression) {
                Ok(value) => Ok(if value != 0 { 0 } else { 1 }),
                Err(err) => {
                    use std::io::Write;
                    let mut stderr = io.stderr_writer();
                    let _ = writeln!(stderr, "den: {}", err);
                    Ok(1)
                }
            }
        }
        CompoundCommand::Conditional(node) => {
            let result = test_expr::evaluate_cond(state, &node.expression)?;
            Ok(if result { 0 } else { 1 })
        }
    }
}

/// Run a condition list with the errexit exemption in force.
fn run_condition(
    state: &mut ShellState,
    statements: &[Statement],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let saved = state.in_condition;
    state.in_condition = true;
    let result = execute_statements(state, statements, io);
    state.in_condition = saved;
    result
}

fn execute_if(state: &mut ShellState, node: &IfCommand, io: &CommandIo) -> Result<i32, ExecError> {
    for (condition, body) in &node.clauses {
        if run_condition(state, condition, io)? == 0 {
            return execute_statements(state, body, io);
        }
    }
    if let Some(body) = &node.else_body {
        return execute_statements(state, body, io);
    }
    Ok(0)
}

/// `while` / `until`, with break/continue level handling.
fn execute_loop(
    state: &mut ShellState,
    node: &LoopCommand,
    until: bool,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    state.loop_depth += 1;
    let mut status = 0;

    let result = loop {
        let condition = match run_condition(state, &node.condition, io) {
            Ok(status) => status,
            Err(err) => break Err(err),
        };
        let proceed = if until { condition != 0 } else { condition == 0 };
        if !proceed {
            break Ok(status);
        }

        match execute_statements(state, &node.body, io) {
            Ok(body_status) => status = body_status,
            Err(ExecError::Break(1)) => break Ok(status),
            Err(ExecError::Break(n)) => break Err(ExecError::Break(n - 1)),
            Err(ExecError::Continue(1)) => continue,
            Err(ExecError::Continue(n)) => break Err(ExecError::Continue(n - 1)),
            Err(err) => break Err(err),
        }
    };

    state.loop_depth -= 1;
    result
}

fn execute_for(state: &mut ShellState, node: &ForCommand, io: &CommandIo) -> Result<i32, ExecError> {
    let items = match &node.words {
        Some(words) => expand_words(state, words)?,
        None => state.positional.clone(),
    };

    state.loop_depth += 1;
    let mut status = 0;

    let mut result = Ok(0);
    'outer: for item in items {
        if let Err(e) = state.set_string(&node.variable, item).map_err(ExecError::expansion) {
            result = Err(e);
            break;
        }
        match execute_statements(state, &node.body, io) {
            Ok(body_status) => status = body_status,
            Err(ExecError::Break(1)) => break,
            Err(ExecError::Break(n)) => {
                result = Err(ExecError::Break(n - 1));
                break 'outer;
            }
            Err(ExecError::Continue(1)) => continue,
            Err(ExecError::Continue(n)) => {
                result = Err(ExecError::Continue(n - 1));
                break 'outer;
            }
            Err(err) => {
                result = Err(err);
                break 'outer;
            }
        }
    }

    state.loop_depth -= 1;
    result.map(|_| status)
}

fn execute_c_for(
    state: &mut ShellState,
    node: &CStyleForCommand,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if let Some(init) = &node.init {
        arithmetic::eval(state, init)?;
    }

    state.loop_depth += 1;
    let mut status = 0;

    let result = loop {
        let proceed = match &node.condition {
            Some(cond) => match arithmetic::eval(state, cond) {
                Ok(value) => value != 0,
                Err(err) => break Err(err),
            },
            None => true,
        };
        if !proceed {
            break Ok(status);
        }

        match execute_statements(state, &node.body, io) {
            Ok(body_status) => status = body_status,
            Err(ExecError::Break(1)) => break Ok(status),
            Err(ExecError::Break(n)) => break Err(ExecError::Break(n - 1)),
            Err(ExecError::Continue(1)) => {
                if let Some(update) = &node.update {
                    if let Err(err) = arithmetic::eval(state, update) {
                        break Err(err);
                    }
                }
                continue;
            }
            Err(ExecError::Continue(n)) => break Err(ExecError::Continue(n - 1)),
            Err(err) => break Err(err),
        }

        if let Some(update) = &node.update {
            if let Err(err) = arithmetic::eval(state, update) {
                break Err(err);
            }
        }
    };

    state.loop_depth -= 1;
    result
}

fn execute_case(
    state: &mut ShellState,
    node: &CaseCommand,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let subject = expand_word_single(state, &node.word)?;
    let opts = MatchOptions {
        extglob: state.shopt.extglob,
        nocase: state.shopt.nocasematch,
        pathname: false,
        require_literal_dot: false,
    };

    let mut status = 0;
    let mut fall_through = false;

    for item in &node.items {
        let mut matched = fall_through;
        if !matched {
            for pattern_word in &item.patterns {
                let pattern_text = expand_pattern_word(state, pattern_word)?;
                if pattern::matches(&pattern_text, &subject, opts) {
                    matched = true;
                    break;
                }
            }
        }
        if !matched {
            continue;
        }

        status = execute_statements(state, &item.body, io)?;
        match item.terminator {
            CaseTerminator::Break => return Ok(status),
            CaseTerminator::FallThrough => {
                fall_through = true;
            }
            CaseTerminator::Continue => {
                fall_through = false;
            }
        }
    }

    Ok(status)
}

/// `( … )`: a cloned state; mutations vanish with it.
fn execute_subshell(
    state: &mut ShellState,
    node: &BlockCommand,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut sub_state = state.clone();
    sub_state.is_subshell = true;
    if !sub_state.options.errtrace {
        sub_state.traps.err = None;
    }

    match execute_statements(&mut sub_state, &node.body, io) {
        Ok(status) => Ok(status),
        Err(ExecError::Exit(code))
        | Err(ExecError::Errexit(code))
        | Err(ExecError::Return(code)) => Ok(code),
        // A subshell spawned inside a loop swallows break/continue.
        Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => Ok(0),
        Err(err) => Err(err),
    }
}

// ============================================================================
// Tests
// ============================================================================
