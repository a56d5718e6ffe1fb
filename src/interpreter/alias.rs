//! Alias expansion.
//!
//! Applies to the literal first word of a simple command, before word
//! expansion, iteratively with a visited set for cycle detection. A
//! replacement ending in whitespace lets the following word be
//! alias-expanded as well (the POSIX chaining rule).

use std::collections::HashSet;

use crate::ast::{Command, SimpleCommand, Word};

use super::state::ShellState;

/// Expand aliases on a simple command's first word. Returns the rewritten
/// command (or a clone when nothing applies).
pub fn expand_aliases(state: &ShellState, cmd: &SimpleCommand) -> SimpleCommand {
    if !state.shopt.expand_aliases || state.aliases.is_empty() {
        return cmd.clone();
    }

    let mut current = cmd.clone();
    let mut visited: HashSet<String> = HashSet::new();
    let mut chain_next = false;

    loop {
        let Some(name) = current.name.as_ref().and_then(|w| w.as_literal()) else {
            break;
        };
        let name = name.to_string();
        if visited.contains(&name) {
            break;
        }
        let Some(replacement) = state.aliases.get(&name).cloned() else {
            break;
        };
        visited.insert(name);

        let Some(parsed) = parse_replacement(&replacement) else {
            break;
        };

        chain_next = replacement.ends_with(' ') || replacement.ends_with('\t');

        // Splice: alias words replace the command word, original arguments
        // follow; alias redirections come first in source order.
        let mut assignments = current.assignments.clone();
        assignments.extend(parsed.assignments.clone());
        let mut args = parsed.args.clone();
        args.extend(current.args.clone());
        let mut redirections = parsed.redirections.clone();
        redirections.extend(current.redirections.clone());

        current = SimpleCommand {
            assignments,
            name: parsed.name.clone(),
            args,
            redirections,
            line: current.line,
        };

        if current.name.is_none() {
            break;
        }
    }

    if chain_next {
        expand_chained_argument(state, &mut current, &mut visited);
    }

    current
}

/// Trailing-whitespace chaining: the word after the alias gets one round
/// of alias expansion too.
fn expand_chained_argument(
    state: &ShellState,
    cmd: &mut SimpleCommand,
    visited: &mut HashSet<String>,
) {
    let Some(first_arg) = cmd.args.first().and_then(|w| w.as_literal()) else {
        return;
    };
    let name = first_arg.to_string();
    if visited.contains(&name) {
        return;
    }
    let Some(replacement) = state.aliases.get(&name).cloned() else {
        return;
    };
    visited.insert(name);

    let Some(parsed) = parse_replacement(&replacement) else {
        return;
    };
    if !parsed.assignments.is_empty() || !parsed.redirections.is_empty() {
        return;
    }

    let mut words: Vec<Word> = Vec::new();
    if let Some(name_word) = parsed.name {
        words.push(name_word);
    }
    words.extend(parsed.args);
    cmd.args.splice(0..1, words);
}

/// An alias body must itself parse to a single simple command to be
/// spliced; anything more complex leaves the word alone.
fn parse_replacement(text: &str) -> Option<SimpleCommand> {
    let script = crate::parser::parse(text).ok()?;
    if script.statements.len() != 1 {
        return None;
    }
    let statement = &script.statements[0];
    if statement.pipelines.len() != 1 || statement.background {
        return None;
    }
    let pipeline = &statement.pipelines[0];
    if pipeline.commands.len() != 1 || pipeline.negated {
        return None;
    }
    match &pipeline.commands[0] {
        Command::Simple(simple) => Some(simple.clone()),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Command;
    use crate::parser::parse;

    fn simple(input: &str) -> SimpleCommand {
        let script = parse(input).unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::Simple(cmd) => cmd.clone(),
            other => panic!("not simple: {:?}", other),
        }
    }

    fn argv(cmd: &SimpleCommand) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(name) = &cmd.name {
            out.push(name.as_literal().unwrap_or("?").to_string());
        }
        for arg in &cmd.args {
            out.push(arg.as_literal().unwrap_or("?").to_string());
        }
        out
    }

    #[test]
    fn simple_replacement() {
        let mut state = ShellState::default();
        state.aliases.insert("ll".to_string(), "ls -l".to_string());
        let expanded = expand_aliases(&state, &simple("ll /tmp"));
        assert_eq!(argv(&expanded), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn self_reference_expands_once() {
        let mut state = ShellState::default();
        state.aliases.insert("ls".to_string(), "ls --color".to_string());
        let expanded = expand_aliases(&state, &simple("ls /tmp"));
        assert_eq!(argv(&expanded), vec!["ls", "--color", "/tmp"]);
    }

    #[test]
    fn cycle_detected() {
        let mut state = ShellState::default();
        state.aliases.insert("a".to_string(), "b".to_string());
        state.aliases.insert("b".to_string(), "a".to_string());
        let expanded = expand_aliases(&state, &simple("a x"));
        // Expansion terminates; the final word is one of the cycle names.
        assert_eq!(argv(&expanded)[1..], ["x".to_string()]);
    }

    #[test]
    fn quoted_word_not_expanded() {
        let mut state = ShellState::default();
        state.aliases.insert("ll".to_string(), "ls -l".to_string());
        let expanded = expand_aliases(&state, &simple("'ll' /tmp"));
        assert!(expanded.name.as_ref().unwrap().as_literal().is_none());
    }

    #[test]
    fn trailing_space_chains() {
        let mut state = ShellState::default();
        state.aliases.insert("run".to_string(), "env ".to_string());
        state.aliases.insert("ll".to_string(), "ls -l".to_string());
        let expanded = expand_aliases(&state, &simple("run ll"));
        assert_eq!(argv(&expanded), vec!["env", "ls", "-l"]);
    }

    #[test]
    fn disabled_by_shopt() {
        let mut state = ShellState::default();
        state.shopt.expand_aliases = false;
        state.aliases.insert("ll".to_string(), "ls -l".to_string());
        let expanded = expand_aliases(&state, &simple("ll"));
        assert_eq!(argv(&expanded), vec!["ll"]);
    }
}
