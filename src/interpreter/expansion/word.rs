//! The expansion orchestrator: word part trees → argv fields.

use crate::ast::{Word, WordPart};
use crate::interpreter::errors::ExecError;
use crate::interpreter::pattern;
use crate::interpreter::state::ShellState;

use super::parameter::{eval_parameter, ParamValue};
use super::{brace, command_subst, pathname, split, tilde};
use super::{field_survives, field_text, Field, Fragment};

/// Full expansion of an argv word list: brace, tilde, parameter, command,
/// arithmetic, splitting, pathname expansion, quote removal.
pub fn expand_words(state: &mut ShellState, words: &[Word]) -> Result<Vec<String>, ExecError> {
    let mut out = Vec::new();
    for word in words {
        for braced in brace::expand_braces(word) {
            let fields = expand_to_fields(state, &braced)?;
            let ifs = state.ifs();
            let fields = split::split_fields(fields, &ifs);
            for field in fields {
                if !field_survives(&field) {
                    continue;
                }
                out.extend(glob_field(state, field)?);
            }
        }
    }
    Ok(out)
}

/// Expansion without splitting or globbing: redirection-target style.
/// Multiple fields (from `"$@"`) are joined with spaces.
pub fn expand_word_single(state: &mut ShellState, word: &Word) -> Result<String, ExecError> {
    let fields = expand_to_fields(state, word)?;
    let texts: Vec<String> = fields.iter().map(field_text).collect();
    Ok(texts.join(" "))
}

/// Assignment RHS: tilde/parameter/command/arithmetic expansion and quote
/// removal, no splitting, no globbing, no brace expansion.
pub fn expand_assignment_value(state: &mut ShellState, word: &Word) -> Result<String, ExecError> {
    expand_word_single(state, word)
}

/// Expand a word into a pattern string: quoted spans are backslash-escaped
/// so they match literally (`case`, `[[ == ]]`, `${v#pat}`).
pub fn expand_pattern_word(state: &mut ShellState, word: &Word) -> Result<String, ExecError> {
    let fields = expand_to_fields(state, word)?;
    let mut pattern = String::new();
    for field in &fields {
        for fragment in field {
            if fragment.quoted {
                pattern.push_str(&escape_glob(&fragment.text));
            } else {
                pattern.push_str(&fragment.text);
            }
        }
    }
    Ok(pattern)
}

fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '(' | ')' | '|' | '!' | '@' | '+') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Evaluate a word's parts into provisional fields (pre-splitting).
/// Field breaks at this stage only come from `"$@"`-style expansions.
pub fn expand_to_fields(state: &mut ShellState, word: &Word) -> Result<Vec<Field>, ExecError> {
    let mut fields: Vec<Field> = vec![Vec::new()];
    eval_parts(state, &word.parts, false, &mut fields)?;
    Ok(fields)
}

fn push_text(fields: &mut Vec<Field>, fragment: Fragment) {
    fields.last_mut().expect("fields never empty").push(fragment);
}

fn eval_parts(
    state: &mut ShellState,
    parts: &[WordPart],
    in_quotes: bool,
    fields: &mut Vec<Field>,
) -> Result<(), ExecError> {
    for part in parts {
        match part {
            WordPart::Literal(text) => {
                push_text(
                    fields,
                    Fragment { text: text.clone(), quoted: in_quotes, splittable: false },
                );
            }
            WordPart::SingleQuoted(text) | WordPart::AnsiCQuoted(text) => {
                push_text(fields, Fragment::quoted(text.clone()));
            }
            WordPart::Escaped(c) => {
                push_text(fields, Fragment::quoted(c.to_string()));
            }
            WordPart::DoubleQuoted(inner) => {
                // Mark even an empty "" so the field survives.
                if inner.is_empty() {
                    push_text(fields, Fragment::quoted(String::new()));
                } else {
                    eval_parts(state, inner, true, fields)?;
                }
            }
            WordPart::Tilde(user) => {
                let home = tilde::expand_tilde(state, user.as_deref());
                push_text(fields, Fragment { text: home, quoted: true, splittable: false });
            }
            WordPart::Parameter(pe) => {
                match eval_parameter(state, pe, in_quotes)? {
                    ParamValue::Single(value) => {
                        push_text(fields, Fragment::expansion(value, in_quotes));
                    }
                    // Star expansions in quotes arrive pre-joined as a
                    // Single; an empty Fields here ("$@" with no
                    // parameters) contributes nothing and the word can
                    // vanish.
                    ParamValue::Fields(values) => {
                        let mut iter = values.into_iter();
                        if let Some(first) = iter.next() {
                            push_text(fields, Fragment::expansion(first, in_quotes));
                            for value in iter {
                                fields.push(vec![Fragment::expansion(value, in_quotes)]);
                            }
                        }
                    }
                }
            }
            WordPart::CommandSubst(script) => {
                let (output, status) = command_subst::run_captured(state, script)?;
                state.last_exit_code = status;
                push_text(fields, Fragment::expansion(output, in_quotes));
            }
            WordPart::Arithmetic(expr) => {
                let value = crate::interpreter::arithmetic::eval(state, expr)?;
                push_text(fields, Fragment::expansion(value.to_string(), in_quotes));
            }
            WordPart::Brace(_) => {
                // Braces surviving into this phase (quoted/assignment
                // context) are literal text.
                push_text(
                    fields,
                    Fragment { text: render_brace(part), quoted: in_quotes, splittable: false },
                );
            }
        }
    }
    Ok(())
}

fn render_brace(part: &WordPart) -> String {
    use crate::ast::{BraceBound, BraceExpansion};
    match part {
        WordPart::Brace(BraceExpansion::List(words)) => {
            let inner: Vec<String> = words
                .iter()
                .map(|w| {
                    w.parts
                        .iter()
                        .map(|p| match p {
                            WordPart::Literal(s) => s.clone(),
                            other => render_brace(other),
                        })
                        .collect()
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        WordPart::Brace(BraceExpansion::Range(range)) => {
            let bound = |b: &BraceBound| match b {
                BraceBound::Number { value, .. } => value.to_string(),
                BraceBound::Char(c) => c.to_string(),
            };
            match range.step {
                Some(step) => {
                    format!("{{{}..{}..{}}}", bound(&range.start), bound(&range.end), step)
                }
                None => format!("{{{}..{}}}", bound(&range.start), bound(&range.end)),
            }
        }
        other => format!("{:?}", other),
    }
}

/// Pathname-expand one post-split field.
fn glob_field(state: &mut ShellState, field: Field) -> Result<Vec<String>, ExecError> {
    let text = field_text(&field);

    if state.options.noglob {
        return Ok(vec![text]);
    }

    // Only unquoted spans can introduce glob characters.
    let has_glob = field
        .iter()
        .filter(|f| !f.quoted)
        .any(|f| pattern::has_glob_chars(&f.text, state.shopt.extglob));
    if !has_glob {
        return Ok(vec![text]);
    }

    let mut pattern_text = String::new();
    for fragment in &field {
        if fragment.quoted {
            pattern_text.push_str(&escape_glob(&fragment.text));
        } else {
            pattern_text.push_str(&fragment.text);
        }
    }

    let matches = pathname::expand(state, &pattern_text);
    if matches.is_empty() {
        if state.shopt.failglob {
            return Err(ExecError::Expansion {
                message: format!("no match: {}", text),
                status: 1,
            });
        }
        if state.shopt.nullglob {
            return Ok(Vec::new());
        }
        return Ok(vec![text]);
    }
    Ok(matches)
}

// ============================================================================
// Tests
// ============================================================================
