//! Parameter expansion: `$VAR`, `${VAR}` and every `${…}` operation form.

use crate::ast::{ParamOperation, ParameterExpansion, Subscript};
use crate::interpreter::arithmetic;
use crate::interpreter::errors::ExecError;
use crate::interpreter::pattern::{self, MatchOptions};
use crate::interpreter::state::ShellState;
use crate::interpreter::vars::Value;

use super::word::{expand_pattern_word, expand_word_single};

/// The result of one parameter expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Single(String),
    /// `"$@"` / `"${a[@]}"`: one value per field.
    Fields(Vec<String>),
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::Single(String::new())
    }
}

impl ParamValue {
    pub fn into_single(self, ifs_first: &str) -> String {
        match self {
            ParamValue::Single(s) => s,
            ParamValue::Fields(fields) => fields.join(ifs_first),
        }
    }
}

/// Evaluate a parameter expansion. `in_quotes` selects the `"$@"` vs
/// `"$*"` field behavior: inside quotes, a star expansion joins its
/// fields with the first IFS character.
pub fn eval_parameter(
    state: &mut ShellState,
    pe: &ParameterExpansion,
    in_quotes: bool,
) -> Result<ParamValue, ExecError> {
    let result = eval_parameter_inner(state, pe, in_quotes)?;

    let star = pe.parameter == "*" || pe.subscript == Some(Subscript::Star);
    if star && in_quotes {
        if let ParamValue::Fields(fields) = result {
            let ifs = state.ifs();
            let sep = ifs.chars().next().map(|c| c.to_string()).unwrap_or_default();
            return Ok(ParamValue::Single(fields.join(&sep)));
        }
    }
    Ok(result)
}

fn eval_parameter_inner(
    state: &mut ShellState,
    pe: &ParameterExpansion,
    in_quotes: bool,
) -> Result<ParamValue, ExecError> {
    let operation = pe.operation.as_ref();

    // Operations that do not read the value first.
    match operation {
        Some(ParamOperation::ArrayKeys { star }) => {
            let keys = match state.lookup(&pe.parameter) {
                Some(var) => var.value.keys(),
                None => Vec::new(),
            };
            return Ok(join_or_fields(keys, *star, in_quotes, state));
        }
        Some(ParamOperation::NamesWithPrefix { star }) => {
            let mut names: Vec<String> = state
                .global
                .keys()
                .chain(state.frames.iter().flat_map(|f| f.keys()))
                .filter(|n| n.starts_with(&pe.parameter))
                .cloned()
                .collect();
            names.sort();
            names.dedup();
            return Ok(join_or_fields(names, *star, in_quotes, state));
        }
        Some(ParamOperation::Indirect) => {
            let target = base_value(state, pe)?.unwrap_or_default().into_single(" ");
            if target.is_empty() {
                return Ok(ParamValue::Single(String::new()));
            }
            let inner = parse_indirect_target(&target);
            return eval_parameter(state, &inner, in_quotes);
        }
        _ => {}
    }

    let value = base_value(state, pe)?;

    match operation {
        None => finish_plain(state, pe, value),
        Some(ParamOperation::Length) => {
            let length = match &value {
                Some(ParamValue::Fields(fields)) => fields.len(),
                Some(ParamValue::Single(s)) => s.chars().count(),
                None => 0,
            };
            Ok(ParamValue::Single(length.to_string()))
        }
        Some(ParamOperation::Default { word, check_empty }) => {
            if is_unset_or_empty(&value, *check_empty) {
                Ok(ParamValue::Single(expand_word_single(state, word)?))
            } else {
                finish_plain(state, pe, value)
            }
        }
        Some(ParamOperation::AssignDefault { word, check_empty }) => {
            if is_unset_or_empty(&value, *check_empty) {
                let default = expand_word_single(state, word)?;
                if !is_assignable_name(&pe.parameter) {
                    return Err(ExecError::expansion(format!(
                        "{}: cannot assign in this way",
                        pe.parameter
                    )));
                }
                state
                    .set_string(&pe.parameter, default.clone())
                    .map_err(ExecError::expansion)?;
                Ok(ParamValue::Single(default))
            } else {
                finish_plain(state, pe, value)
            }
        }
        Some(ParamOperation::ErrorIfUnset { word, check_empty }) => {
            if is_unset_or_empty(&value, *check_empty) {
                let message = match word {
                    Some(w) => expand_word_single(state, w)?,
                    None => "parameter null or not set".to_string(),
                };
                Err(ExecError::Expansion {
                    message: format!("{}: {}", pe.parameter, message),
                    status: 1,
                })
            } else {
                finish_plain(state, pe, value)
            }
        }
        Some(ParamOperation::Alternative { word, check_empty }) => {
            if is_unset_or_empty(&value, *check_empty) {
                Ok(ParamValue::Single(String::new()))
            } else {
                Ok(ParamValue::Single(expand_word_single(state, word)?))
            }
        }
        Some(ParamOperation::Substring { offset, length }) => {
            let offset = arithmetic::eval(state, offset)?;
            let length = match length {
                Some(expr) => Some(arithmetic::eval(state, expr)?),
                None => None,
            };
            match value {
                Some(ParamValue::Fields(fields)) => {
                    Ok(ParamValue::Fields(slice_fields(fields, offset, length)))
                }
                Some(ParamValue::Single(s)) => {
                    Ok(ParamValue::Single(slice_string(&s, offset, length)))
                }
                None => Ok(ParamValue::Single(String::new())),
            }
        }
        Some(ParamOperation::RemovePattern { pattern, suffix, greedy }) => {
            let pat = expand_pattern_word(state, pattern)?;
            let opts = match_opts(state);
            map_value(value, |s| pattern::remove_pattern(&s, &pat, *suffix, *greedy, opts))
        }
        Some(ParamOperation::ReplacePattern { pattern, replacement, all, anchor }) => {
            let pat = expand_pattern_word(state, pattern)?;
            if pat.is_empty() {
                return finish_plain(state, pe, value);
            }
            let rep = match replacement {
                Some(w) => expand_word_single(state, w)?,
                None => String::new(),
            };
            let opts = match_opts(state);
            match anchor {
                Some(crate::ast::PatternAnchor::Start) => {
                    map_value(value, |s| {
                        let removed = pattern::remove_pattern(&s, &pat, false, true, opts);
                        if removed.len() != s.len() {
                            format!("{}{}", rep, removed)
                        } else {
                            s
                        }
                    })
                }
                Some(crate::ast::PatternAnchor::End) => {
                    map_value(value, |s| {
                        let removed = pattern::remove_pattern(&s, &pat, true, true, opts);
                        if removed.len() != s.len() {
                            format!("{}{}", removed, rep)
                        } else {
                            s
                        }
                    })
                }
                None => {
                    map_value(value, |s| pattern::replace_pattern(&s, &pat, &rep, *all, opts))
                }
            }
        }
        Some(ParamOperation::CaseConvert { upper, all }) => {
            map_value(value, |s| convert_case(&s, *upper, *all))
        }
        // Handled above.
        Some(ParamOperation::Indirect)
        | Some(ParamOperation::ArrayKeys { .. })
        | Some(ParamOperation::NamesWithPrefix { .. }) => unreachable!(),
    }
}

/// The raw value of the parameter, before any operation. None = unset.
fn base_value(
    state: &mut ShellState,
    pe: &ParameterExpansion,
) -> Result<Option<ParamValue>, ExecError> {
    let name = pe.parameter.as_str();

    // Special parameters.
    match name {
        "?" => return Ok(Some(ParamValue::Single(state.last_exit_code.to_string()))),
        "$" => return Ok(Some(ParamValue::Single(std::process::id().to_string()))),
        "!" => {
            return Ok(state
                .last_background_pid
                .map(|p| ParamValue::Single(p.to_string())));
        }
        "#" => return Ok(Some(ParamValue::Single(state.positional.len().to_string()))),
        "-" => {
            return Ok(Some(ParamValue::Single(
                state.options.flag_string(state.interactive),
            )));
        }
        "_" => return Ok(Some(ParamValue::Single(state.last_arg.clone()))),
        "0" => return Ok(Some(ParamValue::Single(state.script_name.clone()))),
        "@" | "*" => {
            if state.positional.is_empty() {
                // Set-but-empty: expands to zero fields, never a nounset
                // error.
                return Ok(Some(ParamValue::Fields(Vec::new())));
            }
            return Ok(Some(ParamValue::Fields(state.positional.clone())));
        }
        _ => {}
    }

    if let Ok(index) = name.parse::<usize>() {
        return Ok(state.positional_get(index).map(|s| ParamValue::Single(s.to_string())));
    }

    // PIPESTATUS behaves as an array.
    if name == "PIPESTATUS" {
        let fields: Vec<String> = state.pipe_status.iter().map(|s| s.to_string()).collect();
        return Ok(Some(match &pe.subscript {
            Some(Subscript::At) | Some(Subscript::Star) => ParamValue::Fields(fields),
            Some(Subscript::Index(text)) => {
                let index = arithmetic::eval_text(state, text)?;
                ParamValue::Single(
                    fields.get(index.max(0) as usize).cloned().unwrap_or_default(),
                )
            }
            None => ParamValue::Single(fields.first().cloned().unwrap_or_default()),
        }));
    }

    match &pe.subscript {
        None => Ok(state.get_string(name).map(ParamValue::Single)),
        Some(Subscript::At) | Some(Subscript::Star) => {
            Ok(state.lookup(name).map(|var| ParamValue::Fields(var.value.elements())))
        }
        Some(Subscript::Index(text)) => {
            let is_assoc = matches!(
                state.lookup(name).map(|v| &v.value),
                Some(Value::Assoc(_))
            );
            if is_assoc {
                let key = expand_subscript_key(state, text)?;
                let value = match state.lookup(name).map(|v| &v.value) {
                    Some(Value::Assoc(map)) => map.get(&key).cloned(),
                    _ => None,
                };
                Ok(value.map(ParamValue::Single))
            } else {
                let index = arithmetic::eval_text(state, text)?;
                Ok(element_at(state, name, index).map(ParamValue::Single))
            }
        }
    }
}

fn element_at(state: &ShellState, name: &str, index: i64) -> Option<String> {
    match state.lookup(name).map(|v| &v.value) {
        Some(Value::Indexed(map)) => {
            if index < 0 {
                // Negative indices count from the end.
                let keys: Vec<i64> = map.keys().copied().collect();
                let pos = keys.len() as i64 + index;
                if pos < 0 {
                    return None;
                }
                keys.get(pos as usize).and_then(|k| map.get(k)).cloned()
            } else {
                map.get(&index).cloned()
            }
        }
        Some(Value::String(s)) => {
            if index == 0 {
                Some(s.clone())
            } else {
                None
            }
        }
        Some(Value::Assoc(map)) => map.get(&index.to_string()).cloned(),
        None => None,
    }
}

/// The subscript of an associative array is expanded like a word.
fn expand_subscript_key(state: &mut ShellState, text: &str) -> Result<String, ExecError> {
    let word = crate::parser::word_parser::parse_word_fragment(text)
        .map_err(|e| ExecError::expansion(e.to_string()))?;
    expand_word_single(state, &word)
}

/// `${!ref}` target may itself carry a subscript.
fn parse_indirect_target(target: &str) -> ParameterExpansion {
    if let Some(open) = target.find('[') {
        if target.ends_with(']') {
            let name = &target[..open];
            let sub = &target[open + 1..target.len() - 1];
            let subscript = match sub {
                "@" => Subscript::At,
                "*" => Subscript::Star,
                other => Subscript::Index(other.to_string()),
            };
            return ParameterExpansion {
                parameter: name.to_string(),
                subscript: Some(subscript),
                operation: None,
            };
        }
    }
    ParameterExpansion { parameter: target.to_string(), subscript: None, operation: None }
}

/// Plain expansion result, applying nounset.
fn finish_plain(
    state: &ShellState,
    pe: &ParameterExpansion,
    value: Option<ParamValue>,
) -> Result<ParamValue, ExecError> {
    match value {
        Some(v) => Ok(v),
        None => {
            if state.options.nounset && !matches!(pe.parameter.as_str(), "@" | "*") {
                Err(ExecError::Expansion {
                    message: format!("{}: unbound variable", pe.parameter),
                    status: 1,
                })
            } else {
                Ok(ParamValue::Single(String::new()))
            }
        }
    }
}

fn is_unset_or_empty(value: &Option<ParamValue>, check_empty: bool) -> bool {
    match value {
        None => true,
        Some(ParamValue::Single(s)) => check_empty && s.is_empty(),
        Some(ParamValue::Fields(fields)) => check_empty && fields.is_empty(),
    }
}

fn is_assignable_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn map_value(
    value: Option<ParamValue>,
    f: impl Fn(String) -> String,
) -> Result<ParamValue, ExecError> {
    Ok(match value {
        None => ParamValue::Single(String::new()),
        Some(ParamValue::Single(s)) => ParamValue::Single(f(s)),
        Some(ParamValue::Fields(fields)) => {
            ParamValue::Fields(fields.into_iter().map(f).collect())
        }
    })
}

fn join_or_fields(
    items: Vec<String>,
    star: bool,
    in_quotes: bool,
    state: &ShellState,
) -> ParamValue {
    if star && in_quotes {
        let ifs = state.ifs();
        let sep = ifs.chars().next().map(|c| c.to_string()).unwrap_or_default();
        ParamValue::Single(items.join(&sep))
    } else {
        ParamValue::Fields(items)
    }
}

fn slice_string(s: &str, offset: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = match length {
        None => len,
        Some(l) if l < 0 => (len + l).max(start),
        Some(l) => (start + l).min(len),
    };
    chars[start as usize..end.max(start) as usize].iter().collect()
}

fn slice_fields(fields: Vec<String>, offset: i64, length: Option<i64>) -> Vec<String> {
    let len = fields.len() as i64;
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = match length {
        None => len,
        Some(l) if l < 0 => len,
        Some(l) => (start + l).min(len),
    };
    fields[start as usize..end.max(start) as usize].to_vec()
}

fn convert_case(s: &str, upper: bool, all: bool) -> String {
    if all {
        if upper {
            s.to_uppercase()
        } else {
            s.to_lowercase()
        }
    } else {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => {
                let converted: String = if upper {
                    first.to_uppercase().collect()
                } else {
                    first.to_lowercase().collect()
                };
                format!("{}{}", converted, chars.as_str())
            }
            None => String::new(),
        }
    }
}

fn match_opts(state: &ShellState) -> MatchOptions {
    MatchOptions {
        extglob: state.shopt.extglob,
        nocase: false,
        pathname: false,
        require_literal_dot: false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::WordPart;
    use crate::parser::word_parser::parse_word;

    fn expand(state: &mut ShellState, text: &str) -> Result<ParamValue, ExecError> {
        let word = parse_word(text).unwrap();
        match &word.parts[0] {
            WordPart::Parameter(pe) => eval_parameter(state, pe, false),
            other => panic!("not a parameter: {:?}", other),
        }
    }

    fn single(state: &mut ShellState, text: &str) -> String {
        match expand(state, text).unwrap() {
            ParamValue::Single(s) => s,
            ParamValue::Fields(f) => panic!("expected single, got {:?}", f),
        }
    }

    #[test]
    fn plain_and_unset() {
        let mut state = ShellState::default();
        state.set_string("X", "val".to_string()).unwrap();
        assert_eq!(single(&mut state, "$X"), "val");
        assert_eq!(single(&mut state, "$UNSET"), "");
    }

    #[test]
    fn nounset_errors() {
        let mut state = ShellState::default();
        state.options.nounset = true;
        assert!(expand(&mut state, "$UNDEF").is_err());
        // @ and * stay exempt.
        assert!(expand(&mut state, "$@").is_ok());
    }

    #[test]
    fn defaults() {
        let mut state = ShellState::default();
        assert_eq!(single(&mut state, "${X:-fallback}"), "fallback");
        state.set_string("X", "".to_string()).unwrap();
        assert_eq!(single(&mut state, "${X:-fallback}"), "fallback");
        assert_eq!(single(&mut state, "${X-fallback}"), "");
        state.set_string("X", "set".to_string()).unwrap();
        assert_eq!(single(&mut state, "${X:-fallback}"), "set");
    }

    #[test]
    fn assign_default_persists() {
        let mut state = ShellState::default();
        assert_eq!(single(&mut state, "${NEW:=seeded}"), "seeded");
        assert_eq!(state.get_string("NEW"), Some("seeded".to_string()));
    }

    #[test]
    fn error_if_unset() {
        let mut state = ShellState::default();
        let err = expand(&mut state, "${GONE:?missing}").unwrap_err();
        match err {
            ExecError::Expansion { message, .. } => assert!(message.contains("missing")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn alternative() {
        let mut state = ShellState::default();
        assert_eq!(single(&mut state, "${X:+yes}"), "");
        state.set_string("X", "anything".to_string()).unwrap();
        assert_eq!(single(&mut state, "${X:+yes}"), "yes");
    }

    #[test]
    fn length_and_substring() {
        let mut state = ShellState::default();
        state.set_string("S", "hello world".to_string()).unwrap();
        assert_eq!(single(&mut state, "${#S}"), "11");
        assert_eq!(single(&mut state, "${S:6}"), "world");
        assert_eq!(single(&mut state, "${S:0:5}"), "hello");
        assert_eq!(single(&mut state, "${S:3:-3}"), "lo wo");
    }

    #[test]
    fn pattern_removal() {
        let mut state = ShellState::default();
        state.set_string("P", "a/b/c.txt".to_string()).unwrap();
        assert_eq!(single(&mut state, "${P#*/}"), "b/c.txt");
        assert_eq!(single(&mut state, "${P##*/}"), "c.txt");
        assert_eq!(single(&mut state, "${P%.*}"), "a/b/c");
    }

    #[test]
    fn pattern_replacement() {
        let mut state = ShellState::default();
        state.set_string("S", "one two two".to_string()).unwrap();
        assert_eq!(single(&mut state, "${S/two/2}"), "one 2 two");
        assert_eq!(single(&mut state, "${S//two/2}"), "one 2 2");
    }

    #[test]
    fn case_conversion() {
        let mut state = ShellState::default();
        state.set_string("W", "hello".to_string()).unwrap();
        assert_eq!(single(&mut state, "${W^}"), "Hello");
        assert_eq!(single(&mut state, "${W^^}"), "HELLO");
        state.set_string("W", "HELLO".to_string()).unwrap();
        assert_eq!(single(&mut state, "${W,}"), "hELLO");
        assert_eq!(single(&mut state, "${W,,}"), "hello");
    }

    #[test]
    fn arrays() {
        let mut state = ShellState::default();
        state
            .set_array("A", vec!["x".into(), "y".into(), "z".into()], false)
            .unwrap();
        assert_eq!(
            expand(&mut state, "${A[@]}").unwrap(),
            ParamValue::Fields(vec!["x".into(), "y".into(), "z".into()])
        );
        assert_eq!(single(&mut state, "${A[1]}"), "y");
        assert_eq!(single(&mut state, "${A[-1]}"), "z");
        assert_eq!(single(&mut state, "${#A[@]}"), "3");
    }

    #[test]
    fn array_keys() {
        let mut state = ShellState::default();
        state.set_array("A", vec!["x".into(), "y".into()], false).unwrap();
        assert_eq!(
            expand(&mut state, "${!A[@]}").unwrap(),
            ParamValue::Fields(vec!["0".into(), "1".into()])
        );
    }

    #[test]
    fn indirect() {
        let mut state = ShellState::default();
        state.set_string("TARGET", "value".to_string()).unwrap();
        state.set_string("REF", "TARGET".to_string()).unwrap();
        assert_eq!(single(&mut state, "${!REF}"), "value");
    }

    #[test]
    fn positional_and_specials() {
        let mut state = ShellState::default();
        state.positional = vec!["one".into(), "two".into()];
        state.last_exit_code = 3;
        assert_eq!(single(&mut state, "$1"), "one");
        assert_eq!(single(&mut state, "$#"), "2");
        assert_eq!(single(&mut state, "$?"), "3");
        assert_eq!(
            expand(&mut state, "$@").unwrap(),
            ParamValue::Fields(vec!["one".into(), "two".into()])
        );
    }
}
