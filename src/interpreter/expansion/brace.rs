//! Brace expansion: `{a,b}` lists and `{1..5..2}` / `{a..e}` ranges.
//!
//! Purely syntactic, runs before every other phase, and never applies to
//! quoted text (the parser only produces `Brace` parts for unquoted
//! braces).

use crate::ast::{BraceBound, BraceExpansion, BraceRange, Word, WordPart};

/// Expand every brace part of a word, producing the cartesian product in
/// left-to-right order. Words without braces pass through unchanged.
pub fn expand_braces(word: &Word) -> Vec<Word> {
    let position = word
        .parts
        .iter()
        .position(|p| matches!(p, WordPart::Brace(_)));

    let Some(index) = position else {
        return vec![word.clone()];
    };

    let prefix = &word.parts[..index];
    let suffix = &word.parts[index + 1..];
    let alternatives: Vec<Vec<WordPart>> = match &word.parts[index] {
        WordPart::Brace(BraceExpansion::List(words)) => {
            words.iter().map(|w| w.parts.clone()).collect()
        }
        WordPart::Brace(BraceExpansion::Range(range)) => expand_range(range)
            .into_iter()
            .map(|text| vec![WordPart::Literal(text)])
            .collect(),
        _ => unreachable!(),
    };

    let mut results = Vec::new();
    for alternative in alternatives {
        let mut parts = Vec::with_capacity(prefix.len() + alternative.len() + suffix.len());
        parts.extend_from_slice(prefix);
        parts.extend(alternative);
        parts.extend_from_slice(suffix);
        // The suffix (or the alternative itself) may contain further braces.
        results.extend(expand_braces(&Word { parts }));
    }
    results
}

fn expand_range(range: &BraceRange) -> Vec<String> {
    match (&range.start, &range.end) {
        (BraceBound::Number { value: start, width: w1 }, BraceBound::Number { value: end, width: w2 }) => {
            let width = (*w1).max(*w2);
            let step = range.step.unwrap_or(if start <= end { 1 } else { -1 });
            if step == 0 {
                return vec![format!("{{{}..{}..0}}", start, end)];
            }
            let ascending = step > 0;
            let mut out = Vec::new();
            let mut current = *start;
            loop {
                let in_range = if ascending {
                    (start <= end && current <= *end) || (start > end && current >= *end)
                } else {
                    (start >= end && current >= *end) || (start < end && current <= *end)
                };
                if !in_range {
                    break;
                }
                out.push(pad_number(current, width));
                current += if *start <= *end { step.abs() } else { -step.abs() };
                if out.len() > 100_000 {
                    break;
                }
            }
            out
        }
        (BraceBound::Char(start), BraceBound::Char(end)) => {
            let step = range.step.unwrap_or(1).unsigned_abs().max(1) as usize;
            let (a, b) = (*start as u32, *end as u32);
            let mut codes: Vec<u32> = if a <= b {
                (a..=b).collect()
            } else {
                (b..=a).rev().collect()
            };
            codes = codes.into_iter().step_by(step).collect();
            codes
                .into_iter()
                .filter_map(char::from_u32)
                .map(|c| c.to_string())
                .collect()
        }
        _ => Vec::new(),
    }
}

fn pad_number(value: i64, width: usize) -> String {
    if width == 0 {
        return value.to_string();
    }
    if value < 0 {
        format!("-{:0>width$}", -value, width = width.saturating_sub(1))
    } else {
        format!("{:0>width$}", value, width = width)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::word_parser::parse_word;

    fn expand_texts(input: &str) -> Vec<String> {
        let word = parse_word(input).unwrap();
        expand_braces(&word)
            .into_iter()
            .map(|w| {
                w.parts
                    .iter()
                    .map(|p| match p {
                        WordPart::Literal(s) => s.clone(),
                        other => panic!("non-literal part: {:?}", other),
                    })
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn list_expansion() {
        assert_eq!(expand_texts("{a,b,c}"), vec!["a", "b", "c"]);
        assert_eq!(expand_texts("x{a,b}y"), vec!["xay", "xby"]);
    }

    #[test]
    fn cartesian_product() {
        assert_eq!(expand_texts("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn numeric_ranges() {
        assert_eq!(expand_texts("{1..4}"), vec!["1", "2", "3", "4"]);
        assert_eq!(expand_texts("{4..1}"), vec!["4", "3", "2", "1"]);
        assert_eq!(expand_texts("{1..9..3}"), vec!["1", "4", "7"]);
        assert_eq!(expand_texts("{01..03}"), vec!["01", "02", "03"]);
    }

    #[test]
    fn char_ranges() {
        assert_eq!(expand_texts("{a..d}"), vec!["a", "b", "c", "d"]);
        assert_eq!(expand_texts("{d..a}"), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn nested_braces() {
        assert_eq!(expand_texts("{a,{b,c}}"), vec!["a", "b", "c"]);
    }

    #[test]
    fn no_braces_pass_through() {
        let word = parse_word("plain").unwrap();
        assert_eq!(expand_braces(&word), vec![word]);
    }
}
