//! Word expansion: the ordered phases that turn parsed words into argv
//! fields.
//!
//! Order: brace expansion, tilde expansion, parameter expansion, command
//! substitution, arithmetic expansion, field splitting on IFS, pathname
//! expansion, quote removal. Quoting recorded by the parser decides which
//! phases apply to which spans.

pub mod brace;
pub mod command_subst;
pub mod parameter;
pub mod pathname;
pub mod split;
pub mod tilde;
pub mod word;

pub use word::{
    expand_assignment_value, expand_pattern_word, expand_to_fields, expand_word_single,
    expand_words,
};

/// A span of expanded text with its quoting provenance.
///
/// `quoted` spans are exempt from field splitting and pathname expansion;
/// `splittable` marks text that came from an unquoted expansion (only such
/// text is split on IFS).
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub quoted: bool,
    pub splittable: bool,
}

impl Fragment {
    pub fn literal(text: impl Into<String>) -> Self {
        Fragment { text: text.into(), quoted: false, splittable: false }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Fragment { text: text.into(), quoted: true, splittable: false }
    }

    pub fn expansion(text: impl Into<String>, quoted: bool) -> Self {
        Fragment { text: text.into(), quoted, splittable: !quoted }
    }
}

/// One field-in-progress: an ordered run of fragments.
pub type Field = Vec<Fragment>;

/// Concatenate a field's text (quote removal).
pub fn field_text(field: &Field) -> String {
    field.iter().map(|f| f.text.as_str()).collect()
}

/// A field is dropped when it is entirely unquoted and empty (the residue
/// of an empty expansion).
pub fn field_survives(field: &Field) -> bool {
    field.iter().any(|f| f.quoted) || field.iter().any(|f| !f.text.is_empty())
}
