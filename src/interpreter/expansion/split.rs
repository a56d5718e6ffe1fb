//! Field splitting on `$IFS`.
//!
//! Only text from unquoted expansions is split. IFS whitespace collapses
//! and trims at field boundaries; each non-whitespace IFS character is a
//! hard separator (an adjacent run of IFS whitespace folds into it).

use super::{Field, Fragment};

fn is_ifs_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

/// Split each field's splittable fragments, producing the final field list.
pub fn split_fields(fields: Vec<Field>, ifs: &str) -> Vec<Field> {
    let mut out: Vec<Field> = Vec::new();

    for field in fields {
        let mut current: Field = Vec::new();
        let mut has_content = false;
        // A whitespace separator was seen since the last content.
        let mut pending_ws = false;

        for fragment in field {
            if !fragment.splittable || ifs.is_empty() {
                if pending_ws && has_content {
                    out.push(std::mem::take(&mut current));
                    has_content = false;
                }
                pending_ws = false;
                current.push(fragment);
                has_content = true;
                continue;
            }

            let mut run = String::new();
            for c in fragment.text.chars() {
                if ifs.contains(c) {
                    if !run.is_empty() {
                        current.push(Fragment::expansion(std::mem::take(&mut run), false));
                        has_content = true;
                    }
                    if is_ifs_whitespace(c) {
                        pending_ws = true;
                    } else {
                        // Hard separator: close the current field even if
                        // it is empty.
                        out.push(std::mem::take(&mut current));
                        has_content = false;
                        pending_ws = false;
                    }
                } else {
                    if pending_ws && has_content {
                        out.push(std::mem::take(&mut current));
                        has_content = false;
                    }
                    pending_ws = false;
                    run.push(c);
                }
            }
            if !run.is_empty() {
                current.push(Fragment::expansion(run, false));
                has_content = true;
            }
        }

        if has_content || !current.is_empty() {
            out.push(current);
        }
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
