//! Pathname expansion: glob patterns against the filesystem.
//!
//! The pattern is split into `/`-separated segments and walked with
//! `read_dir`, matching each segment via the shell pattern translator.
//! `globstar` makes a lone `**` segment match zero or more directories.
//! Results come back sorted, as written (relative patterns yield relative
//! paths).

use std::path::{Path, PathBuf};

use crate::interpreter::pattern::{self, MatchOptions};
use crate::interpreter::state::ShellState;

/// Expand a pattern. Empty result means no matches (the caller applies
/// nullglob/failglob/literal policy).
pub fn expand(state: &ShellState, pattern_text: &str) -> Vec<String> {
    let opts = MatchOptions {
        extglob: state.shopt.extglob,
        nocase: state.shopt.nocaseglob,
        pathname: false,
        require_literal_dot: !state.shopt.dotglob,
    };

    let (root, segments, dir_only) = split_pattern(pattern_text);
    if segments.is_empty() {
        return Vec::new();
    }

    let start: PathBuf = match &root {
        Some(prefix) => PathBuf::from(prefix),
        None => state.cwd.clone(),
    };

    let mut results: Vec<String> = Vec::new();
    walk(
        state,
        &start,
        root.as_deref().unwrap_or(""),
        &segments,
        opts,
        dir_only,
        &mut results,
    );
    results.sort();
    results
}

/// Split into (absolute root prefix, segments, trailing-slash flag).
fn split_pattern(pattern_text: &str) -> (Option<String>, Vec<String>, bool) {
    let dir_only = pattern_text.ends_with('/');
    let trimmed = pattern_text.trim_end_matches('/');

    if let Some(rest) = trimmed.strip_prefix('/') {
        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        (Some("/".to_string()), segments, dir_only)
    } else {
        let segments = trimmed
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        (None, segments, dir_only)
    }
}

fn join_written(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, name)
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn walk(
    state: &ShellState,
    dir: &Path,
    written: &str,
    segments: &[String],
    opts: MatchOptions,
    dir_only: bool,
    results: &mut Vec<String>,
) {
    let (segment, rest) = match segments.split_first() {
        Some(pair) => pair,
        None => return,
    };

    // globstar: `**` matches zero or more directory levels.
    if state.shopt.globstar && segment == "**" {
        if rest.is_empty() {
            collect_recursive(dir, written, dir_only, opts, results);
        } else {
            walk(state, dir, written, rest, opts, dir_only, results);
            for entry in read_entries(dir, opts) {
                if entry.starts_with('.') && opts.require_literal_dot {
                    continue;
                }
                let path = dir.join(&entry);
                if path.is_dir() {
                    let next_written = join_written(written, &entry);
                    walk(state, &path, &next_written, segments, opts, dir_only, results);
                }
            }
        }
        return;
    }

    let literal = !pattern::has_glob_chars(segment, opts.extglob);

    for entry in read_entries(dir, opts) {
        let matched = if literal {
            entry == unescape(segment)
        } else {
            if entry.starts_with('.') && opts.require_literal_dot && !segment.starts_with('.') {
                continue;
            }
            segment_matches(segment, &entry, opts)
        };
        if !matched {
            continue;
        }

        let path = dir.join(&entry);
        let next_written = join_written(written, &entry);
        if rest.is_empty() {
            if dir_only && !path.is_dir() {
                continue;
            }
            if dir_only {
                results.push(format!("{}/", next_written));
            } else {
                results.push(next_written);
            }
        } else if path.is_dir() {
            walk(state, &path, &next_written, rest, opts, dir_only, results);
        }
    }
}

fn collect_recursive(
    dir: &Path,
    written: &str,
    dir_only: bool,
    opts: MatchOptions,
    results: &mut Vec<String>,
) {
    for entry in read_entries(dir, opts) {
        if entry.starts_with('.') && opts.require_literal_dot {
            continue;
        }
        let path = dir.join(&entry);
        let next_written = join_written(written, &entry);
        let is_dir = path.is_dir();
        if !dir_only || is_dir {
            if dir_only {
                results.push(format!("{}/", next_written));
            } else {
                results.push(next_written.clone());
            }
        }
        if is_dir {
            collect_recursive(&path, &next_written, dir_only, opts, results);
        }
    }
}

/// Match one path segment. Plain patterns go through `glob::Pattern`;
/// extglob operators need the regex translator.
fn segment_matches(segment: &str, entry: &str, opts: MatchOptions) -> bool {
    let has_extglob = opts.extglob
        && segment
            .chars()
            .zip(segment.chars().skip(1))
            .any(|(a, b)| matches!(a, '?' | '*' | '+' | '@' | '!') && b == '(');

    if !has_extglob {
        if let Ok(pattern) = glob::Pattern::new(segment) {
            let options = glob::MatchOptions {
                case_sensitive: !opts.nocase,
                require_literal_separator: false,
                require_literal_leading_dot: opts.require_literal_dot,
            };
            return pattern.matches_with(entry, options);
        }
    }
    pattern::matches(segment, entry, opts)
}

fn read_entries(dir: &Path, _opts: MatchOptions) -> Vec<String> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Ok(name) = entry.file_name().into_string() {
                out.push(name);
            }
        }
    }
    out
}

fn unescape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup(state: &mut ShellState) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.txt"), "").unwrap();
        fs::write(dir.path().join("beta.txt"), "").unwrap();
        fs::write(dir.path().join("gamma.log"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("inner.txt"), "").unwrap();
        state.cwd = dir.path().to_path_buf();
        dir
    }

    #[test]
    fn star_matches_files() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        assert_eq!(expand(&state, "*.txt"), vec!["alpha.txt", "beta.txt"]);
    }

    #[test]
    fn question_mark() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        assert_eq!(expand(&state, "?lpha.txt"), vec!["alpha.txt"]);
    }

    #[test]
    fn hidden_files_need_dotglob() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        assert!(expand(&state, "*hidden*").is_empty());

        state.shopt.dotglob = true;
        assert_eq!(expand(&state, "*hidden*"), vec![".hidden"]);

        // An explicit leading dot always works.
        state.shopt.dotglob = false;
        assert_eq!(expand(&state, ".h*"), vec![".hidden"]);
    }

    #[test]
    fn multi_segment_patterns() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        assert_eq!(expand(&state, "sub/*.txt"), vec!["sub/inner.txt"]);
        assert_eq!(expand(&state, "*/inner.txt"), vec!["sub/inner.txt"]);
    }

    #[test]
    fn no_match_returns_empty() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        assert!(expand(&state, "*.zip").is_empty());
    }

    #[test]
    fn globstar_recursive() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        state.shopt.globstar = true;
        let matches = expand(&state, "**/*.txt");
        assert_eq!(matches, vec!["alpha.txt", "beta.txt", "sub/inner.txt"]);
    }

    #[test]
    fn trailing_slash_selects_dirs() {
        let mut state = ShellState::default();
        let _dir = setup(&mut state);
        assert_eq!(expand(&state, "*/"), vec!["sub/"]);
    }

    #[test]
    fn absolute_pattern() {
        let mut state = ShellState::default();
        let dir = setup(&mut state);
        let pattern_text = format!("{}/*.log", dir.path().display());
        let expected = format!("{}/gamma.log", dir.path().display());
        assert_eq!(expand(&state, &pattern_text), vec![expected]);
    }
}
