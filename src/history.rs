//! History file handling.
//!
//! Append-only, newline-separated command lines; an optional timestamp
//! line with a `#` prefix precedes each entry. The file is trimmed to
//! `HISTSIZE` entries on save.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::interpreter::ShellState;

/// Where history lives: `$HISTFILE`, defaulting to `~/.den_history`.
pub fn history_path(state: &ShellState) -> Option<PathBuf> {
    if let Some(path) = state.get_string("HISTFILE") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    state
        .get_string("HOME")
        .map(|home| Path::new(&home).join(".den_history"))
}

pub fn history_size(state: &ShellState) -> usize {
    state
        .get_string("HISTSIZE")
        .and_then(|v| v.parse().ok())
        .unwrap_or(500)
}

/// Append one command line, stamped.
pub fn append_entry(path: &Path, line: &str) -> std::io::Result<()> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "#{}", chrono::Utc::now().timestamp())?;
    writeln!(file, "{}", trimmed)?;
    Ok(())
}

/// Load command lines (timestamp lines skipped), most recent last.
pub fn load_entries(path: &Path) -> Vec<String> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Rewrite the file keeping only the newest `max` entries (with their
/// timestamps).
pub fn trim_to_size(path: &Path, max: usize) -> std::io::Result<()> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Ok(());
    };

    // Group timestamp lines with the entry that follows them.
    let mut entries: Vec<Vec<&str>> = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.starts_with('#') {
            pending.push(line);
        } else {
            pending.push(line);
            entries.push(std::mem::take(&mut pending));
        }
    }

    if entries.len() <= max {
        return Ok(());
    }

    let keep = &entries[entries.len() - max..];
    let mut out = String::new();
    for entry in keep {
        for line in entry {
            out.push_str(line);
            out.push('\n');
        }
    }
    std::fs::write(path, out)
}
