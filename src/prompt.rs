//! PS1/PS2 rendering.
//!
//! Supported escapes: `\u` `\h` `\H` `\w` `\W` `\$` `\n` `\\` and the
//! zero-width `\[ … \]` brackets (their content passes through for the
//! terminal, the markers themselves are dropped).

use crate::interpreter::ShellState;

pub fn render_prompt(state: &ShellState, template: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let c = chars[i];
        i += 1;
        match c {
            'u' => out.push_str(&username()),
            'h' => {
                let host = hostname();
                out.push_str(host.split('.').next().unwrap_or(&host));
            }
            'H' => out.push_str(&hostname()),
            'w' => out.push_str(&working_dir(state, false)),
            'W' => out.push_str(&working_dir(state, true)),
            '$' => out.push(if is_root() { '#' } else { '$' }),
            'n' => out.push('\n'),
            '\\' => out.push('\\'),
            // ANSI passthrough markers are zero-width.
            '[' | ']' => {}
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

pub fn primary_prompt(state: &ShellState) -> String {
    let template = state
        .get_string("PS1")
        .unwrap_or_else(|| "\\u@\\h:\\w\\$ ".to_string());
    render_prompt(state, &template)
}

pub fn continuation_prompt(state: &ShellState) -> String {
    let template = state.get_string("PS2").unwrap_or_else(|| "> ".to_string());
    render_prompt(state, &template)
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// `\w`: cwd with `$HOME` abbreviated to `~`; `\W`: its last component.
fn working_dir(state: &ShellState, basename: bool) -> String {
    let cwd = state.cwd.display().to_string();
    let abbreviated = match state.get_string("HOME") {
        Some(home) if !home.is_empty() && cwd == home => "~".to_string(),
        Some(home) if !home.is_empty() && cwd.starts_with(&format!("{}/", home)) => {
            format!("~{}", &cwd[home.len()..])
        }
        _ => cwd,
    };
    if basename {
        if abbreviated == "~" || abbreviated == "/" {
            abbreviated
        } else {
            abbreviated
                .rsplit('/')
                .next()
                .unwrap_or(&abbreviated)
                .to_string()
        }
    } else {
        abbreviated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_passes_through() {
        let state = ShellState::default();
        assert_eq!(render_prompt(&state, "den> "), "den> ");
    }

    #[test]
    fn newline_and_backslash() {
        let state = ShellState::default();
        assert_eq!(render_prompt(&state, "a\\nb\\\\"), "a\nb\\");
    }

    #[test]
    fn home_abbreviation() {
        let mut state = ShellState::default();
        state.set_string("HOME", "/home/u".to_string()).unwrap();
        state.cwd = "/home/u/project".into();
        assert_eq!(render_prompt(&state, "\\w"), "~/project");
        assert_eq!(render_prompt(&state, "\\W"), "project");

        state.cwd = "/home/u".into();
        assert_eq!(render_prompt(&state, "\\w"), "~");
        assert_eq!(render_prompt(&state, "\\W"), "~");
    }

    #[test]
    fn ansi_markers_are_dropped() {
        let state = ShellState::default();
        assert_eq!(render_prompt(&state, "\\[\u{1b}[32m\\]$"), "\u{1b}[32m$");
    }

    #[test]
    fn unknown_escape_preserved() {
        let state = ShellState::default();
        assert_eq!(render_prompt(&state, "\\q"), "\\q");
    }
}
