//! Tilde expansion: `~`, `~user`.

use crate::interpreter::state::ShellState;

/// Expand a tilde prefix. `~` is `$HOME`; `~user` is that user's home
/// directory from the passwd database. Unknown users leave the text as
/// written.
pub fn expand_tilde(state: &ShellState, user: Option<&str>) -> String {
    match user {
        None => state
            .get_string("HOME")
            .unwrap_or_else(|| "~".to_string()),
        Some(name) => match lookup_home(name) {
            Some(home) => home,
            None => format!("~{}", name),
        },
    }
}

/// Minimal passwd lookup: scan `/etc/passwd` for the user's home field.
fn lookup_home(user: &str) -> Option<String> {
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    for line in passwd.lines() {
        let mut fields = line.split(':');
        if fields.next() == Some(user) {
            return fields.nth(4).map(|s| s.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_tilde_uses_home() {
        let mut state = ShellState::default();
        state.set_string("HOME", "/home/tester".to_string()).unwrap();
        assert_eq!(expand_tilde(&state, None), "/home/tester");
    }

    #[test]
    fn unknown_user_stays_literal() {
        let state = ShellState::default();
        assert_eq!(expand_tilde(&state, Some("no-such-user-zz")), "~no-such-user-zz");
    }

    #[test]
    fn root_home_from_passwd() {
        // Present on any unix CI machine.
        if std::path::Path::new("/etc/passwd").exists() {
            let state = ShellState::default();
            let home = expand_tilde(&state, Some("root"));
            assert!(home.starts_with('/'), "got {}", home);
        }
    }
}
