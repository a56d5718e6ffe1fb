//! Trap table: EXIT, ERR, DEBUG and signal traps.
//!
//! The executor fires ERR after any command whose failure would trigger
//! errexit, DEBUG before each simple command, signal traps at checkpoints
//! between commands, and EXIT exactly once at shell teardown.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct TrapState {
    pub exit: Option<String>,
    pub err: Option<String>,
    pub debug: Option<String>,
    /// signal number → trap command. An empty string means SIG_IGN.
    pub signals: HashMap<i32, String>,
    /// EXIT has fired; it never fires twice.
    pub exit_fired: bool,
    /// A trap body is currently executing (suppresses recursive ERR/DEBUG).
    pub running: bool,
}

/// The non-signal trap conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCondition {
    Exit,
    Err,
    Debug,
    Signal(i32),
}

/// Parse a trap condition name or number: `EXIT`, `ERR`, `DEBUG`, `0`,
/// `INT`, `SIGINT`, `2`…
pub fn parse_condition(name: &str) -> Option<TrapCondition> {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "EXIT" | "0" => return Some(TrapCondition::Exit),
        "ERR" => return Some(TrapCondition::Err),
        "DEBUG" => return Some(TrapCondition::Debug),
        _ => {}
    }
    if let Ok(num) = name.parse::<i32>() {
        if (1..crate::interpreter::signals::MAX_SIGNAL as i32).contains(&num) {
            return Some(TrapCondition::Signal(num));
        }
        return None;
    }
    signal_number(upper.strip_prefix("SIG").unwrap_or(&upper)).map(TrapCondition::Signal)
}

/// Name → number for the common signal set.
pub fn signal_number(name: &str) -> Option<i32> {
    Some(match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "TRAP" => 5,
        "ABRT" => 6,
        "BUS" => 7,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        "CHLD" => 17,
        "CONT" => 18,
        "STOP" => 19,
        "TSTP" => 20,
        "TTIN" => 21,
        "TTOU" => 22,
        _ => return None,
    })
}

/// Number → name, for `trap -l` style listings and diagnostics.
pub fn signal_name(number: i32) -> Option<&'static str> {
    Some(match number {
        1 => "HUP",
        2 => "INT",
        3 => "QUIT",
        4 => "ILL",
        5 => "TRAP",
        6 => "ABRT",
        7 => "BUS",
        8 => "FPE",
        9 => "KILL",
        10 => "USR1",
        11 => "SEGV",
        12 => "USR2",
        13 => "PIPE",
        14 => "ALRM",
        15 => "TERM",
        17 => "CHLD",
        18 => "CONT",
        19 => "STOP",
        20 => "TSTP",
        21 => "TTIN",
        22 => "TTOU",
        _ => return None,
    })
}

impl TrapState {
    pub fn get(&self, condition: TrapCondition) -> Option<&str> {
        match condition {
            TrapCondition::Exit => self.exit.as_deref(),
            TrapCondition::Err => self.err.as_deref(),
            TrapCondition::Debug => self.debug.as_deref(),
            TrapCondition::Signal(n) => self.signals.get(&n).map(|s| s.as_str()),
        }
    }

    pub fn set(&mut self, condition: TrapCondition, command: Option<String>) {
        match condition {
            TrapCondition::Exit => self.exit = command,
            TrapCondition::Err => self.err = command,
            TrapCondition::Debug => self.debug = command,
            TrapCondition::Signal(n) => {
                match command {
                    Some(cmd) => {
                        crate::interpreter::signals::watch_signal(n);
                        self.signals.insert(n, cmd);
                    }
                    None => {
                        self.signals.remove(&n);
                    }
                }
            }
        }
    }

    /// (display-name, command) pairs for `trap -p`.
    pub fn listing(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(cmd) = &self.exit {
            out.push(("EXIT".to_string(), cmd.clone()));
        }
        if let Some(cmd) = &self.err {
            out.push(("ERR".to_string(), cmd.clone()));
        }
        if let Some(cmd) = &self.debug {
            out.push(("DEBUG".to_string(), cmd.clone()));
        }
        let mut signals: Vec<(&i32, &String)> = self.signals.iter().collect();
        signals.sort_by_key(|(n, _)| **n);
        for (n, cmd) in signals {
            let name = signal_name(*n)
                .map(|s| format!("SIG{}", s))
                .unwrap_or_else(|| n.to_string());
            out.push((name, cmd.clone()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parsing() {
        assert_eq!(parse_condition("EXIT"), Some(TrapCondition::Exit));
        assert_eq!(parse_condition("0"), Some(TrapCondition::Exit));
        assert_eq!(parse_condition("err"), Some(TrapCondition::Err));
        assert_eq!(parse_condition("INT"), Some(TrapCondition::Signal(2)));
        assert_eq!(parse_condition("SIGTERM"), Some(TrapCondition::Signal(15)));
        assert_eq!(parse_condition("15"), Some(TrapCondition::Signal(15)));
        assert_eq!(parse_condition("NOSUCH"), None);
    }

    #[test]
    fn set_get_reset() {
        let mut traps = TrapState::default();
        traps.set(TrapCondition::Exit, Some("echo bye".to_string()));
        assert_eq!(traps.get(TrapCondition::Exit), Some("echo bye"));
        traps.set(TrapCondition::Exit, None);
        assert_eq!(traps.get(TrapCondition::Exit), None);
    }

    #[test]
    fn listing_order() {
        let mut traps = TrapState::default();
        traps.set(TrapCondition::Signal(15), Some("cleanup".to_string()));
        traps.set(TrapCondition::Exit, Some("bye".to_string()));
        let listing = traps.listing();
        assert_eq!(listing[0].0, "EXIT");
        assert_eq!(listing[1].0, "SIGTERM");
    }
}
