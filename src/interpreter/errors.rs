//! Executor control flow and failure types.
//!
//! `break`, `continue`, `return` and `exit` unwind through the execution
//! stack as errors; the construct that handles them stops the propagation.
//! Expansion and redirection failures abort the current command only.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    /// `break [n]` — exits n enclosing loops.
    #[error("break")]
    Break(u32),

    /// `continue [n]` — resumes the nth enclosing loop.
    #[error("continue")]
    Continue(u32),

    /// `return [n]` — exits the current function or sourced file.
    #[error("return")]
    Return(i32),

    /// `exit [n]` — terminates the shell.
    #[error("exit")]
    Exit(i32),

    /// errexit tripped: the shell must exit with this status.
    #[error("command exited with status {0}")]
    Errexit(i32),

    /// Expansion failure (nounset, bad substitution, arithmetic error,
    /// `${VAR:?}`, failglob). Aborts the command with the given status.
    #[error("{message}")]
    Expansion { message: String, status: i32 },

    /// Redirection failure. Aborts the command with status 1.
    #[error("{0}")]
    Redirect(String),

    /// Unrecoverable internal failure (fork/pipe exhaustion).
    #[error("{0}")]
    Fatal(String),
}

impl ExecError {
    pub fn expansion(message: impl Into<String>) -> Self {
        ExecError::Expansion { message: message.into(), status: 1 }
    }

    /// The command-level exit status this error maps to, for the variants
    /// that abort a command rather than unwind the shell.
    pub fn command_status(&self) -> Option<i32> {
        match self {
            ExecError::Expansion { status, .. } => Some(*status),
            ExecError::Redirect(_) => Some(1),
            _ => None,
        }
    }
}
