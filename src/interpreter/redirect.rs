//! Redirection evaluation and application.
//!
//! Redirections are applied in source order onto a `CommandIo`. For
//! builtins and spawned children the io map is command-scoped and dropped
//! afterwards; `exec` uses `apply_permanent` to rewrite the shell's own
//! fds.

use std::fs::OpenOptions;
use std::os::fd::{FromRawFd, OwnedFd};

use crate::ast::{RedirOperator, RedirTarget, Redirection};

use super::errors::ExecError;
use super::expansion::{expand_word_single, expand_words};
use super::io::{string_reader_fd, CommandIo, FdSlot};
use super::state::ShellState;

/// Apply a redirection list to an io map, in order.
pub fn apply_redirections(
    state: &mut ShellState,
    io: &mut CommandIo,
    redirections: &[Redirection],
) -> Result<(), ExecError> {
    for redirection in redirections {
        apply_one(state, io, redirection)?;
    }
    Ok(())
}

fn apply_one(
    state: &mut ShellState,
    io: &mut CommandIo,
    redirection: &Redirection,
) -> Result<(), ExecError> {
    let fd = redirection.fd.unwrap_or(redirection.operator.default_fd());

    match redirection.operator {
        RedirOperator::Great | RedirOperator::Clobber => {
            let path = target_path(state, redirection)?;
            if redirection.operator == RedirOperator::Great && state.options.noclobber {
                if let Ok(meta) = std::fs::metadata(&path) {
                    if meta.is_file() {
                        return Err(ExecError::Redirect(format!(
                            "{}: cannot overwrite existing file",
                            path
                        )));
                    }
                }
            }
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .map_err(|e| ExecError::Redirect(format!("{}: {}", path, e)))?;
            io.set(fd, FdSlot::Owned(file.into()));
        }
        RedirOperator::DGreat => {
            let path = target_path(state, redirection)?;
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|e| ExecError::Redirect(format!("{}: {}", path, e)))?;
            io.set(fd, FdSlot::Owned(file.into()));
        }
        RedirOperator::Less => {
            let path = target_path(state, redirection)?;
            let file = OpenOptions::new()
                .read(true)
                .open(&path)
                .map_err(|e| ExecError::Redirect(format!("{}: {}", path, e)))?;
            io.set(fd, FdSlot::Owned(file.into()));
        }
        RedirOperator::LessGreat => {
            let path = target_path(state, redirection)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|e| ExecError::Redirect(format!("{}: {}", path, e)))?;
            io.set(fd, FdSlot::Owned(file.into()));
        }
        RedirOperator::GreatAnd | RedirOperator::LessAnd => {
            let target = target_text(state, redirection)?;
            if target == "-" {
                io.set(fd, FdSlot::Closed);
            } else if let Ok(source) = target.parse::<i32>() {
                let slot = dup_from(io, source)
                    .map_err(|e| ExecError::Redirect(format!("{}: {}", source, e)))?;
                io.set(fd, slot);
            } else if redirection.operator == RedirOperator::GreatAnd {
                // `>&word`: both stdout and stderr to the file.
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&target)
                    .map_err(|e| ExecError::Redirect(format!("{}: {}", target, e)))?;
                let dup = file
                    .try_clone()
                    .map_err(|e| ExecError::Redirect(format!("{}: {}", target, e)))?;
                io.set(1, FdSlot::Owned(file.into()));
                io.set(2, FdSlot::Owned(dup.into()));
            } else {
                return Err(ExecError::Redirect(format!("{}: ambiguous redirect", target)));
            }
        }
        RedirOperator::AndGreat | RedirOperator::AndDGreat => {
            let path = target_path(state, redirection)?;
            let mut options = OpenOptions::new();
            options.write(true).create(true);
            if redirection.operator == RedirOperator::AndGreat {
                options.truncate(true);
            } else {
                options.append(true);
            }
            let file = options
                .open(&path)
                .map_err(|e| ExecError::Redirect(format!("{}: {}", path, e)))?;
            let dup = file
                .try_clone()
                .map_err(|e| ExecError::Redirect(format!("{}: {}", path, e)))?;
            io.set(1, FdSlot::Owned(file.into()));
            io.set(2, FdSlot::Owned(dup.into()));
        }
        RedirOperator::DLess | RedirOperator::DLessDash => {
            let body = match &redirection.target {
                RedirTarget::HereDoc(doc) => expand_word_single(state, &doc.body)?,
                RedirTarget::Word(word) => expand_word_single(state, word)?,
            };
            let read_end = string_reader_fd(body)
                .map_err(|e| ExecError::Redirect(format!("here-document: {}", e)))?;
            io.set(fd, FdSlot::Owned(read_end));
        }
        RedirOperator::TLess => {
            let text = target_text(state, redirection)?;
            let read_end = string_reader_fd(format!("{}\n", text))
                .map_err(|e| ExecError::Redirect(format!("here-string: {}", e)))?;
            io.set(fd, FdSlot::Owned(read_end));
        }
    }
    Ok(())
}

/// Duplicate the current meaning of `source` (an io slot, or the shell's
/// real fd when untouched).
fn dup_from(io: &CommandIo, source: i32) -> std::io::Result<FdSlot> {
    match io.dup_slot(source)? {
        Some(slot) => Ok(slot),
        None => {
            let raw = nix::unistd::dup(source)
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            Ok(FdSlot::Owned(unsafe { OwnedFd::from_raw_fd(raw) }))
        }
    }
}

/// A redirection target expanded as a filename: exactly one field after
/// expansion, or the redirect is ambiguous.
fn target_path(state: &mut ShellState, redirection: &Redirection) -> Result<String, ExecError> {
    let word = match &redirection.target {
        RedirTarget::Word(word) => word,
        RedirTarget::HereDoc(_) => {
            return Err(ExecError::Redirect("unexpected here-document target".to_string()))
        }
    };
    let mut fields = expand_words(state, std::slice::from_ref(word))?;
    if fields.len() != 1 {
        let text = expand_word_single(state, word).unwrap_or_default();
        return Err(ExecError::Redirect(format!("{}: ambiguous redirect", text)));
    }
    let target = fields.remove(0);
    Ok(state.resolve_path(&target).to_string_lossy().into_owned())
}

/// A redirection target expanded as plain text (fd numbers, herestrings).
fn target_text(state: &mut ShellState, redirection: &Redirection) -> Result<String, ExecError> {
    match &redirection.target {
        RedirTarget::Word(word) => expand_word_single(state, word),
        RedirTarget::HereDoc(doc) => expand_word_single(state, &doc.body),
    }
}

/// `exec`-style application: rewrite the shell's real fds in place.
#[cfg(unix)]
pub fn apply_permanent(
    state: &mut ShellState,
    redirections: &[Redirection],
) -> Result<(), ExecError> {
    use std::os::fd::AsRawFd;

    let mut scratch = CommandIo::inherit();
    apply_redirections(state, &mut scratch, redirections)?;

    for redirection in redirections {
        let fd = redirection.fd.unwrap_or(redirection.operator.default_fd());
        let targets: Vec<i32> = if matches!(
            redirection.operator,
            RedirOperator::AndGreat | RedirOperator::AndDGreat
        ) {
            vec![1, 2]
        } else {
            vec![fd]
        };
        for target in targets {
            match scratch.get(target) {
                Some(FdSlot::Owned(owned)) => {
                    nix::unistd::dup2(owned.as_raw_fd(), target).map_err(|e| {
                        ExecError::Redirect(format!("cannot duplicate fd {}: {}", target, e))
                    })?;
                }
                Some(FdSlot::Closed) => {
                    let _ = nix::unistd::close(target);
                }
                None => {}
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Word;
    use std::io::{Read, Write};

    fn redir(fd: Option<i32>, op: RedirOperator, target: &str) -> Redirection {
        Redirection { fd, operator: op, target: RedirTarget::Word(Word::literal(target)) }
    }

    #[test]
    fn output_redirection_creates_file() {
        let mut state = ShellState::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut io = CommandIo::inherit();

        apply_redirections(
            &mut state,
            &mut io,
            &[redir(None, RedirOperator::Great, path.to_str().unwrap())],
        )
        .unwrap();

        io.stdout_writer().write_all(b"written").unwrap();
        drop(io);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "written");
    }

    #[test]
    fn append_redirection() {
        let mut state = ShellState::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, "one\n").unwrap();
        let mut io = CommandIo::inherit();

        apply_redirections(
            &mut state,
            &mut io,
            &[redir(None, RedirOperator::DGreat, path.to_str().unwrap())],
        )
        .unwrap();
        io.stdout_writer().write_all(b"two\n").unwrap();
        drop(io);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn noclobber_blocks_overwrite() {
        let mut state = ShellState::default();
        state.options.noclobber = true;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists");
        std::fs::write(&path, "original").unwrap();
        let mut io = CommandIo::inherit();

        let err = apply_redirections(
            &mut state,
            &mut io,
            &[redir(None, RedirOperator::Great, path.to_str().unwrap())],
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::Redirect(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");

        // >| overrides.
        apply_redirections(
            &mut state,
            &mut io,
            &[redir(None, RedirOperator::Clobber, path.to_str().unwrap())],
        )
        .unwrap();
    }

    #[test]
    fn dup_order_matters() {
        // `>file 2>&1` routes stderr into the file; `2>&1 >file` leaves
        // stderr on the original stdout.
        let mut state = ShellState::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("both");
        let mut io = CommandIo::inherit();

        apply_redirections(
            &mut state,
            &mut io,
            &[
                redir(None, RedirOperator::Great, path.to_str().unwrap()),
                redir(Some(2), RedirOperator::GreatAnd, "1"),
            ],
        )
        .unwrap();
        io.writer(2).write_all(b"err->file").unwrap();
        drop(io);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "err->file");

        let mut io = CommandIo::inherit();
        apply_redirections(
            &mut state,
            &mut io,
            &[
                redir(Some(2), RedirOperator::GreatAnd, "1"),
                redir(None, RedirOperator::Great, path.to_str().unwrap()),
            ],
        )
        .unwrap();
        // fd 2 duplicated the *original* stdout, so the file only sees
        // what fd 1 writes afterwards.
        io.stdout_writer().write_all(b"only-stdout").unwrap();
        drop(io);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "only-stdout");
    }

    #[test]
    fn close_fd() {
        let mut state = ShellState::default();
        let mut io = CommandIo::inherit();
        apply_redirections(&mut state, &mut io, &[redir(Some(1), RedirOperator::GreatAnd, "-")])
            .unwrap();
        assert!(matches!(io.get(1), Some(FdSlot::Closed)));
    }

    #[test]
    fn input_redirection_reads_file() {
        let mut state = ShellState::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in");
        std::fs::write(&path, "contents").unwrap();
        let mut io = CommandIo::inherit();

        apply_redirections(
            &mut state,
            &mut io,
            &[redir(None, RedirOperator::Less, path.to_str().unwrap())],
        )
        .unwrap();
        let mut text = String::new();
        io.stdin_reader().read_to_string(&mut text).unwrap();
        assert_eq!(text, "contents");
    }

    #[test]
    fn missing_input_file_fails() {
        let mut state = ShellState::default();
        let mut io = CommandIo::inherit();
        let err = apply_redirections(
            &mut state,
            &mut io,
            &[redir(None, RedirOperator::Less, "/no/such/file/here")],
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::Redirect(_)));
    }

    #[test]
    fn herestring_readable() {
        let mut state = ShellState::default();
        let mut io = CommandIo::inherit();
        apply_redirections(&mut state, &mut io, &[redir(None, RedirOperator::TLess, "payload")])
            .unwrap();
        let mut text = String::new();
        io.stdin_reader().read_to_string(&mut text).unwrap();
        assert_eq!(text, "payload\n");
    }
}
