//! Per-command stdio routing.
//!
//! A `CommandIo` maps file descriptors to their targets for one command:
//! absent means "inherit the shell's fd", `Owned` is a redirected or piped
//! fd, `Closed` is an explicit `n>&-`. Builtins write through the map;
//! external commands receive the fds at spawn time.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::process::Stdio;

#[derive(Debug)]
pub enum FdSlot {
    Closed,
    Owned(OwnedFd),
}

#[derive(Debug, Default)]
pub struct CommandIo {
    slots: HashMap<i32, FdSlot>,
}

impl CommandIo {
    /// Inherit everything.
    pub fn inherit() -> Self {
        CommandIo::default()
    }

    pub fn set(&mut self, fd: i32, slot: FdSlot) {
        self.slots.insert(fd, slot);
    }

    pub fn get(&self, fd: i32) -> Option<&FdSlot> {
        self.slots.get(&fd)
    }

    /// Duplicate an fd slot (for `n>&m`).
    pub fn dup_slot(&self, fd: i32) -> io::Result<Option<FdSlot>> {
        match self.slots.get(&fd) {
            None => Ok(None),
            Some(FdSlot::Closed) => Ok(Some(FdSlot::Closed)),
            Some(FdSlot::Owned(owned)) => Ok(Some(FdSlot::Owned(owned.try_clone()?))),
        }
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        let mut slots = HashMap::new();
        for (fd, slot) in &self.slots {
            let cloned = match slot {
                FdSlot::Closed => FdSlot::Closed,
                FdSlot::Owned(owned) => FdSlot::Owned(owned.try_clone()?),
            };
            slots.insert(*fd, cloned);
        }
        Ok(CommandIo { slots })
    }

    /// A writer for the given fd. Falls back to a sink when the fd is
    /// closed or cannot be duplicated.
    pub fn writer(&self, fd: i32) -> Box<dyn Write> {
        match self.slots.get(&fd) {
            Some(FdSlot::Closed) => Box::new(io::sink()),
            Some(FdSlot::Owned(owned)) => match owned.try_clone() {
                Ok(dup) => Box::new(File::from(dup)),
                Err(_) => Box::new(io::sink()),
            },
            None => match fd {
                1 => Box::new(io::stdout()),
                2 => Box::new(io::stderr()),
                _ => Box::new(io::sink()),
            },
        }
    }

    pub fn stdout_writer(&self) -> Box<dyn Write> {
        self.writer(1)
    }

    pub fn stderr_writer(&self) -> Box<dyn Write> {
        self.writer(2)
    }

    /// A reader for fd 0. `read` consumes byte-at-a-time so a shared fd is
    /// not over-read.
    pub fn stdin_reader(&self) -> Box<dyn Read> {
        match self.slots.get(&0) {
            Some(FdSlot::Closed) => Box::new(io::empty()),
            Some(FdSlot::Owned(owned)) => match owned.try_clone() {
                Ok(dup) => Box::new(File::from(dup)),
                Err(_) => Box::new(io::empty()),
            },
            None => Box::new(io::stdin()),
        }
    }

    /// The `Stdio` handed to a spawned child for this fd.
    pub fn stdio_for(&self, fd: i32) -> io::Result<Stdio> {
        Ok(match self.slots.get(&fd) {
            None => Stdio::inherit(),
            Some(FdSlot::Closed) => Stdio::null(),
            Some(FdSlot::Owned(owned)) => Stdio::from(owned.try_clone()?),
        })
    }

    /// Raw fds above 2, to be `dup2`ed into the child before exec.
    pub fn extra_raw_fds(&self) -> Vec<(i32, i32)> {
        use std::os::fd::AsRawFd;
        self.slots
            .iter()
            .filter(|(fd, _)| **fd > 2)
            .filter_map(|(fd, slot)| match slot {
                FdSlot::Owned(owned) => Some((*fd, owned.as_raw_fd())),
                FdSlot::Closed => None,
            })
            .collect()
    }
}

/// An anonymous pipe as a pair of owned fds (read, write).
#[cfg(unix)]
pub fn pipe_pair() -> io::Result<(OwnedFd, OwnedFd)> {
    use std::os::fd::FromRawFd;
    let (read_fd, write_fd) =
        nix::unistd::pipe().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    unsafe { Ok((OwnedFd::from_raw_fd(read_fd), OwnedFd::from_raw_fd(write_fd))) }
}

#[cfg(not(unix))]
pub fn pipe_pair() -> io::Result<(OwnedFd, OwnedFd)> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "pipes require unix"))
}

/// Materialize a string (heredoc body, herestring) behind a readable fd.
/// A detached writer thread feeds the pipe so large bodies cannot wedge
/// the shell before the consumer starts reading.
pub fn string_reader_fd(content: String) -> io::Result<OwnedFd> {
    let (read_end, write_end) = pipe_pair()?;
    std::thread::spawn(move || {
        let mut file = File::from(write_end);
        let _ = file.write_all(content.as_bytes());
    });
    Ok(read_end)
}

/// Drain a readable fd to a string on a helper thread; join for the result.
pub struct PipeDrain {
    handle: std::thread::JoinHandle<String>,
}

impl PipeDrain {
    pub fn start(read_end: OwnedFd) -> Self {
        let handle = std::thread::spawn(move || {
            let mut file = File::from(read_end);
            let mut buf = Vec::new();
            let _ = file.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        });
        PipeDrain { handle }
    }

    pub fn finish(self) -> String {
        self.handle.join().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_reader_round_trip() {
        let fd = string_reader_fd("hello pipe".to_string()).unwrap();
        let mut out = String::new();
        File::from(fd).read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello pipe");
    }

    #[test]
    fn drain_collects_writes() {
        let (read_end, write_end) = pipe_pair().unwrap();
        let drain = PipeDrain::start(read_end);
        {
            let mut w = File::from(write_end);
            w.write_all(b"captured").unwrap();
        }
        assert_eq!(drain.finish(), "captured");
    }

    #[test]
    fn closed_slot_writer_is_sink() {
        let mut io = CommandIo::inherit();
        io.set(1, FdSlot::Closed);
        let mut w = io.stdout_writer();
        assert!(w.write_all(b"dropped").is_ok());
    }

    #[test]
    fn owned_slot_round_trip() {
        let (read_end, write_end) = pipe_pair().unwrap();
        let mut io = CommandIo::inherit();
        io.set(1, FdSlot::Owned(write_end));
        {
            let mut w = io.stdout_writer();
            w.write_all(b"via slot").unwrap();
        }
        drop(io);
        let mut out = String::new();
        File::from(read_end).read_to_string(&mut out).unwrap();
        assert_eq!(out, "via slot");
    }
}
