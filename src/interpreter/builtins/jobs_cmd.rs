//! Job-control builtins: `jobs`, `wait`, `kill`, `fg`, `bg`.

use std::io::Write;

use crate::interpreter::errors::ExecError;
use crate::interpreter::io::CommandIo;
use crate::interpreter::state::ShellState;
use crate::interpreter::traps::{parse_condition, signal_name, TrapCondition};

use super::fail;

pub fn jobs(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let long = args.iter().any(|a| a == "-l");
    state.jobs.reap();

    let mut out = io.stdout_writer();
    for job in state.jobs.jobs() {
        if long {
            let _ = writeln!(out, "[{}] {} {}  {}", job.id, job.pid, job.state, job.command);
        } else {
            let _ = writeln!(out, "[{}]  {}  {}", job.id, job.state, job.command);
        }
    }
    state.jobs.prune();
    Ok(0)
}

pub fn wait(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.is_empty() {
        let status = state.jobs.wait_all();
        return Ok(status);
    }

    let mut status = 0;
    for spec in args {
        match state.jobs.resolve_spec(spec) {
            Some(id) => {
                status = state.jobs.wait_job(id).unwrap_or(127);
            }
            None => {
                // An unknown plain pid may still be a direct child.
                status = fail(io, "wait", format!("{}: no such job", spec), 127);
            }
        }
    }
    Ok(status)
}

pub fn kill(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if args.first().map(|s| s.as_str()) == Some("-l") {
        let mut out = io.stdout_writer();
        for n in 1..=22 {
            if let Some(name) = signal_name(n) {
                let _ = writeln!(out, "{:>2}) SIG{}", n, name);
            }
        }
        return Ok(0);
    }

    let mut signal = 15; // SIGTERM
    let mut index = 0;
    while let Some(arg) = args.get(index) {
        if arg == "-s" {
            index += 1;
            if let Some(name) = args.get(index) {
                match parse_condition(name) {
                    Some(TrapCondition::Signal(n)) => signal = n,
                    _ => return Ok(fail(io, "kill", format!("{}: invalid signal", name), 1)),
                }
            }
            index += 1;
        } else if let Some(rest) = arg.strip_prefix('-') {
            if rest == "-" {
                index += 1;
                break;
            }
            match rest.parse::<i32>().ok().or_else(|| match parse_condition(rest) {
                Some(TrapCondition::Signal(n)) => Some(n),
                _ => None,
            }) {
                Some(n) => signal = n,
                None => return Ok(fail(io, "kill", format!("{}: invalid signal", rest), 1)),
            }
            index += 1;
        } else {
            break;
        }
    }

    if args[index..].is_empty() {
        return Ok(fail(io, "kill", "usage: kill [-s SIG | -SIG] pid | %job …", 2));
    }

    let mut status = 0;
    for target in &args[index..] {
        let pid = if target.starts_with('%') {
            match state.jobs.resolve_spec(target) {
                Some(id) => state.jobs.get(id).map(|j| j.pid),
                None => None,
            }
        } else {
            target.parse::<u32>().ok()
        };

        match pid {
            Some(pid) => {
                if send_signal(pid, signal).is_err() {
                    status = fail(io, "kill", format!("({}) - No such process", pid), 1);
                }
            }
            None => {
                status = fail(io, "kill", format!("{}: no such job", target), 1);
            }
        }
    }
    Ok(status)
}

fn send_signal(pid: u32, signal: i32) -> Result<(), ()> {
    use nix::sys::signal::{kill as nix_kill, Signal};
    use nix::unistd::Pid;

    let signal = Signal::try_from(signal).map_err(|_| ())?;
    nix_kill(Pid::from_raw(pid as i32), signal).map_err(|_| ())
}

/// `fg`: bring a background job forward by blocking on it.
pub fn fg(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let spec = args.first().map(|s| s.as_str()).unwrap_or("%%");
    let Some(id) = state.jobs.resolve_spec(spec) else {
        return Ok(fail(io, "fg", format!("{}: no such job", spec), 1));
    };

    if let Some(job) = state.jobs.get(id) {
        let mut out = io.stdout_writer();
        let _ = writeln!(out, "{}", job.command);
        // Resume in case it was stopped.
        let _ = send_signal(job.pid, 18); // SIGCONT
    }
    Ok(state.jobs.wait_job(id).unwrap_or(127))
}

/// `bg`: resume a stopped job in the background.
pub fn bg(
    state: &mut ShellState,
    _name: &str,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let spec = args.first().map(|s| s.as_str()).unwrap_or("%%");
    let Some(id) = state.jobs.resolve_spec(spec) else {
        return Ok(fail(io, "bg", format!("{}: no such job", spec), 1));
    };

    if let Some(job) = state.jobs.get_mut(id) {
        let _ = send_signal(job.pid, 18); // SIGCONT
        job.state = crate::interpreter::jobs::JobState::Running;
        let mut out = io.stdout_writer();
        let _ = writeln!(out, "[{}] {} &", job.id, job.command);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_with_no_jobs_is_zero() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        assert_eq!(wait(&mut state, "wait", &[], &io).unwrap(), 0);
    }

    #[test]
    fn wait_for_thread_job() {
        let mut state = ShellState::default();
        let handle = std::thread::spawn(|| 5);
        let (id, _) = state.jobs.add_thread(handle, "demo".to_string());
        let io = CommandIo::inherit();
        assert_eq!(
            wait(&mut state, "wait", &[format!("%{}", id)], &io).unwrap(),
            5
        );
    }

    #[test]
    fn kill_unknown_job_fails() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        assert_eq!(
            kill(&mut state, "kill", &["%42".to_string()], &io).unwrap(),
            1
        );
    }

    #[test]
    fn kill_requires_target() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        assert_eq!(kill(&mut state, "kill", &[], &io).unwrap(), 2);
    }

    #[test]
    fn fg_missing_job_fails() {
        let mut state = ShellState::default();
        let io = CommandIo::inherit();
        assert_eq!(fg(&mut state, "fg", &[], &io).unwrap(), 1);
    }
}
