//! Background job table.
//!
//! Jobs are either OS children (external pipelines launched with `&`) or
//! shell-side threads (builtin/compound statements run against a cloned
//! state). Reaping is opportunistic: the executor polls between commands
//! whenever SIGCHLD was flagged, and `wait` blocks until completion.

use std::fmt;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done(i32),
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "Running"),
            JobState::Done(0) => write!(f, "Done"),
            JobState::Done(code) => write!(f, "Exit {}", code),
            JobState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug)]
pub struct Job {
    pub id: usize,
    /// Real pid for process jobs; synthetic for thread jobs.
    pub pid: u32,
    /// Process group: the leader pid for process jobs.
    pub pgid: u32,
    pub command: String,
    pub state: JobState,
    /// Present for thread jobs until joined.
    pub handle: Option<JoinHandle<i32>>,
    /// True once the terminal notification was printed.
    pub notified: bool,
}

impl Job {
    pub fn is_done(&self) -> bool {
        matches!(self.state, JobState::Done(_))
    }
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
    /// Synthetic pid counter for thread jobs.
    next_virtual_pid: u32,
}

/// Subshell clones start with an empty table; jobs never flow back.
impl Clone for JobTable {
    fn clone(&self) -> Self {
        JobTable::default()
    }
}

impl JobTable {
    pub fn add_process(&mut self, pid: u32, command: String) -> usize {
        self.next_id += 1;
        self.jobs.push(Job {
            id: self.next_id,
            pid,
            pgid: pid,
            command,
            state: JobState::Running,
            handle: None,
            notified: false,
        });
        self.next_id
    }

    pub fn add_thread(&mut self, handle: JoinHandle<i32>, command: String) -> (usize, u32) {
        self.next_id += 1;
        self.next_virtual_pid += 1;
        let pid = 90000 + self.next_virtual_pid;
        self.jobs.push(Job {
            id: self.next_id,
            pid,
            pgid: pid,
            command,
            state: JobState::Running,
            handle: Some(handle),
            notified: false,
        });
        (self.next_id, pid)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// `%n`, `%%`/`%+` (current), or a pid.
    pub fn resolve_spec(&self, spec: &str) -> Option<usize> {
        if let Some(rest) = spec.strip_prefix('%') {
            match rest {
                "%" | "+" | "" => return self.jobs.iter().filter(|j| !j.is_done()).map(|j| j.id).max(),
                "-" => {
                    let mut running: Vec<usize> =
                        self.jobs.iter().filter(|j| !j.is_done()).map(|j| j.id).collect();
                    running.pop();
                    return running.pop();
                }
                _ => return rest.parse::<usize>().ok().filter(|id| self.get(*id).is_some()),
            }
        }
        let pid: u32 = spec.parse().ok()?;
        self.jobs.iter().find(|j| j.pid == pid).map(|j| j.id)
    }

    /// Poll every running job without blocking, updating states.
    pub fn reap(&mut self) {
        for job in &mut self.jobs {
            if job.is_done() {
                continue;
            }
            if let Some(handle) = &job.handle {
                if handle.is_finished() {
                    let handle = job.handle.take().unwrap();
                    let status = handle.join().unwrap_or(1);
                    job.state = JobState::Done(status);
                }
                continue;
            }
            match poll_pid(job.pid) {
                Some(PidStatus::Exited(code)) => job.state = JobState::Done(code),
                Some(PidStatus::Signaled(sig)) => job.state = JobState::Done(128 + sig),
                Some(PidStatus::Stopped) => job.state = JobState::Stopped,
                None => {}
            }
        }
    }

    /// Block until the given job finishes; returns its exit status.
    pub fn wait_job(&mut self, id: usize) -> Option<i32> {
        let job = self.jobs.iter_mut().find(|j| j.id == id)?;
        if let JobState::Done(code) = job.state {
            return Some(code);
        }
        if let Some(handle) = job.handle.take() {
            let status = handle.join().unwrap_or(1);
            job.state = JobState::Done(status);
            return Some(status);
        }
        let status = wait_pid_blocking(job.pid);
        job.state = JobState::Done(status);
        Some(status)
    }

    /// Wait for every job; returns the status of the last one waited.
    pub fn wait_all(&mut self) -> i32 {
        let ids: Vec<usize> = self.jobs.iter().filter(|j| !j.is_done()).map(|j| j.id).collect();
        let mut last = 0;
        for id in ids {
            if let Some(status) = self.wait_job(id) {
                last = status;
            }
        }
        last
    }

    /// Drop finished jobs that have been reported.
    pub fn prune(&mut self) {
        self.jobs.retain(|j| !(j.is_done() && j.notified));
    }

    /// Finished-but-unreported jobs, marking them reported.
    pub fn take_notifications(&mut self) -> Vec<(usize, String, JobState)> {
        let mut out = Vec::new();
        for job in &mut self.jobs {
            if job.is_done() && !job.notified {
                job.notified = true;
                out.push((job.id, job.command.clone(), job.state));
            }
        }
        out
    }
}

enum PidStatus {
    Exited(i32),
    Signaled(i32),
    Stopped,
}

#[cfg(unix)]
fn poll_pid(pid: u32) -> Option<PidStatus> {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;

    match waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
        Ok(WaitStatus::Exited(_, code)) => Some(PidStatus::Exited(code)),
        Ok(WaitStatus::Signaled(_, sig, _)) => Some(PidStatus::Signaled(sig as i32)),
        Ok(WaitStatus::Stopped(_, _)) => Some(PidStatus::Stopped),
        Ok(WaitStatus::StillAlive) => None,
        Ok(_) => None,
        // Already reaped or not our child.
        Err(_) => Some(PidStatus::Exited(127)),
    }
}

#[cfg(not(unix))]
fn poll_pid(_pid: u32) -> Option<PidStatus> {
    None
}

#[cfg(unix)]
fn wait_pid_blocking(pid: u32) -> i32 {
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::Pid;

    match waitpid(Pid::from_raw(pid as i32), None) {
        Ok(WaitStatus::Exited(_, code)) => code,
        Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
        _ => 127,
    }
}

#[cfg(not(unix))]
fn wait_pid_blocking(_pid: u32) -> i32 {
    127
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_job_lifecycle() {
        let mut table = JobTable::default();
        let handle = std::thread::spawn(|| 7);
        let (id, pid) = table.add_thread(handle, "fake job".to_string());
        assert!(pid >= 90000);
        assert_eq!(table.wait_job(id), Some(7));
        assert!(table.get(id).unwrap().is_done());
    }

    #[test]
    fn resolve_specs() {
        let mut table = JobTable::default();
        let h1 = std::thread::spawn(|| 0);
        let h2 = std::thread::spawn(|| 0);
        let (id1, _) = table.add_thread(h1, "one".to_string());
        let (id2, pid2) = table.add_thread(h2, "two".to_string());

        assert_eq!(table.resolve_spec(&format!("%{}", id1)), Some(id1));
        assert_eq!(table.resolve_spec("%%"), Some(id2));
        assert_eq!(table.resolve_spec(&pid2.to_string()), Some(id2));
        assert_eq!(table.resolve_spec("%99"), None);
    }

    #[test]
    fn notifications_reported_once() {
        let mut table = JobTable::default();
        let handle = std::thread::spawn(|| 0);
        let (id, _) = table.add_thread(handle, "job".to_string());
        table.wait_job(id);
        assert_eq!(table.take_notifications().len(), 1);
        assert!(table.take_notifications().is_empty());
        table.prune();
        assert!(table.get(id).is_none());
    }

    #[test]
    fn clone_is_empty() {
        let mut table = JobTable::default();
        let handle = std::thread::spawn(|| 0);
        table.add_thread(handle, "job".to_string());
        let clone = table.clone();
        assert!(clone.jobs().is_empty());
    }
}
