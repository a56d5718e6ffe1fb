//! Async-signal-safe bridging.
//!
//! Handlers only set atomics; the main loop polls them between commands.
//! SIGINT and SIGCHLD are always flagged; signals with user traps are
//! flagged in a per-signal pending array consumed at trap checkpoints.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Once;

/// Highest signal number tracked in the pending array.
pub const MAX_SIGNAL: usize = 32;

static SIGINT_FLAG: AtomicBool = AtomicBool::new(false);
static SIGCHLD_FLAG: AtomicBool = AtomicBool::new(false);
static PENDING: [AtomicBool; MAX_SIGNAL] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const FALSE: AtomicBool = AtomicBool::new(false);
    [FALSE; MAX_SIGNAL]
};

/// Pid of the foreground child being waited on, or -1. Kept for `times`
/// style bookkeeping and debugging; signal delivery itself relies on the
/// shared terminal process group.
pub static FOREGROUND_PID: AtomicI32 = AtomicI32::new(-1);

static INIT: Once = Once::new();

/// Install the base handlers. The shell itself survives SIGINT/SIGQUIT;
/// children reset them to default before exec.
#[cfg(unix)]
pub fn install_base_handlers() {
    INIT.call_once(|| {
        unsafe {
            let _ = signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
                SIGINT_FLAG.store(true, Ordering::SeqCst);
                set_pending(signal_hook::consts::SIGINT);
            });
            let _ = signal_hook::low_level::register(signal_hook::consts::SIGCHLD, || {
                SIGCHLD_FLAG.store(true, Ordering::SeqCst);
            });
            let _ = signal_hook::low_level::register(signal_hook::consts::SIGQUIT, || {});
        }
    });
}

#[cfg(not(unix))]
pub fn install_base_handlers() {}

/// Register a handler that records `signal` for trap dispatch.
#[cfg(unix)]
pub fn watch_signal(signal: i32) {
    if !(1..MAX_SIGNAL as i32).contains(&signal) {
        return;
    }
    unsafe {
        let _ = signal_hook::low_level::register(signal, move || {
            set_pending(signal);
        });
    }
}

#[cfg(not(unix))]
pub fn watch_signal(_signal: i32) {}

fn set_pending(signal: i32) {
    if let Some(slot) = PENDING.get(signal as usize) {
        slot.store(true, Ordering::SeqCst);
    }
}

/// Check-and-clear the SIGINT flag.
pub fn take_sigint() -> bool {
    SIGINT_FLAG.swap(false, Ordering::SeqCst)
}

/// Check-and-clear the SIGCHLD flag.
pub fn take_sigchld() -> bool {
    SIGCHLD_FLAG.swap(false, Ordering::SeqCst)
}

/// Drain the pending-signal array.
pub fn take_pending_signals() -> Vec<i32> {
    let mut fired = Vec::new();
    for (signal, slot) in PENDING.iter().enumerate() {
        if slot.swap(false, Ordering::SeqCst) {
            fired.push(signal as i32);
        }
    }
    fired
}

pub fn set_foreground_pid(pid: i32) {
    FOREGROUND_PID.store(pid, Ordering::SeqCst);
}

pub fn clear_foreground_pid() {
    FOREGROUND_PID.store(-1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_check_and_clear() {
        SIGINT_FLAG.store(true, Ordering::SeqCst);
        assert!(take_sigint());
        assert!(!take_sigint());
    }

    #[test]
    fn pending_signals_drain() {
        set_pending(15);
        set_pending(1);
        let mut fired = take_pending_signals();
        fired.sort();
        assert_eq!(fired, vec![1, 15]);
        assert!(take_pending_signals().is_empty());
    }
}
