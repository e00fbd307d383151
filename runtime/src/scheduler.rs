//! Round-robin scheduling with no quantum: one instruction per step,
//! then rotate. Timer states are driven by the step counter, not wall
//! time, so interleaving is reproducible.

use crate::thread::{ThreadStatus, WaitTarget};
use crate::vm::VmState;
use tracing_log::log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into `threads` of the thread to run this step.
    Thread(usize),
    /// Nothing runnable, but timers may still fire: burn a step.
    Waiting,
    AllTerminated,
}

/// Promotes timer- and join-waiters whose condition has been met.
pub fn tick_threads(state: &mut VmState) {
    let step = state.step_number;
    let terminated: Vec<_> = state
        .threads
        .iter()
        .filter(|t| t.status == ThreadStatus::Terminated)
        .map(|t| t.id)
        .collect();
    let known: Vec<_> = state.threads.iter().map(|t| t.id).collect();

    for thread in &mut state.threads {
        match thread.status {
            ThreadStatus::TimedWaiting => {
                if thread.sleep_until_step.is_some_and(|until| until <= step) {
                    thread.status = ThreadStatus::Runnable;
                    thread.sleep_until_step = None;
                }
            }
            ThreadStatus::Waiting => {
                if let Some(WaitTarget::ThreadExit(target)) = thread.wait_target {
                    if terminated.contains(&target) || !known.contains(&target) {
                        thread.status = ThreadStatus::Runnable;
                        thread.wait_target = None;
                    }
                }
            }
            _ => {}
        }
    }
}

/// Picks the thread for this step: the current active thread if it is
/// still schedulable, otherwise the next schedulable one round-robin.
pub fn select_executable(state: &mut VmState) -> Selection {
    if state.threads.is_empty() {
        return Selection::AllTerminated;
    }
    let n = state.threads.len();
    let start = state.active_thread.min(n - 1);
    for offset in 0..n {
        let idx = (start + offset) % n;
        if state.threads[idx].is_schedulable() {
            state.active_thread = idx;
            return Selection::Thread(idx);
        }
    }
    if state
        .threads
        .iter()
        .all(|t| t.status == ThreadStatus::Terminated)
    {
        Selection::AllTerminated
    } else {
        debug!("no runnable thread at step {}", state.step_number);
        Selection::Waiting
    }
}

/// Rotates the active thread to the next schedulable one after the
/// current, in declaration order.
pub fn rotate(state: &mut VmState) {
    let n = state.threads.len();
    if n == 0 {
        return;
    }
    let start = state.active_thread;
    for offset in 1..=n {
        let idx = (start + offset) % n;
        if state.threads[idx].is_schedulable() {
            state.active_thread = idx;
            return;
        }
    }
}

/// Termination housekeeping: every held monitor is released, each
/// release waking one blocked waiter.
pub fn release_all_monitors(state: &mut VmState, thread_idx: usize) {
    let Some(thread) = state.threads.get(thread_idx) else {
        return;
    };
    let id = thread.id;
    let held = thread.holding_monitors.clone();
    for monitor in held {
        state.exit_monitor(monitor, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{ThreadId, ThreadState};

    fn state_with(statuses: &[ThreadStatus]) -> VmState {
        let mut state = VmState::new();
        for (i, status) in statuses.iter().enumerate() {
            let mut thread = ThreadState::new(ThreadId(i), format!("t{}", i));
            thread.status = *status;
            state.threads.push(thread);
        }
        state
    }

    #[test]
    fn rotation_is_strict_round_robin() {
        let mut state = state_with(&[ThreadStatus::Runnable, ThreadStatus::Runnable]);
        assert_eq!(select_executable(&mut state), Selection::Thread(0));
        rotate(&mut state);
        assert_eq!(select_executable(&mut state), Selection::Thread(1));
        rotate(&mut state);
        assert_eq!(select_executable(&mut state), Selection::Thread(0));
    }

    #[test]
    fn blocked_threads_are_skipped() {
        let mut state = state_with(&[ThreadStatus::Blocked, ThreadStatus::Runnable]);
        assert_eq!(select_executable(&mut state), Selection::Thread(1));
    }

    #[test]
    fn sleepers_leave_a_waiting_step() {
        let mut state = state_with(&[ThreadStatus::TimedWaiting]);
        state.threads[0].sleep_until_step = Some(5);
        assert_eq!(select_executable(&mut state), Selection::Waiting);
        state.step_number = 5;
        tick_threads(&mut state);
        assert_eq!(select_executable(&mut state), Selection::Thread(0));
    }

    #[test]
    fn join_waiter_wakes_on_target_termination() {
        let mut state = state_with(&[ThreadStatus::Waiting, ThreadStatus::Terminated]);
        state.threads[0].wait_target = Some(WaitTarget::ThreadExit(ThreadId(1)));
        tick_threads(&mut state);
        assert_eq!(state.threads[0].status, ThreadStatus::Runnable);
    }

    #[test]
    fn join_waiter_wakes_on_missing_target() {
        let mut state = state_with(&[ThreadStatus::Waiting]);
        state.threads[0].wait_target = Some(WaitTarget::ThreadExit(ThreadId(9)));
        tick_threads(&mut state);
        assert_eq!(state.threads[0].status, ThreadStatus::Runnable);
    }

    #[test]
    fn all_terminated_is_reported() {
        let mut state = state_with(&[ThreadStatus::Terminated, ThreadStatus::Terminated]);
        assert_eq!(select_executable(&mut state), Selection::AllTerminated);
    }
}
