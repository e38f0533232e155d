//! The two-tier locking discipline: an optimistic, non-blocking
//! per-entry attempt that falls back to a single blocking global lock
//! when contended, plus the task-local bookkeeping (resolving stack,
//! mode, held locks) each building task carries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use parking_lot::ReentrantMutex;

use crate::error::WiringError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    None,
    Optimistic,
    Global,
}

struct TaskState {
    resolving_stack: Vec<String>,
    mode: Mode,
    held_locks: Vec<String>,
}

impl TaskState {
    fn new() -> Self {
        TaskState {
            resolving_stack: Vec::new(),
            mode: Mode::None,
            held_locks: Vec::new(),
        }
    }
}

thread_local! {
    static TASK_STATE: RefCell<TaskState> = RefCell::new(TaskState::new());
}

/// Returns true if `name` is already being built higher up the current
/// task's call stack (a dynamic cycle).
pub fn is_resolving(name: &str) -> bool {
    TASK_STATE.with(|s| s.borrow().resolving_stack.iter().any(|n| n == name))
}

pub fn resolving_path(name: &str) -> Vec<String> {
    TASK_STATE.with(|s| {
        let state = s.borrow();
        let mut path: Vec<String> = state.resolving_stack.clone();
        path.push(name.to_string());
        path
    })
}

pub fn push_resolving(name: &str) {
    TASK_STATE.with(|s| s.borrow_mut().resolving_stack.push(name.to_string()));
}

pub fn pop_resolving() {
    TASK_STATE.with(|s| {
        s.borrow_mut().resolving_stack.pop();
    });
}

fn current_mode() -> Mode {
    TASK_STATE.with(|s| s.borrow().mode)
}

fn set_mode(mode: Mode) {
    TASK_STATE.with(|s| s.borrow_mut().mode = mode);
}

fn push_held(name: &str) {
    TASK_STATE.with(|s| s.borrow_mut().held_locks.push(name.to_string()));
}

/// Releases the most recently acquired held lock's bookkeeping entry.
/// The lock itself is released by dropping its guard (RAII); this just
/// keeps `held_locks` symmetric with the guard's lifetime for
/// introspection, mirroring the source's explicit held-lock list.
fn pop_held() {
    TASK_STATE.with(|s| {
        s.borrow_mut().held_locks.pop();
    });
}

/// One-shot notification used to publish skeleton finalization to any
/// task blocked waiting on a partially-constructed entry (see
/// `skeleton.rs`). Mirrors a condvar-gated `Mutex<u32>` pattern: waiters
/// block on the condvar until the state flips to `Done`.
pub struct Notify {
    state: Mutex<NotifyState>,
    condvar: Condvar,
}

enum NotifyState {
    Pending,
    Done(Result<(), Arc<WiringError>>),
}

impl Notify {
    pub fn new() -> Self {
        Notify {
            state: Mutex::new(NotifyState::Pending),
            condvar: Condvar::new(),
        }
    }

    pub fn signal(&self, result: Result<(), Arc<WiringError>>) {
        let mut guard = self.state.lock().unwrap();
        *guard = NotifyState::Done(result);
        self.condvar.notify_all();
    }

    /// Blocks until finalized, returning the recorded outcome.
    pub fn wait(&self) -> Result<(), Arc<WiringError>> {
        let guard = self.state.lock().unwrap();
        let guard = self
            .condvar
            .wait_while(guard, |s| matches!(s, NotifyState::Pending))
            .unwrap();
        match &*guard {
            NotifyState::Done(result) => result.clone(),
            NotifyState::Pending => unreachable!(),
        }
    }
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the per-entry reentrant lock map and the single global
/// reentrant lock, and drives the optimistic → global fallback
/// protocol described in `SPEC_FULL.md` §4.5.
pub struct LockTable {
    attr_locks: Mutex<HashMap<String, Arc<ReentrantMutex<()>>>>,
    global_lock: ReentrantMutex<()>,
    pub max_lock_attempts: usize,
    pub lock_retry_sleep: Duration,
}

impl LockTable {
    pub fn new(max_lock_attempts: usize, lock_retry_sleep: Duration) -> Self {
        LockTable {
            attr_locks: Mutex::new(HashMap::new()),
            global_lock: ReentrantMutex::new(()),
            max_lock_attempts,
            lock_retry_sleep,
        }
    }

    fn lock_for(&self, name: &str) -> Arc<ReentrantMutex<()>> {
        let mut map = self.attr_locks.lock().unwrap();
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone()
    }

    /// Runs `body` under the two-tier lock for `name`, with
    /// double-checked caching via `already_built`. `already_built` is
    /// re-polled after every lock acquisition so a value published by
    /// a concurrent task short-circuits the rest of the build.
    ///
    /// `body` may run more than once: a nested optimistic lock deeper
    /// in the call tree can fail with `LockUnavailable` after partial
    /// progress, in which case the *top-level* build for `name` retries
    /// from scratch once this task is serialized by the global lock.
    pub fn with_entry_lock<T>(
        &self,
        name: &str,
        already_built: impl Fn() -> Option<T>,
        body: impl Fn() -> Result<T, WiringError>,
    ) -> Result<T, WiringError> {
        if let Some(v) = already_built() {
            return Ok(v);
        }

        let lock = self.lock_for(name);

        // Already serialized by an outer global-mode build on this
        // task: acquire this entry's lock blocking, same as §4.5 step 5.
        if current_mode() == Mode::Global {
            let guard = lock.lock();
            push_held(name);
            let result = already_built().map(Ok).unwrap_or_else(&body);
            drop(guard);
            pop_held();
            return result;
        }

        // Optimistic: non-blocking try-lock. Saves and restores the
        // prior mode rather than resetting to `None` unconditionally,
        // since this call may itself be nested inside an outer
        // optimistic frame that hasn't finished yet.
        if let Some(guard) = lock.try_lock() {
            let previous_mode = current_mode();
            set_mode(Mode::Optimistic);
            push_held(name);
            let result = already_built().map(Ok).unwrap_or_else(&body);
            drop(guard);
            pop_held();
            set_mode(previous_mode);
            match result {
                Err(WiringError::LockUnavailable { .. }) => {
                    // Our own lock was free, but a nested optimistic
                    // build deeper in the call tree hit contention:
                    // fall through to the same global-serialized retry
                    // path as an outright try_lock failure below,
                    // rather than leaking the internal signal.
                }
                other => return other,
            }
        } else if current_mode() == Mode::Optimistic {
            // Nested optimistic build hit contention itself: bubble up
            // as the internal-only signal so the *caller's* top-level
            // build can fall back to global mode.
            return Err(WiringError::LockUnavailable {
                name: name.to_string(),
            });
        }

        // Fallback: acquire global first, then this entry, both
        // blocking, with bounded retry against the rare remaining race
        // where a nested optimistic attempt elsewhere still reports
        // contention.
        let _global_guard = self.global_lock.lock();
        set_mode(Mode::Global);
        let mut attempts = 0usize;
        let outcome = loop {
            if let Some(v) = already_built() {
                break Ok(v);
            }
            let guard = lock.lock();
            push_held(name);
            let result = already_built().map(Ok).unwrap_or_else(&body);
            drop(guard);
            pop_held();
            match result {
                Err(WiringError::LockUnavailable { .. }) if attempts < self.max_lock_attempts => {
                    attempts += 1;
                    std::thread::sleep(self.lock_retry_sleep);
                    continue;
                }
                Err(WiringError::LockUnavailable { name }) => {
                    break Err(WiringError::wiring(
                        name.clone(),
                        std::io::Error::other(format!("failed to instantiate '{name}'")),
                    ));
                }
                other => break other,
            }
        };
        set_mode(Mode::None);
        outcome
    }
}
