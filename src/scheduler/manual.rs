//! Deterministic host scheduler with a virtual clock.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{CallbackId, HostScheduler, Millis, SchedulerPriority};

#[derive(Debug, Default)]
struct ManualState {
    now: Millis,
    next_id: u64,
    queue: Vec<(CallbackId, SchedulerPriority)>,
}

/// Virtual clock plus a priority ordered callback queue.
///
/// Cloning shares the same state, so a test can keep a handle to advance
/// time while the reconciler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ManualState) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: Millis) {
        self.with_state(|s| s.now += ms);
    }

    /// Set the clock, backwards included.
    pub fn set_time(&self, ms: Millis) {
        self.with_state(|s| s.now = ms);
    }

    pub fn current_time(&self) -> Millis {
        self.with_state(|s| s.now)
    }

    /// Number of outstanding callbacks.
    pub fn pending(&self) -> usize {
        self.with_state(|s| s.queue.len())
    }

    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }

    /// Take the most urgent callback, first requested first within a priority.
    pub fn pop_next(&self) -> Option<(CallbackId, SchedulerPriority)> {
        self.with_state(|s| {
            let (pos, _) = s
                .queue
                .iter()
                .enumerate()
                .min_by_key(|(i, (_, priority))| (*priority, *i))?;
            Some(s.queue.remove(pos))
        })
    }
}

impl HostScheduler for ManualScheduler {
    fn now(&self) -> Millis {
        self.current_time()
    }

    fn schedule_callback(&mut self, priority: SchedulerPriority) -> CallbackId {
        self.with_state(|s| {
            let id = CallbackId(s.next_id);
            s.next_id += 1;
            s.queue.push((id, priority));
            id
        })
    }

    fn cancel_callback(&mut self, id: CallbackId) {
        self.with_state(|s| s.queue.retain(|(queued, _)| *queued != id));
    }
}
