//! Scheduler bridge: the reconciler's view of the host task scheduler.
//!
//! Only the host's *contract* is consumed ([`HostScheduler`]): a monotonic
//! clock and a way to request (and cancel) a callback at a priority. The
//! host calls [`Reconciler::perform_work`](crate::Reconciler::perform_work)
//! when a requested callback fires.
//!
//! [`SchedulerBridge`] wraps the host and answers `should_yield` for the
//! walker: yield once the time slice is spent, or once a higher priority
//! update has bumped the interrupt counter since the pass started. A host
//! clock that stands still for too many checks also ends the slice, so a
//! broken clock cannot keep a sliced pass from ever yielding.

mod manual;

pub use manual::ManualScheduler;

use tracing::{trace, warn};

use crate::error::{FiberError, FiberResult};

/// Host time in milliseconds.
pub type Millis = u64;

// =============================================================================
// Host contract
// =============================================================================

/// Priority of a host callback, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

/// Host-issued handle for a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// Task scheduling primitives supplied by the host.
pub trait HostScheduler {
    /// Monotonic clock.
    fn now(&self) -> Millis;

    /// Request one call to `perform_work` at `priority`.
    fn schedule_callback(&mut self, priority: SchedulerPriority) -> CallbackId;

    /// Withdraw a request. Unknown or already fired ids are ignored.
    fn cancel_callback(&mut self, id: CallbackId);
}

// =============================================================================
// SchedulerBridge
// =============================================================================

/// Yield decisions and callback bookkeeping on top of a [`HostScheduler`].
#[derive(Debug)]
pub struct SchedulerBridge<S> {
    host: S,
    time_slice: Millis,
    last_now: Millis,
    slice_start: Millis,
    interrupts: u64,
    scheduled: Option<(CallbackId, SchedulerPriority)>,
    /// Checks in the current slice that saw no time pass.
    frozen_checks: usize,
    max_frozen_checks: usize,
    stalled_slices: u64,
}

impl<S: HostScheduler> SchedulerBridge<S> {
    pub fn new(host: S, time_slice: Millis) -> Self {
        let last_now = host.now();
        Self {
            host,
            time_slice,
            last_now,
            slice_start: last_now,
            interrupts: 0,
            scheduled: None,
            frozen_checks: 0,
            max_frozen_checks: usize::MAX,
            stalled_slices: 0,
        }
    }

    /// End a slice after `checks` yield checks without the clock moving.
    #[must_use]
    pub fn with_max_frozen_checks(mut self, checks: usize) -> Self {
        self.max_frozen_checks = checks;
        self
    }

    /// Slices cut short because the host clock stood still.
    #[inline]
    pub fn stalled_slices(&self) -> u64 {
        self.stalled_slices
    }

    #[inline]
    pub fn host(&self) -> &S {
        &self.host
    }

    #[inline]
    pub fn host_mut(&mut self) -> &mut S {
        &mut self.host
    }

    /// Read the host clock, rejecting a clock that runs backwards.
    pub fn now(&mut self) -> FiberResult<Millis> {
        let now = self.host.now();
        if now < self.last_now {
            return Err(FiberError::ClockSkew {
                previous: self.last_now,
                now,
            });
        }
        self.last_now = now;
        Ok(now)
    }

    /// Begin a new time slice.
    pub fn start_slice(&mut self) -> FiberResult<Millis> {
        let now = self.now()?;
        self.slice_start = now;
        self.frozen_checks = 0;
        Ok(now)
    }

    /// Current interrupt counter; a pass records it when it starts.
    #[inline]
    pub fn interrupt_mark(&self) -> u64 {
        self.interrupts
    }

    /// A higher priority lane was requested.
    #[inline]
    pub fn interrupt(&mut self) {
        self.interrupts += 1;
    }

    /// Whether the walker should hand control back to the host.
    pub fn should_yield(&mut self, mark: u64) -> FiberResult<bool> {
        if self.interrupts != mark {
            trace!(mark, interrupts = self.interrupts, "yield: interrupted");
            return Ok(true);
        }
        let now = self.now()?;
        let spent = now - self.slice_start;
        if spent >= self.time_slice {
            trace!(spent, "yield: slice spent");
            return Ok(true);
        }
        if spent == 0 {
            self.frozen_checks += 1;
            if self.frozen_checks >= self.max_frozen_checks {
                self.stalled_slices += 1;
                warn!(checks = self.frozen_checks, now, "host clock did not advance during slice, yielding");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The outstanding callback has fired.
    #[inline]
    pub fn callback_fired(&mut self) {
        self.scheduled = None;
    }

    /// Priority of the outstanding callback, if any.
    #[inline]
    pub fn scheduled_priority(&self) -> Option<SchedulerPriority> {
        self.scheduled.map(|(_, priority)| priority)
    }

    /// Make sure exactly one callback is outstanding at `priority`.
    ///
    /// Returns `false` when a callback at that priority was already queued.
    pub fn request(&mut self, priority: SchedulerPriority) -> bool {
        if let Some((id, current)) = self.scheduled {
            if current == priority {
                return false;
            }
            self.host.cancel_callback(id);
        }
        let id = self.host.schedule_callback(priority);
        trace!(?priority, id = id.0, "scheduled host callback");
        self.scheduled = Some((id, priority));
        true
    }

    /// Withdraw the outstanding callback, if any.
    pub fn cancel(&mut self) {
        if let Some((id, _)) = self.scheduled.take() {
            self.host.cancel_callback(id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_yield_after_slice() {
        let host = ManualScheduler::new();
        let mut bridge = SchedulerBridge::new(host.clone(), 5);
        bridge.start_slice().unwrap();
        let mark = bridge.interrupt_mark();

        host.advance(4);
        assert!(!bridge.should_yield(mark).unwrap());
        host.advance(1);
        assert!(bridge.should_yield(mark).unwrap());

        bridge.start_slice().unwrap();
        assert!(!bridge.should_yield(mark).unwrap());
    }

    #[test]
    fn test_should_yield_on_interrupt() {
        let host = ManualScheduler::new();
        let mut bridge = SchedulerBridge::new(host, 1000);
        bridge.start_slice().unwrap();
        let mark = bridge.interrupt_mark();
        bridge.interrupt();
        assert!(bridge.should_yield(mark).unwrap());
    }

    #[test]
    fn test_frozen_clock_ends_slice() {
        let host = ManualScheduler::new();
        let mut bridge = SchedulerBridge::new(host.clone(), 5).with_max_frozen_checks(3);
        bridge.start_slice().unwrap();
        let mark = bridge.interrupt_mark();

        assert!(!bridge.should_yield(mark).unwrap());
        assert!(!bridge.should_yield(mark).unwrap());
        assert!(bridge.should_yield(mark).unwrap());
        assert_eq!(bridge.stalled_slices(), 1);

        // Any movement of the clock stops the count.
        bridge.start_slice().unwrap();
        host.advance(1);
        for _ in 0..10 {
            assert!(!bridge.should_yield(mark).unwrap());
        }
        assert_eq!(bridge.stalled_slices(), 1);
    }

    #[test]
    fn test_clock_skew_reported() {
        let host = ManualScheduler::new();
        host.set_time(100);
        let mut bridge = SchedulerBridge::new(host.clone(), 5);
        host.set_time(50);
        let err = bridge.now().unwrap_err();
        assert!(matches!(err, FiberError::ClockSkew { previous: 100, now: 50 }));
    }

    #[test]
    fn test_request_reuses_same_priority() {
        let host = ManualScheduler::new();
        let mut bridge = SchedulerBridge::new(host.clone(), 5);

        assert!(bridge.request(SchedulerPriority::Normal));
        assert!(!bridge.request(SchedulerPriority::Normal));
        assert_eq!(host.pending(), 1);

        // A different priority replaces the outstanding callback.
        assert!(bridge.request(SchedulerPriority::Immediate));
        assert_eq!(host.pending(), 1);
        assert_eq!(bridge.scheduled_priority(), Some(SchedulerPriority::Immediate));

        bridge.cancel();
        assert_eq!(host.pending(), 0);
    }
}
