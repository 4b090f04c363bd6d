//! Lanes: priority tokens for pending updates.
//!
//! A lane is a single bit; a set of lanes is a `u32` bitmask. A lower bit
//! index is a higher priority, so "highest priority lane" is simply the
//! lowest set bit.
//!
//! ```text
//! bit  0        SYNC
//! bit  1        INPUT_CONTINUOUS
//! bit  2        DEFAULT
//! bits 3..=18   TRANSITIONS (16 lanes, claimed round robin)
//! bits 19..=22  RETRIES     (4 lanes, claimed round robin)
//! bit  28       IDLE
//! bit  29       OFFSCREEN
//! ```
//!
//! [`RootLanes`] is the per-root bookkeeping: which lanes are pending,
//! suspended, pinged, expired or entangled, and when each pending lane
//! starves.

use std::fmt;

use bitflags::bitflags;

use crate::scheduler::{Millis, SchedulerPriority};

/// Number of addressable lane bits.
pub const TOTAL_LANES: usize = 30;

// =============================================================================
// Lanes
// =============================================================================

bitflags! {
    /// A set of lanes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const SYNC = 1 << 0;
        const INPUT_CONTINUOUS = 1 << 1;
        const DEFAULT = 1 << 2;
        const TRANSITIONS = 0xFFFF << 3;
        const RETRIES = 0xF << 19;
        const IDLE = 1 << 28;
        const OFFSCREEN = 1 << 29;

        /// Lanes that always render without yielding.
        const BLOCKING = Self::SYNC.bits() | Self::INPUT_CONTINUOUS.bits() | Self::DEFAULT.bits();
        const NON_IDLE = 0x0FFF_FFFF;
    }
}

impl Lanes {
    /// The lowest set bit, or [`Lane::NONE`].
    #[inline]
    pub fn highest_priority_lane(self) -> Lane {
        let bits = self.bits();
        Lane(bits & bits.wrapping_neg())
    }

    /// The group the highest priority lane belongs to, restricted to `self`.
    ///
    /// Transition and retry lanes are batched: every pending transition
    /// lane renders together.
    pub fn highest_priority_group(self) -> Lanes {
        let lane = self.highest_priority_lane().to_lanes();
        if lane.intersects(Lanes::TRANSITIONS) {
            self & Lanes::TRANSITIONS
        } else if lane.intersects(Lanes::RETRIES) {
            self & Lanes::RETRIES
        } else if lane.is_empty() {
            self
        } else {
            lane
        }
    }

    #[inline]
    pub fn includes(self, lane: Lane) -> bool {
        self.bits() & lane.0 != 0
    }

    #[inline]
    pub fn includes_blocking(self) -> bool {
        self.intersects(Lanes::BLOCKING)
    }

    #[inline]
    pub fn includes_non_idle(self) -> bool {
        self.intersects(Lanes::NON_IDLE)
    }

    /// Iterate individual lanes, highest priority first.
    #[inline]
    pub fn iter_lanes(self) -> LaneIter {
        LaneIter { bits: self.bits() }
    }

    /// Host scheduler priority for a pass rendering these lanes.
    pub fn to_scheduler_priority(self) -> SchedulerPriority {
        let lane = self.highest_priority_lane().to_lanes();
        if lane == Lanes::SYNC {
            SchedulerPriority::Immediate
        } else if lane == Lanes::INPUT_CONTINUOUS {
            SchedulerPriority::UserBlocking
        } else if lane.intersects(Lanes::DEFAULT | Lanes::TRANSITIONS) {
            SchedulerPriority::Normal
        } else if lane.intersects(Lanes::RETRIES) {
            SchedulerPriority::Low
        } else {
            SchedulerPriority::Idle
        }
    }
}

impl From<Lane> for Lanes {
    #[inline]
    fn from(lane: Lane) -> Self {
        lane.to_lanes()
    }
}

/// Iterator over the single lanes of a [`Lanes`] set.
#[derive(Debug, Clone)]
pub struct LaneIter {
    bits: u32,
}

impl Iterator for LaneIter {
    type Item = Lane;

    #[inline]
    fn next(&mut self) -> Option<Lane> {
        if self.bits == 0 {
            return None;
        }
        let lane = self.bits & self.bits.wrapping_neg();
        self.bits &= !lane;
        Some(Lane(lane))
    }
}

// =============================================================================
// Lane
// =============================================================================

/// A single lane (exactly one bit, or none).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct Lane(u32);

impl Lane {
    pub const NONE: Lane = Lane(0);
    pub const SYNC: Lane = Lane(Lanes::SYNC.bits());
    pub const INPUT_CONTINUOUS: Lane = Lane(Lanes::INPUT_CONTINUOUS.bits());
    pub const DEFAULT: Lane = Lane(Lanes::DEFAULT.bits());
    pub const FIRST_TRANSITION: Lane = Lane(1 << 3);
    pub const FIRST_RETRY: Lane = Lane(1 << 19);
    pub const IDLE: Lane = Lane(Lanes::IDLE.bits());
    pub const OFFSCREEN: Lane = Lane(Lanes::OFFSCREEN.bits());

    /// Lane at bit `index`. Out of range indices yield [`Lane::NONE`].
    #[inline]
    pub const fn from_index(index: usize) -> Lane {
        if index < TOTAL_LANES {
            Lane(1 << index)
        } else {
            Lane::NONE
        }
    }

    /// Bit index of this lane.
    #[inline]
    pub const fn index(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn to_lanes(self) -> Lanes {
        Lanes::from_bits_retain(self.0)
    }

    /// `true` when `self` must run before `other`.
    #[inline]
    pub fn is_higher_priority_than(self, other: Lane) -> bool {
        !self.is_none() && (other.is_none() || self.0 < other.0)
    }

    /// `true` for the transition group.
    #[inline]
    pub fn is_transition(self) -> bool {
        self.to_lanes().intersects(Lanes::TRANSITIONS)
    }
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Lane::NONE => return f.write_str("Lane(none)"),
            Lane::SYNC => "sync",
            Lane::INPUT_CONTINUOUS => "input-continuous",
            Lane::DEFAULT => "default",
            Lane::IDLE => "idle",
            Lane::OFFSCREEN => "offscreen",
            lane if lane.is_transition() => "transition",
            lane if lane.to_lanes().intersects(Lanes::RETRIES) => "retry",
            _ => "unassigned",
        };
        write!(f, "Lane({name}:{})", self.index())
    }
}

// =============================================================================
// Urgency
// =============================================================================

/// Hint from the component layer used to pick a lane for a new update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Clicks, key presses: render synchronously.
    Discrete,
    /// Pointer moves, scrolling: batched per gesture.
    Continuous,
    /// Anything without a more specific hint.
    Default,
    /// Non-urgent UI transitions: interruptible.
    Transition,
    /// Work that may wait until nothing else is pending.
    Idle,
}

// =============================================================================
// RootLanes
// =============================================================================

/// Lane bookkeeping for one root.
#[derive(Clone)]
pub struct RootLanes {
    /// Lanes with at least one unprocessed update.
    pub pending: Lanes,
    /// Lanes whose last pass waited on a resource with nowhere to show
    /// interim content.
    pub suspended: Lanes,
    /// Suspended lanes whose resource has since resolved.
    pub pinged: Lanes,
    /// Lanes past their expiration time.
    pub expired: Lanes,
    /// Lanes that have entanglements recorded.
    pub entangled: Lanes,
    entanglements: [Lanes; TOTAL_LANES],
    expiration_times: [Option<Millis>; TOTAL_LANES],
    next_transition: Lane,
    next_retry: Lane,
    sync_expiration: Millis,
    transition_expiration: Millis,
}

impl fmt::Debug for RootLanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootLanes")
            .field("pending", &self.pending)
            .field("suspended", &self.suspended)
            .field("pinged", &self.pinged)
            .field("expired", &self.expired)
            .field("entangled", &self.entangled)
            .finish_non_exhaustive()
    }
}

impl RootLanes {
    /// Create bookkeeping with the given starvation timeouts (milliseconds).
    pub fn new(sync_expiration: Millis, transition_expiration: Millis) -> Self {
        Self {
            pending: Lanes::empty(),
            suspended: Lanes::empty(),
            pinged: Lanes::empty(),
            expired: Lanes::empty(),
            entangled: Lanes::empty(),
            entanglements: [Lanes::empty(); TOTAL_LANES],
            expiration_times: [None; TOTAL_LANES],
            next_transition: Lane::FIRST_TRANSITION,
            next_retry: Lane::FIRST_RETRY,
            sync_expiration,
            transition_expiration,
        }
    }

    /// Pick a lane for a new update.
    pub fn request_lane(&mut self, urgency: Urgency) -> Lane {
        match urgency {
            Urgency::Discrete => Lane::SYNC,
            Urgency::Continuous => Lane::INPUT_CONTINUOUS,
            Urgency::Default => Lane::DEFAULT,
            Urgency::Transition => self.claim_next_transition_lane(),
            Urgency::Idle => Lane::IDLE,
        }
    }

    /// Next transition lane, cycling through all sixteen.
    pub fn claim_next_transition_lane(&mut self) -> Lane {
        let lane = self.next_transition;
        self.next_transition = Lane(lane.0 << 1);
        if !self.next_transition.to_lanes().intersects(Lanes::TRANSITIONS) {
            self.next_transition = Lane::FIRST_TRANSITION;
        }
        lane
    }

    /// Next retry lane, cycling through all four.
    pub fn claim_next_retry_lane(&mut self) -> Lane {
        let lane = self.next_retry;
        self.next_retry = Lane(lane.0 << 1);
        if !self.next_retry.to_lanes().intersects(Lanes::RETRIES) {
            self.next_retry = Lane::FIRST_RETRY;
        }
        lane
    }

    /// Record a new update on `lane`.
    ///
    /// A non-idle update may unblock suspended work, so suspended and pinged
    /// lanes are cleared and every lane becomes eligible again.
    pub fn mark_updated(&mut self, lane: Lane) {
        self.pending |= lane.to_lanes();
        if lane != Lane::IDLE {
            self.suspended = Lanes::empty();
            self.pinged = Lanes::empty();
        }
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Lanes the next pass should render.
    ///
    /// Expired lanes come first, ahead of any higher priority group.
    /// Otherwise `wip`, the lanes of a pass in progress (empty if none), is
    /// kept unless the candidate strictly outranks it.
    pub fn next_lanes(&self, wip: Lanes) -> Lanes {
        if self.pending.is_empty() {
            return Lanes::empty();
        }

        let non_idle = self.pending & Lanes::NON_IDLE;
        let pool = if non_idle.is_empty() { self.pending } else { non_idle };
        let unblocked = pool - self.suspended;
        let expired = (unblocked | (pool & self.pinged)) & self.expired;
        let mut next = if !expired.is_empty() {
            expired
        } else if !unblocked.is_empty() {
            unblocked.highest_priority_group()
        } else {
            (pool & self.pinged).highest_priority_group()
        };

        if next.is_empty() {
            return Lanes::empty();
        }

        // Expired lanes run next whatever is in progress.
        if expired.is_empty() && !wip.is_empty() && wip != next && !wip.intersects(self.suspended) {
            let next_lane = next.highest_priority_lane();
            let wip_lane = wip.highest_priority_lane();
            if !next_lane.is_higher_priority_than(wip_lane) {
                return wip;
            }
        }

        if self.entangled.intersects(next) {
            for lane in (self.entangled & next).iter_lanes() {
                next |= self.entanglements[lane.index()];
            }
        }

        next
    }

    /// Assign expiration times to newly seen lanes and move lanes past
    /// their time into `expired`.
    pub fn mark_starved(&mut self, now: Millis) {
        for lane in self.pending.iter_lanes() {
            let index = lane.index();
            match self.expiration_times[index] {
                None => {
                    let waiting = self.suspended.includes(lane) && !self.pinged.includes(lane);
                    if !waiting {
                        self.expiration_times[index] = self.expiration_for(lane, now);
                    }
                }
                Some(at) if at <= now => {
                    self.expired |= lane.to_lanes();
                }
                Some(_) => {}
            }
        }
    }

    fn expiration_for(&self, lane: Lane, now: Millis) -> Option<Millis> {
        let lanes = lane.to_lanes();
        if lanes.intersects(Lanes::SYNC | Lanes::INPUT_CONTINUOUS) {
            Some(now + self.sync_expiration)
        } else if lanes.intersects(Lanes::DEFAULT | Lanes::TRANSITIONS) {
            Some(now + self.transition_expiration)
        } else {
            None
        }
    }

    /// Expiration time of a pending lane, once assigned.
    #[inline]
    pub fn expiration_time(&self, lane: Lane) -> Option<Millis> {
        self.expiration_times.get(lane.index()).copied().flatten()
    }

    #[inline]
    pub fn includes_expired(&self, lanes: Lanes) -> bool {
        lanes.intersects(self.expired)
    }

    /// Whether a pass over `lanes` may yield between units.
    #[inline]
    pub fn is_time_sliced(&self, lanes: Lanes) -> bool {
        !lanes.includes_blocking() && !self.includes_expired(lanes)
    }

    /// The pass over `lanes` waited on a resource with no boundary.
    pub fn mark_suspended(&mut self, lanes: Lanes) {
        self.suspended |= lanes;
        self.pinged -= lanes;
        for lane in lanes.iter_lanes() {
            self.expiration_times[lane.index()] = None;
        }
    }

    /// A resource resolved: suspended `lanes` may render again.
    pub fn mark_pinged(&mut self, lanes: Lanes) {
        self.pinged |= self.suspended & lanes;
    }

    /// A commit finished; `remaining` lanes still have updates.
    pub fn mark_finished(&mut self, remaining: Lanes) {
        let finished = self.pending - remaining;
        self.pending = remaining;
        self.suspended = Lanes::empty();
        self.pinged = Lanes::empty();
        self.expired &= remaining;
        self.entangled &= remaining;
        for lane in finished.iter_lanes() {
            let index = lane.index();
            self.entanglements[index] = Lanes::empty();
            self.expiration_times[index] = None;
        }
    }

    /// Always render `lanes` together from now on.
    pub fn mark_entangled(&mut self, lanes: Lanes) {
        self.entangled |= lanes;
        for lane in self.entangled.iter_lanes() {
            let index = lane.index();
            if lanes.includes(lane) || self.entanglements[index].intersects(lanes) {
                self.entanglements[index] |= lanes;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> RootLanes {
        RootLanes::new(250, 5000)
    }

    #[test]
    fn test_highest_priority_lane() {
        let lanes = Lanes::DEFAULT | Lanes::IDLE | Lanes::INPUT_CONTINUOUS;
        assert_eq!(lanes.highest_priority_lane(), Lane::INPUT_CONTINUOUS);
        assert_eq!(Lanes::empty().highest_priority_lane(), Lane::NONE);
    }

    #[test]
    fn test_lane_priority_order() {
        assert!(Lane::SYNC.is_higher_priority_than(Lane::DEFAULT));
        assert!(Lane::DEFAULT.is_higher_priority_than(Lane::FIRST_TRANSITION));
        assert!(!Lane::IDLE.is_higher_priority_than(Lane::DEFAULT));
        assert!(Lane::IDLE.is_higher_priority_than(Lane::NONE));
        assert!(!Lane::NONE.is_higher_priority_than(Lane::IDLE));
    }

    #[test]
    fn test_group_batches_transitions() {
        let t1 = Lane::from_index(3).to_lanes();
        let t2 = Lane::from_index(7).to_lanes();
        let lanes = t1 | t2 | Lanes::IDLE;
        assert_eq!(lanes.highest_priority_group(), t1 | t2);
        assert_eq!((Lanes::SYNC | t1).highest_priority_group(), Lanes::SYNC);
    }

    #[test]
    fn test_iter_lanes_in_priority_order() {
        let lanes = Lanes::IDLE | Lanes::SYNC | Lanes::DEFAULT;
        let order: Vec<Lane> = lanes.iter_lanes().collect();
        assert_eq!(order, vec![Lane::SYNC, Lane::DEFAULT, Lane::IDLE]);
    }

    #[test]
    fn test_transition_lanes_round_robin() {
        let mut root = root();
        let first = root.claim_next_transition_lane();
        assert_eq!(first, Lane::FIRST_TRANSITION);
        for _ in 0..15 {
            let lane = root.claim_next_transition_lane();
            assert!(lane.is_transition());
        }
        // Wrapped around after sixteen claims.
        assert_eq!(root.claim_next_transition_lane(), Lane::FIRST_TRANSITION);
    }

    #[test]
    fn test_retry_lanes_round_robin() {
        let mut root = root();
        let lanes: Vec<Lane> = (0..5).map(|_| root.claim_next_retry_lane()).collect();
        assert_eq!(lanes[0], Lane::FIRST_RETRY);
        assert_eq!(lanes[4], Lane::FIRST_RETRY);
        assert!(lanes[1..4].iter().all(|l| l.to_lanes().intersects(Lanes::RETRIES)));
    }

    #[test]
    fn test_request_lane_by_urgency() {
        let mut root = root();
        assert_eq!(root.request_lane(Urgency::Discrete), Lane::SYNC);
        assert_eq!(root.request_lane(Urgency::Continuous), Lane::INPUT_CONTINUOUS);
        assert_eq!(root.request_lane(Urgency::Default), Lane::DEFAULT);
        assert!(root.request_lane(Urgency::Transition).is_transition());
        assert_eq!(root.request_lane(Urgency::Idle), Lane::IDLE);
    }

    #[test]
    fn test_next_lanes_empty_when_idle() {
        assert!(root().next_lanes(Lanes::empty()).is_empty());
    }

    #[test]
    fn test_next_lanes_keeps_wip_unless_outranked() {
        let mut root = root();
        let transition = root.claim_next_transition_lane();
        root.mark_updated(transition);
        let wip = root.next_lanes(Lanes::empty());
        assert_eq!(wip, transition.to_lanes());

        // An idle update does not interrupt.
        root.mark_updated(Lane::IDLE);
        assert_eq!(root.next_lanes(wip), wip);

        // A sync update does.
        root.mark_updated(Lane::SYNC);
        assert_eq!(root.next_lanes(wip), Lanes::SYNC);
    }

    #[test]
    fn test_idle_only_when_nothing_else() {
        let mut root = root();
        root.mark_updated(Lane::IDLE);
        root.mark_updated(Lane::DEFAULT);
        assert_eq!(root.next_lanes(Lanes::empty()), Lanes::DEFAULT);
        root.mark_finished(Lanes::IDLE);
        assert_eq!(root.next_lanes(Lanes::empty()), Lanes::IDLE);
    }

    #[test]
    fn test_suspended_lanes_skipped_until_pinged() {
        let mut root = root();
        let transition = root.claim_next_transition_lane();
        root.mark_updated(transition);
        root.mark_suspended(transition.to_lanes());
        assert!(root.next_lanes(Lanes::empty()).is_empty());

        root.mark_pinged(transition.to_lanes());
        assert_eq!(root.next_lanes(Lanes::empty()), transition.to_lanes());
    }

    #[test]
    fn test_starved_lane_expires() {
        let mut root = root();
        let transition = root.claim_next_transition_lane();
        root.mark_updated(transition);

        root.mark_starved(100);
        assert_eq!(root.expiration_time(transition), Some(5100));
        assert!(root.is_time_sliced(transition.to_lanes()));

        root.mark_starved(5099);
        assert!(root.expired.is_empty());

        root.mark_starved(5100);
        assert!(root.includes_expired(transition.to_lanes()));
        assert!(!root.is_time_sliced(transition.to_lanes()));
    }

    #[test]
    fn test_expired_lane_runs_before_higher_priority() {
        let mut root = root();
        let transition = root.claim_next_transition_lane();
        root.mark_updated(transition);
        root.mark_starved(0);
        root.mark_updated(Lane::DEFAULT);
        root.mark_updated(Lane::SYNC);
        assert_eq!(root.next_lanes(Lanes::empty()), Lanes::SYNC);

        root.mark_starved(5000);
        assert_eq!(root.next_lanes(Lanes::empty()), transition.to_lanes());
        // An expired lane also displaces a pass in progress.
        assert_eq!(root.next_lanes(Lanes::DEFAULT), transition.to_lanes());
        assert!(!root.is_time_sliced(transition.to_lanes()));

        root.mark_finished(Lanes::SYNC | Lanes::DEFAULT);
        assert_eq!(root.next_lanes(Lanes::empty()), Lanes::SYNC);
    }

    #[test]
    fn test_retry_and_idle_never_expire() {
        let mut root = root();
        root.mark_updated(Lane::IDLE);
        let retry = root.claim_next_retry_lane();
        root.mark_updated(retry);
        root.mark_starved(0);
        root.mark_starved(1_000_000);
        assert!(root.expired.is_empty());
    }

    #[test]
    fn test_entangled_lanes_render_together() {
        let mut root = root();
        root.mark_updated(Lane::INPUT_CONTINUOUS);
        root.mark_updated(Lane::DEFAULT);
        root.mark_entangled(Lanes::INPUT_CONTINUOUS | Lanes::DEFAULT);

        let next = root.next_lanes(Lanes::empty());
        assert_eq!(next, Lanes::INPUT_CONTINUOUS | Lanes::DEFAULT);
    }

    #[test]
    fn test_mark_finished_clears_bookkeeping() {
        let mut root = root();
        root.mark_updated(Lane::SYNC);
        root.mark_updated(Lane::DEFAULT);
        root.mark_entangled(Lanes::SYNC | Lanes::DEFAULT);
        root.mark_starved(0);

        root.mark_finished(Lanes::DEFAULT);
        assert_eq!(root.pending, Lanes::DEFAULT);
        assert_eq!(root.entangled, Lanes::DEFAULT);
        assert_eq!(root.expiration_time(Lane::SYNC), None);
        assert!(root.expiration_time(Lane::DEFAULT).is_some());
    }

    #[test]
    fn test_scheduler_priority_mapping() {
        assert_eq!(Lanes::SYNC.to_scheduler_priority(), SchedulerPriority::Immediate);
        assert_eq!(
            Lanes::INPUT_CONTINUOUS.to_scheduler_priority(),
            SchedulerPriority::UserBlocking
        );
        assert_eq!(Lanes::DEFAULT.to_scheduler_priority(), SchedulerPriority::Normal);
        assert_eq!(Lane::FIRST_RETRY.to_lanes().to_scheduler_priority(), SchedulerPriority::Low);
        assert_eq!(Lanes::IDLE.to_scheduler_priority(), SchedulerPriority::Idle);
    }
}
