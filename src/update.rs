//! Per-unit update queues.
//!
//! # Processing model
//!
//! ```text
//! base_state ── base updates ── pending updates
//!                  (kept from a pass that skipped one)
//! ```
//!
//! `process(render_lanes)` folds every update in sequence order starting
//! from `base_state`. An update whose lane is not being rendered is skipped;
//! from the first skipped update on, every later update is kept in the new
//! base list (already applied ones re-tagged with [`Lane::NONE`] so they are
//! replayed by any future pass). The new `base_state` is the state right
//! before the first skipped update. A lower priority pass therefore always
//! replays from a clean base, and the committed state is the left fold of
//! all payloads in enqueue order.

use std::fmt;
use std::rc::Rc;

use crate::lane::{Lane, Lanes};
use crate::props::Props;

// =============================================================================
// State
// =============================================================================

/// State carried by an update queue.
pub trait State: Clone + 'static {
    /// Apply a partial state on top of `self`.
    fn merge(&self, patch: &Self) -> Self;
}

impl State for Props {
    fn merge(&self, patch: &Self) -> Self {
        let mut next = self.clone();
        next.extend_from(patch);
        next
    }
}

// =============================================================================
// Payload
// =============================================================================

/// What an update does to the state.
pub enum Payload<S> {
    /// Shallow merge of a partial state.
    Merge(S),
    /// Replace the state entirely.
    Replace(S),
    /// Compute the next state from the previous one.
    Reduce(Rc<dyn Fn(&S) -> S>),
    /// Leave the state as is but re-render.
    Force,
}

impl<S: State> Payload<S> {
    /// Build a reducer payload.
    #[inline]
    pub fn reduce(f: impl Fn(&S) -> S + 'static) -> Self {
        Payload::Reduce(Rc::new(f))
    }

    /// Next state after this payload.
    pub fn apply(&self, state: &S) -> S {
        match self {
            Payload::Merge(patch) => state.merge(patch),
            Payload::Replace(next) => next.clone(),
            Payload::Reduce(f) => f(state),
            Payload::Force => state.clone(),
        }
    }
}

impl<S: Clone> Clone for Payload<S> {
    fn clone(&self) -> Self {
        match self {
            Payload::Merge(s) => Payload::Merge(s.clone()),
            Payload::Replace(s) => Payload::Replace(s.clone()),
            Payload::Reduce(f) => Payload::Reduce(Rc::clone(f)),
            Payload::Force => Payload::Force,
        }
    }
}

impl<S> fmt::Debug for Payload<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Merge(_) => f.write_str("Merge"),
            Payload::Replace(_) => f.write_str("Replace"),
            Payload::Reduce(_) => f.write_str("Reduce"),
            Payload::Force => f.write_str("Force"),
        }
    }
}

/// Callback run in the lifecycle pass of the commit that applied its update.
pub type UpdateCallback<S> = Rc<dyn Fn(&S)>;

// =============================================================================
// Update
// =============================================================================

/// One pending state mutation.
pub struct Update<S> {
    /// Lane the update was enqueued on. [`Lane::NONE`] marks a re-based
    /// copy that every pass must replay.
    pub lane: Lane,
    /// Global enqueue order.
    pub seq: u64,
    pub payload: Payload<S>,
    pub callback: Option<UpdateCallback<S>>,
}

impl<S> Update<S> {
    pub fn new(lane: Lane, seq: u64, payload: Payload<S>) -> Self {
        Self {
            lane,
            seq,
            payload,
            callback: None,
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: UpdateCallback<S>) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            lane: self.lane,
            seq: self.seq,
            payload: self.payload.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<S> fmt::Debug for Update<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("lane", &self.lane)
            .field("seq", &self.seq)
            .field("payload", &self.payload)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

// =============================================================================
// UpdateQueue
// =============================================================================

/// Outcome of [`UpdateQueue::process`].
#[must_use]
pub struct Processed<S> {
    /// State after every included update.
    pub state: S,
    /// Lanes of the updates that were skipped.
    pub remaining: Lanes,
    /// Callbacks of the applied updates, in order.
    pub callbacks: Vec<UpdateCallback<S>>,
    /// Whether any applied update was [`Payload::Force`].
    pub forced: bool,
}

/// Ordered, lane-tagged pending mutations of one unit.
#[derive(Clone)]
pub struct UpdateQueue<S> {
    base_state: S,
    base: Vec<Update<S>>,
    pending: Vec<Update<S>>,
}

impl<S: State> UpdateQueue<S> {
    pub fn new(state: S) -> Self {
        Self {
            base_state: state,
            base: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// State before the first update that has not been made durable.
    #[inline]
    pub fn base_state(&self) -> &S {
        &self.base_state
    }

    /// Append an update. Sequence numbers must be increasing.
    pub fn enqueue(&mut self, update: Update<S>) {
        debug_assert!(
            self.pending.last().is_none_or(|last| last.seq < update.seq),
            "updates enqueued out of order"
        );
        self.pending.push(update);
    }

    /// Whether any update is waiting to be processed.
    #[inline]
    pub fn has_updates(&self) -> bool {
        !self.base.is_empty() || !self.pending.is_empty()
    }

    /// Union of the lanes of every unprocessed update.
    pub fn lanes(&self) -> Lanes {
        self.base
            .iter()
            .chain(&self.pending)
            .fold(Lanes::empty(), |acc, u| acc | u.lane.to_lanes())
    }

    /// Fold the queue for a pass rendering `render_lanes`.
    pub fn process(&mut self, render_lanes: Lanes) -> Processed<S> {
        let mut updates = std::mem::take(&mut self.base);
        updates.append(&mut self.pending);

        let mut state = self.base_state.clone();
        let mut next_base_state: Option<S> = None;
        let mut next_base: Vec<Update<S>> = Vec::new();
        let mut remaining = Lanes::empty();
        let mut callbacks = Vec::new();
        let mut forced = false;

        for update in updates {
            let included = update.lane.is_none() || render_lanes.includes(update.lane);
            if !included {
                if next_base.is_empty() {
                    next_base_state = Some(state.clone());
                }
                remaining |= update.lane.to_lanes();
                next_base.push(update);
                continue;
            }

            if !next_base.is_empty() {
                next_base.push(Update {
                    lane: Lane::NONE,
                    seq: update.seq,
                    payload: update.payload.clone(),
                    callback: None,
                });
            }

            forced |= matches!(update.payload, Payload::Force);
            state = update.payload.apply(&state);
            if let Some(callback) = update.callback {
                callbacks.push(callback);
            }
        }

        self.base_state = next_base_state.unwrap_or_else(|| state.clone());
        self.base = next_base;

        Processed {
            state,
            remaining,
            callbacks,
            forced,
        }
    }
}

impl<S> fmt::Debug for UpdateQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("base", &self.base)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
