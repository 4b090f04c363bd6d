//! Render pass: the interruptible depth-first walk over work units.
//!
//! A pass is held in a [`RenderSession`]. The walker performs one unit of
//! work at a time:
//!
//! ```text
//! begin(unit) ── child? ──> begin(child)
//!      │
//!      └─ none ──> complete(unit) ── sibling? ──> begin(sibling)
//!                       │
//!                       └─ none ──> complete(parent) ...
//! ```
//!
//! Between units the caller-supplied yield check may stop the loop; the
//! session keeps the cursor so the next slice resumes where this one
//! stopped. Nothing observable happens until the commit engine consumes a
//! complete session.

mod begin;
mod complete;
mod throw;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::effect::EffectList;
use crate::element::Element;
use crate::error::{FiberResult, RenderError};
use crate::id::{ResourceId, UnitId};
use crate::lane::Lanes;
use crate::unit::{UnitArena, WorkUnit};

// =============================================================================
// RenderSession
// =============================================================================

/// Where a pass stands.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PassStatus {
    /// Units remain to be walked.
    InProgress,
    /// The whole tree is complete and ready to commit.
    Complete,
    /// A render error found no boundary.
    Fatal { component: String, error: RenderError },
    /// A resource wait found no waiting boundary.
    Suspended(ResourceId),
}

/// State of one render pass.
#[derive(Debug)]
pub(crate) struct RenderSession {
    /// Lanes this pass renders.
    pub lanes: Lanes,
    /// Work-in-progress root.
    pub root: UnitId,
    /// Next unit to begin.
    pub cursor: Option<UnitId>,
    /// Units allocated by this pass; freed if the pass is discarded.
    pub fresh: FxHashSet<UnitId>,
    pub effects: EffectList,
    pub status: PassStatus,
    /// Interrupt counter when the pass (or its current slice) started.
    pub interrupt_mark: u64,
    /// Resources waited on, with the boundary showing a fallback for them.
    pub waits: Vec<(ResourceId, UnitId)>,
    /// Units begun so far, for tracing.
    pub units_begun: usize,
}

impl RenderSession {
    /// Start a pass over `lanes` from `current_root`.
    pub fn start(units: &mut UnitArena, current_root: UnitId, lanes: Lanes, interrupt_mark: u64) -> Self {
        let mut session = Self {
            lanes,
            root: current_root,
            cursor: None,
            fresh: FxHashSet::default(),
            effects: EffectList::new(),
            status: PassStatus::InProgress,
            interrupt_mark,
            waits: Vec::new(),
            units_begun: 0,
        };
        let root = Walker::new(units, &mut session).work_in_progress(current_root, None);
        session.root = root;
        session.cursor = Some(root);
        session
    }

    /// Throw the pass away, freeing every unit it allocated.
    pub fn discard(self, units: &mut UnitArena) {
        trace!(lanes = ?self.lanes, fresh = self.fresh.len(), "discarding render pass");
        for id in self.fresh {
            units.remove(id);
        }
    }
}

// =============================================================================
// Walker
// =============================================================================

/// Borrowed view used to advance a [`RenderSession`].
pub(crate) struct Walker<'a> {
    pub(crate) units: &'a mut UnitArena,
    pub(crate) session: &'a mut RenderSession,
}

impl<'a> Walker<'a> {
    pub fn new(units: &'a mut UnitArena, session: &'a mut RenderSession) -> Self {
        Self { units, session }
    }

    /// Walk units until the pass is done or `should_yield` says stop.
    pub fn work_loop(&mut self, mut should_yield: impl FnMut() -> FiberResult<bool>) -> FiberResult<()> {
        while let Some(unit) = self.session.cursor {
            self.perform_unit_of_work(unit);
            if self.session.cursor.is_some() && should_yield()? {
                trace!(begun = self.session.units_begun, "render pass yielded");
                return Ok(());
            }
        }
        Ok(())
    }

    /// Begin `unit`; descend into its first child, or complete it.
    pub fn perform_unit_of_work(&mut self, unit: UnitId) {
        self.session.units_begun += 1;
        match self.begin_work(unit) {
            Ok(Some(child)) => self.session.cursor = Some(child),
            Ok(None) => self.complete_unit_of_work(unit),
            Err(interrupt) => self.throw(unit, interrupt),
        }
    }

    /// The work-in-progress counterpart of `current`, reusing its alternate
    /// slot when one exists. `element` supplies new input.
    pub fn work_in_progress(&mut self, current: UnitId, element: Option<&Element>) -> UnitId {
        let wip = match self.units.alternate(current) {
            Some(alternate) => alternate,
            None => {
                let clone: WorkUnit = self.units[current].clone();
                let id = self.units.insert(clone);
                self.units.link(current, id);
                self.session.fresh.insert(id);
                id
            }
        };
        if let Some((wip_unit, current_unit)) = self.units.pair_mut(wip, current) {
            wip_unit.reset_from(current_unit);
            if let Some(element) = element {
                wip_unit.set_input(element);
            }
        }
        wip
    }

    /// Allocate a unit for an element that has no current counterpart.
    pub(crate) fn create_unit(&mut self, unit: WorkUnit) -> UnitId {
        let id = self.units.insert(unit);
        self.session.fresh.insert(id);
        id
    }

    /// Committed counterpart of a work-in-progress unit, if any.
    #[inline]
    pub(crate) fn current_of(&self, wip: UnitId) -> Option<UnitId> {
        self.units.alternate(wip)
    }
}

// =============================================================================
// Tests
// =============================================================================
