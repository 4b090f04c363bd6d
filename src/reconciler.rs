//! The public entry point: stages updates, drives render passes and commits.
//!
//! ```text
//! render / enqueue_update ──> staged ──> ensure_root_scheduled ──> host callback
//!                                                                      │
//!   perform_work: next lanes ──> resume or restart pass ──> walk ──────┘
//!                                        │
//!                                        └─ complete ──> commit ──> observers
//! ```
//!
//! Updates are staged on the reconciler and only moved into unit queues when
//! a fresh pass starts, so a pass in progress never sees half of a batch.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::commit::{commit_root, CommitOutcome, CommitReport};
use crate::config::ReconcilerConfig;
use crate::element::Element;
use crate::error::{FiberError, FiberResult, RenderError};
use crate::host::HostRenderer;
use crate::id::{ResourceId, UnitId};
use crate::inspect::{CommitObserver, SharedSnapshot, TreeSnapshot, TreeView};
use crate::lane::{Lane, Lanes, RootLanes, Urgency};
use crate::props::Props;
use crate::scheduler::{HostScheduler, ManualScheduler, SchedulerBridge};
use crate::unit::{RootState, UnitArena, UnitQueue, WorkUnit};
use crate::update::{Payload, Update};
use crate::walker::{PassStatus, RenderSession, Walker};

// =============================================================================
// Outcomes
// =============================================================================

/// What one call to [`Reconciler::perform_work`] did.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    /// No lane has pending work.
    Idle,
    /// The slice ran out; the pass continues on the next call.
    Yielded,
    /// A pass completed and was committed.
    Committed(CommitReport),
    /// The pass waited on a resource with no waiting boundary above it.
    /// Nothing was committed; the lanes render again once it resolves.
    Suspended(ResourceId),
}

/// An update waiting for the next fresh pass.
enum Staged {
    Root(Update<RootState>),
    Unit(UnitId, Update<Props>),
    /// Re-render a waiting boundary whose resource resolved.
    Retry(UnitId, Lane),
}

impl Staged {
    fn lane(&self) -> Lane {
        match self {
            Staged::Root(update) => update.lane,
            Staged::Unit(_, update) => update.lane,
            Staged::Retry(_, lane) => *lane,
        }
    }
}

/// A pending resource and who is waiting on it.
#[derive(Debug, Clone, Copy)]
struct Wait {
    /// Waiting boundary showing its fallback; `None` for a suspended root.
    boundary: Option<UnitId>,
    lanes: Lanes,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Incremental reconciler over one host root.
///
/// Single-threaded: components are held through `Rc`. Other threads read the
/// committed tree through [`SharedSnapshot`].
pub struct Reconciler<R, S> {
    config: ReconcilerConfig,
    units: UnitArena,
    /// Current (committed) host root unit.
    root: UnitId,
    lanes: RootLanes,
    bridge: SchedulerBridge<S>,
    renderer: R,
    /// Pass in progress, kept across slices.
    session: Option<RenderSession>,
    staged: Vec<Staged>,
    staged_lanes: Lanes,
    seq: u64,
    waits: FxHashMap<ResourceId, Vec<Wait>>,
    observers: Vec<Box<dyn CommitObserver>>,
    snapshot: SharedSnapshot,
    /// Consecutive commits that scheduled synchronous work.
    nested: usize,
    commits: u64,
}

impl<R: HostRenderer, S: HostScheduler> Reconciler<R, S> {
    pub fn new(renderer: R, scheduler: S, config: ReconcilerConfig) -> Self {
        let mut units = UnitArena::new();
        let root = units.insert(WorkUnit::root(renderer.container()));
        Self {
            lanes: RootLanes::new(config.sync_expiration, config.transition_expiration),
            bridge: SchedulerBridge::new(scheduler, config.time_slice)
                .with_max_frozen_checks(config.max_frozen_checks),
            config,
            units,
            root,
            renderer,
            session: None,
            staged: Vec::new(),
            staged_lanes: Lanes::empty(),
            seq: 0,
            waits: FxHashMap::default(),
            observers: Vec::new(),
            snapshot: SharedSnapshot::new(),
            nested: 0,
            commits: 0,
        }
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Render `element` into the root at the default lane.
    pub fn render(&mut self, element: Element) -> FiberResult<()> {
        self.render_with_lane(element, Lane::DEFAULT)
    }

    pub fn render_with_lane(&mut self, element: Element, lane: Lane) -> FiberResult<()> {
        let update = Update::new(
            lane,
            self.next_seq(),
            Payload::Replace(RootState {
                element: Some(element),
            }),
        );
        self.stage(Staged::Root(update))
    }

    /// Unmount everything below the root.
    pub fn clear(&mut self) -> FiberResult<()> {
        let update = Update::new(Lane::DEFAULT, self.next_seq(), Payload::Replace(RootState::default()));
        self.stage(Staged::Root(update))
    }

    /// Enqueue a state update on a component unit.
    ///
    /// # Errors
    ///
    /// [`FiberError::StaleHandle`] once the unit was freed,
    /// [`FiberError::NotStateful`] for units without state and
    /// [`FiberError::DetachedNode`] when the unit does not reach the root.
    pub fn enqueue_update(&mut self, unit: UnitId, payload: Payload<Props>, lane: Lane) -> FiberResult<()> {
        self.check_target(unit)?;
        let update = Update::new(lane, self.next_seq(), payload);
        self.stage(Staged::Unit(unit, update))
    }

    /// Like [`enqueue_update`](Self::enqueue_update); `callback` runs with the
    /// new state in the lifecycle pass of the commit that applies it.
    pub fn enqueue_update_with_callback(
        &mut self,
        unit: UnitId,
        payload: Payload<Props>,
        lane: Lane,
        callback: impl Fn(&Props) + 'static,
    ) -> FiberResult<()> {
        self.check_target(unit)?;
        let update = Update::new(lane, self.next_seq(), payload).with_callback(Rc::new(callback));
        self.stage(Staged::Unit(unit, update))
    }

    /// Lane for a new update of the given urgency.
    pub fn request_lane(&mut self, urgency: Urgency) -> Lane {
        self.lanes.request_lane(urgency)
    }

    /// Render `lanes` together from now on.
    pub fn entangle_lanes(&mut self, lanes: Lanes) {
        self.lanes.mark_entangled(lanes);
    }

    /// A resource resolved. Boundaries showing a fallback for it get a retry
    /// lane; a root suspended on it is pinged.
    ///
    /// Returns `false` when nothing was waiting on `resource`.
    pub fn resolve(&mut self, resource: ResourceId) -> FiberResult<bool> {
        let Some(waits) = self.waits.remove(&resource) else {
            return Ok(false);
        };
        debug!(%resource, waiting = waits.len(), "resource resolved");
        for wait in waits {
            match wait.boundary {
                Some(boundary) if self.units.contains(boundary) => {
                    let lane = self.lanes.claim_next_retry_lane();
                    self.stage(Staged::Retry(boundary, lane))?;
                }
                Some(boundary) => trace!(?boundary, "waiting boundary already unmounted"),
                None => self.lanes.mark_pinged(wait.lanes),
            }
        }
        self.ensure_root_scheduled()?;
        Ok(true)
    }

    /// Let an error boundary render its children again.
    pub fn reset_boundary(&mut self, unit: UnitId) -> FiberResult<()> {
        self.check_target(unit)?;
        self.for_pair(unit, |u| u.captured = None);
        let update = Update::new(Lane::DEFAULT, self.next_seq(), Payload::Force);
        self.stage(Staged::Unit(unit, update))
    }

    // =========================================================================
    // Work loop
    // =========================================================================

    /// Run one slice of work. Called by the host when a requested callback
    /// fires.
    pub fn perform_work(&mut self) -> FiberResult<WorkOutcome> {
        self.work(false)
    }

    /// Render and commit everything pending without yielding.
    ///
    /// Returns the reports of every commit, in order.
    pub fn flush_sync(&mut self) -> FiberResult<Vec<CommitReport>> {
        let mut reports = Vec::new();
        loop {
            match self.work(true)? {
                WorkOutcome::Idle => return Ok(reports),
                WorkOutcome::Committed(report) => reports.push(report),
                WorkOutcome::Yielded | WorkOutcome::Suspended(_) => {}
            }
        }
    }

    /// Whether any lane still has unprocessed updates.
    pub fn has_pending_work(&self) -> bool {
        self.lanes.has_pending() || self.session.is_some()
    }

    fn work(&mut self, force_sync: bool) -> FiberResult<WorkOutcome> {
        self.bridge.cancel();
        let now = self.bridge.start_slice()?;
        self.lanes.mark_starved(now);

        let wip = self.session.as_ref().map_or(Lanes::empty(), |s| s.lanes);
        let lanes = self.lanes.next_lanes(wip);
        if lanes.is_empty() {
            if let Some(session) = self.session.take() {
                session.discard(&mut self.units);
            }
            return Ok(WorkOutcome::Idle);
        }

        let mut session = match self.session.take() {
            Some(mut session) if session.lanes == lanes => {
                trace!(?lanes, "resuming render pass");
                session.interrupt_mark = self.bridge.interrupt_mark();
                session
            }
            Some(stale) => {
                debug!(from = ?stale.lanes, to = ?lanes, "restarting render pass");
                stale.discard(&mut self.units);
                self.prepare_fresh_stack(lanes)
            }
            None => self.prepare_fresh_stack(lanes),
        };

        let sliced = !force_sync && self.lanes.is_time_sliced(lanes);
        if let Err(err) = self.run_pass(&mut session, sliced) {
            self.session = Some(session);
            return Err(err);
        }
        self.finish_pass(session)
    }

    /// Move staged updates into the tree and start a pass from the root.
    fn prepare_fresh_stack(&mut self, lanes: Lanes) -> RenderSession {
        self.flush_staged();
        debug!(?lanes, "starting render pass");
        RenderSession::start(&mut self.units, self.root, lanes, self.bridge.interrupt_mark())
    }

    fn run_pass(&mut self, session: &mut RenderSession, sliced: bool) -> FiberResult<()> {
        let bridge = &mut self.bridge;
        let mark = session.interrupt_mark;
        let mut walker = Walker::new(&mut self.units, session);
        if sliced {
            walker.work_loop(|| bridge.should_yield(mark))
        } else {
            walker.work_loop(|| Ok(false))
        }
    }

    fn finish_pass(&mut self, mut session: RenderSession) -> FiberResult<WorkOutcome> {
        let status = std::mem::replace(&mut session.status, PassStatus::InProgress);
        match status {
            PassStatus::InProgress => {
                self.session = Some(session);
                self.ensure_root_scheduled()?;
                Ok(WorkOutcome::Yielded)
            }
            PassStatus::Complete => self.commit(session, true).map(WorkOutcome::Committed),
            PassStatus::Fatal { component, error } => {
                let lanes = session.lanes;
                session.discard(&mut self.units);
                error!(component = %component, %error, "uncaught render error, unmounting tree");
                self.tear_down(lanes)?;
                Err(FiberError::uncaught(component, error))
            }
            PassStatus::Suspended(resource) => {
                let lanes = session.lanes;
                session.discard(&mut self.units);
                debug!(%resource, ?lanes, "root suspended");
                self.lanes.mark_suspended(lanes);
                self.waits.entry(resource).or_default().push(Wait { boundary: None, lanes });
                self.ensure_root_scheduled()?;
                Ok(WorkOutcome::Suspended(resource))
            }
        }
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit a complete pass. With `route_errors`, callback errors and state
    /// requests from callbacks schedule synchronous follow-up work.
    fn commit(&mut self, session: RenderSession, route_errors: bool) -> FiberResult<CommitReport> {
        let lanes = session.lanes;
        let CommitOutcome {
            report,
            requests,
            waits,
        } = commit_root(&mut self.units, &mut self.renderer, &mut self.root, session);
        self.commits += 1;

        let remaining = {
            let root = &self.units[self.root];
            root.lanes | root.child_lanes | self.staged_lanes
        };
        self.lanes.mark_finished(remaining);
        for (resource, boundary) in waits {
            self.waits.entry(resource).or_default().push(Wait {
                boundary: Some(boundary),
                lanes,
            });
        }
        debug!(
            ?lanes,
            effects = report.effects.len(),
            errors = report.errors.len(),
            ?remaining,
            "committed"
        );

        for observer in &mut self.observers {
            observer.on_commit(&report);
        }
        if self.config.publish_snapshots {
            let snapshot = TreeSnapshot::capture(&self.tree(), self.commits, self.lanes.pending);
            self.snapshot.publish(snapshot);
        }

        if !route_errors {
            return Ok(report);
        }

        let mut nested = false;
        for (unit, payload) in requests {
            if !self.units.contains(unit) {
                trace!(?unit, "state request for an unmounted unit dropped");
                continue;
            }
            let update = Update::new(Lane::SYNC, self.next_seq(), payload);
            self.stage(Staged::Unit(unit, update))?;
            nested = true;
        }
        for failure in &report.errors {
            nested = true;
            match failure.boundary {
                Some(boundary) if self.units.contains(boundary) => {
                    self.capture_on(boundary, failure.error.clone().into())?;
                }
                _ => {
                    error!(
                        component = %failure.component,
                        phase = %failure.phase,
                        error = %failure.error,
                        "uncaught callback error, unmounting tree"
                    );
                    self.tear_down(lanes)?;
                    return Err(FiberError::UncaughtCallback {
                        component: failure.component.clone(),
                        phase: failure.phase,
                        error: failure.error.clone(),
                    });
                }
            }
        }

        if nested {
            self.nested += 1;
            if self.nested > self.config.max_nested_updates {
                let limit = self.config.max_nested_updates;
                error!(limit, "nested update limit exceeded");
                self.nested = 0;
                self.drop_staged()?;
                return Err(FiberError::NestedUpdateLimit { limit });
            }
        } else {
            self.nested = 0;
        }

        self.ensure_root_scheduled()?;
        Ok(report)
    }

    /// Make `boundary` render its recovery output in a synchronous pass.
    fn capture_on(&mut self, boundary: UnitId, error: RenderError) -> FiberResult<()> {
        warn!(?boundary, %error, "callback error captured by boundary");
        self.for_pair(boundary, |u| u.captured = Some(error.clone()));
        let update = Update::new(Lane::SYNC, self.next_seq(), Payload::Force);
        self.stage(Staged::Unit(boundary, update))
    }

    /// Unmount the whole tree with a synchronous commit. `failed` lanes are
    /// rendered along so their updates are consumed.
    fn tear_down(&mut self, failed: Lanes) -> FiberResult<()> {
        let update = Update::new(Lane::SYNC, self.next_seq(), Payload::Replace(RootState::default()));
        self.stage(Staged::Root(update))?;

        let mut session = self.prepare_fresh_stack(Lanes::SYNC | failed);
        self.run_pass(&mut session, false)?;
        if session.status == PassStatus::Complete {
            self.commit(session, false)?;
        } else {
            warn!(status = ?session.status, "tear down pass did not complete");
            session.discard(&mut self.units);
        }
        self.ensure_root_scheduled()
    }

    /// Forget every staged update and the lanes that only they kept alive.
    fn drop_staged(&mut self) -> FiberResult<()> {
        trace!(dropped = self.staged.len(), "dropping staged updates");
        self.staged.clear();
        self.staged_lanes = Lanes::empty();
        let remaining = {
            let root = &self.units[self.root];
            root.lanes | root.child_lanes
        };
        self.lanes.mark_finished(remaining);
        self.ensure_root_scheduled()
    }

    // =========================================================================
    // Staging
    // =========================================================================

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn stage(&mut self, staged: Staged) -> FiberResult<()> {
        let lane = staged.lane();
        self.lanes.mark_updated(lane);
        self.staged_lanes |= lane.to_lanes();
        if let Some(session) = &self.session {
            if lane.is_higher_priority_than(session.lanes.highest_priority_lane()) {
                debug!(?lane, rendering = ?session.lanes, "update interrupts pass in progress");
                self.bridge.interrupt();
            }
        }
        self.staged.push(staged);
        self.ensure_root_scheduled()
    }

    /// Keep exactly one host callback outstanding, at the priority of the
    /// next lanes, or none when nothing is pending.
    fn ensure_root_scheduled(&mut self) -> FiberResult<()> {
        let now = self.bridge.now()?;
        self.lanes.mark_starved(now);
        let wip = self.session.as_ref().map_or(Lanes::empty(), |s| s.lanes);
        let next = self.lanes.next_lanes(wip);
        if next.is_empty() {
            self.bridge.cancel();
            return Ok(());
        }
        let priority = next.to_scheduler_priority();
        if self.bridge.request(priority) {
            trace!(lanes = ?next, ?priority, "root scheduled");
        }
        Ok(())
    }

    fn flush_staged(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.staged_lanes = Lanes::empty();
        for staged in staged {
            match staged {
                Staged::Root(update) => {
                    let (root, lane) = (self.root, update.lane);
                    self.for_pair(root, |u| {
                        if let UnitQueue::Root { queue, .. } = &mut u.queue {
                            queue.enqueue(update.clone());
                        }
                    });
                    self.mark_update_lane(root, lane);
                }
                Staged::Unit(unit, update) => {
                    if !self.units.contains(unit) {
                        trace!(?unit, "update for an unmounted unit dropped");
                        continue;
                    }
                    let lane = update.lane;
                    self.for_pair(unit, |u| {
                        if let UnitQueue::State(queue) = &mut u.queue {
                            queue.enqueue(update.clone());
                        }
                    });
                    self.mark_update_lane(unit, lane);
                }
                Staged::Retry(boundary, lane) => {
                    if self.units.contains(boundary) {
                        self.mark_update_lane(boundary, lane);
                    }
                }
            }
        }
    }

    /// Set `lane` on `unit` and add it to the child lanes of every ancestor,
    /// on both buffers.
    fn mark_update_lane(&mut self, unit: UnitId, lane: Lane) {
        let lanes = lane.to_lanes();
        self.for_pair(unit, |u| u.lanes |= lanes);
        let mut node = unit;
        while let Some(parent) = self.parent_of(node) {
            self.for_pair(parent, |u| u.child_lanes |= lanes);
            node = parent;
        }
    }

    fn for_pair(&mut self, id: UnitId, mut f: impl FnMut(&mut WorkUnit)) {
        let alternate = self.units.alternate(id);
        for id in std::iter::once(id).chain(alternate) {
            if let Some(unit) = self.units.get_mut(id) {
                f(unit);
            }
        }
    }

    /// Parent of `id`, through the alternate when its own link is gone.
    fn parent_of(&self, id: UnitId) -> Option<UnitId> {
        match self.units.get(id)?.parent {
            Some(parent) if self.units.contains(parent) => Some(parent),
            _ => {
                let alternate = self.units.alternate(id)?;
                self.units.get(alternate)?.parent.filter(|p| self.units.contains(*p))
            }
        }
    }

    fn is_attached(&self, unit: UnitId) -> bool {
        let root_alternate = self.units.alternate(self.root);
        let mut node = unit;
        loop {
            if node == self.root || Some(node) == root_alternate {
                return true;
            }
            match self.parent_of(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn check_target(&self, unit: UnitId) -> FiberResult<()> {
        let Some(target) = self.units.get(unit) else {
            return Err(FiberError::StaleHandle(unit));
        };
        if !target.is_stateful() {
            return Err(FiberError::NotStateful(unit));
        }
        if !self.is_attached(unit) {
            return Err(FiberError::DetachedNode(unit));
        }
        Ok(())
    }

    // =========================================================================
    // Inspection and accessors
    // =========================================================================

    /// Read-only view of the committed tree.
    pub fn tree(&self) -> TreeView<'_> {
        TreeView::new(&self.units, self.root)
    }

    /// Register an observer called after every commit.
    pub fn subscribe(&mut self, observer: impl CommitObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Handle to the snapshot published after each commit.
    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    #[inline]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[inline]
    pub fn scheduler(&self) -> &S {
        self.bridge.host()
    }

    #[inline]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Lane bookkeeping of the root.
    #[inline]
    pub fn root_lanes(&self) -> &RootLanes {
        &self.lanes
    }

    /// Commits so far.
    #[inline]
    pub fn commit_count(&self) -> u64 {
        self.commits
    }
}

impl<R: HostRenderer> Reconciler<R, ManualScheduler> {
    /// Fire the most urgent queued host callback.
    ///
    /// Returns `None` when no callback is queued.
    pub fn run_next_callback(&mut self) -> FiberResult<Option<WorkOutcome>> {
        let Some((id, priority)) = self.bridge.host().pop_next() else {
            return Ok(None);
        };
        trace!(id = id.0, ?priority, "host callback fired");
        self.bridge.callback_fired();
        self.perform_work().map(Some)
    }

    /// Fire host callbacks until none is queued.
    pub fn run_until_idle(&mut self) -> FiberResult<Vec<CommitReport>> {
        let mut reports = Vec::new();
        while let Some(outcome) = self.run_next_callback()? {
            if let WorkOutcome::Committed(report) = outcome {
                reports.push(report);
            }
        }
        Ok(reports)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::element::{Component, FunctionComponent, Interrupt, LifecycleCx, RenderCx, RenderResult};
    use crate::effect::EffectKind;
    use crate::error::{CallbackError, CallbackPhase};
    use crate::host::{HostOp, MemoryRenderer};
    use crate::id::Identity;

    type Fixture = Reconciler<MemoryRenderer, ManualScheduler>;

    fn setup_with(config: ReconcilerConfig) -> (Fixture, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let rec = Reconciler::new(MemoryRenderer::new(), scheduler.clone(), config);
        (rec, scheduler)
    }

    fn setup() -> (Fixture, ManualScheduler) {
        setup_with(ReconcilerConfig::default())
    }

    fn list(keys: &[&str]) -> Element {
        Element::host("ul").with_children(
            keys.iter()
                .map(|k| Element::host("li").with_key(*k).child(Element::text(*k))),
        )
    }

    fn counter() -> Element {
        Element::function("Counter", |cx| {
            let x = cx.state().get_int("x").unwrap_or(0);
            Ok(vec![Element::text(x.to_string())])
        })
    }

    fn increment() -> Payload<Props> {
        Payload::reduce(|s: &Props| s.clone().with("x", s.get_int("x").unwrap_or(0) + 1))
    }

    /// Advances the clock while rendering, so sliced passes yield after it.
    fn slow(label: &'static str, scheduler: &ManualScheduler) -> Element {
        let scheduler = scheduler.clone();
        Element::function("Slow", move |_| {
            scheduler.advance(10);
            Ok(vec![Element::text(label)])
        })
    }

    fn loader(ready: &Rc<Cell<bool>>, resource: u64) -> Element {
        let ready = Rc::clone(ready);
        Element::function("Data", move |_| {
            if ready.get() {
                Ok(vec![Element::text("data")])
            } else {
                Err(Interrupt::Pending(ResourceId(resource)))
            }
        })
    }

    struct Guard;

    impl Component for Guard {
        fn name(&self) -> &str {
            "Guard"
        }

        fn render(&self, cx: &RenderCx<'_>) -> RenderResult {
            Ok(cx.children().to_vec())
        }

        fn is_error_boundary(&self) -> bool {
            true
        }

        fn recover(&self, error: &RenderError, _props: &Props) -> Vec<Element> {
            vec![Element::text(format!("recovered: {}", error.message()))]
        }
    }

    struct FailsOnMount;

    impl Component for FailsOnMount {
        fn name(&self) -> &str {
            "FailsOnMount"
        }

        fn render(&self, _cx: &RenderCx<'_>) -> RenderResult {
            Ok(vec![Element::host("span")])
        }

        fn did_mount(&self, _cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
            Err(CallbackError::new("mount failed"))
        }
    }

    // =========================================================================
    // Mount and reorder
    // =========================================================================

    #[test]
    fn test_mount_and_run_until_idle() {
        let (mut rec, scheduler) = setup();
        rec.render(list(&["a", "b"])).unwrap();
        assert_eq!(scheduler.pending(), 1);
        assert!(rec.has_pending_work());

        let reports = rec.run_until_idle().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].lanes, Lanes::DEFAULT);
        assert_eq!(reports[0].count(EffectKind::Create), 1);
        assert_eq!(rec.renderer().markup(), "<ul><li>a</li><li>b</li></ul>");
        assert_eq!(scheduler.pending(), 0);
        assert!(!rec.has_pending_work());
        assert_eq!(rec.commit_count(), 1);
    }

    #[test]
    fn test_keyed_rotation_moves_one_node() {
        let (mut rec, _) = setup();
        rec.render(list(&["a", "b", "c"])).unwrap();
        rec.flush_sync().unwrap();
        rec.renderer_mut().take_log();

        rec.render(list(&["c", "a", "b"])).unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.effects.len(), 1);
        assert_eq!(report.count(EffectKind::Move), 1);
        assert_eq!(report.effects[0].type_name, "li");

        assert_eq!(rec.renderer().markup(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
        let log = rec.renderer_mut().take_log();
        assert_eq!(log.len(), 1);
        assert!(matches!(log[0], HostOp::InsertBefore { .. }));
    }

    #[test]
    fn test_reversal() {
        let (mut rec, _) = setup();
        rec.render(list(&["a", "b", "c", "d"])).unwrap();
        rec.flush_sync().unwrap();

        rec.render(list(&["d", "c", "b", "a"])).unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports[0].count(EffectKind::Move), 3);
        assert_eq!(
            rec.renderer().markup(),
            "<ul><li>d</li><li>c</li><li>b</li><li>a</li></ul>"
        );
    }

    #[test]
    fn test_unchanged_tree_commits_nothing() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let leaf = FunctionComponent::new("Leaf", move |_| {
            counter.set(counter.get() + 1);
            Ok(vec![Element::text("leaf")])
        });
        let build = || Element::host("main").child(Element::component(&leaf));

        let (mut rec, _) = setup();
        rec.render(build()).unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(calls.get(), 1);

        rec.render(build()).unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_empty());
        assert_eq!(calls.get(), 1);
        assert_eq!(rec.renderer().markup(), "<main>leaf</main>");
    }

    #[test]
    fn test_new_render_closure_renders_again() {
        let label = |text: &'static str| {
            Element::host("div").child(Element::function("Label", move |_| Ok(vec![Element::text(text)])))
        };

        let (mut rec, _) = setup();
        rec.render(label("one")).unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "<div>one</div>");

        rec.render(label("two")).unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports[0].count(EffectKind::Create), 0);
        assert_eq!(reports[0].count(EffectKind::Update), 1);
        assert_eq!(rec.renderer().markup(), "<div>two</div>");
    }

    #[test]
    fn test_prop_and_text_updates() {
        let (mut rec, _) = setup();
        rec.render(Element::host("div").with_prop("class", "a").child(Element::text("one")))
            .unwrap();
        rec.flush_sync().unwrap();

        rec.render(Element::host("div").with_prop("class", "b").child(Element::text("two")))
            .unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports[0].count(EffectKind::Update), 2);
        assert_eq!(rec.renderer().markup(), "<div class=\"b\">two</div>");
    }

    #[test]
    fn test_clear_unmounts_everything() {
        let (mut rec, _) = setup();
        rec.render(list(&["a"])).unwrap();
        rec.flush_sync().unwrap();
        rec.clear().unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports[0].count(EffectKind::Delete), 1);
        assert_eq!(reports[0].names(CallbackPhase::Unmount), vec!["#text", "li", "ul"]);
        assert_eq!(rec.renderer().markup(), "");
        assert!(rec.tree().is_empty());
        assert_eq!(rec.renderer().node_count(), 1);

        for _ in 0..3 {
            rec.render(list(&["a", "b"])).unwrap();
            rec.flush_sync().unwrap();
            rec.clear().unwrap();
            rec.flush_sync().unwrap();
        }
        assert_eq!(rec.renderer().node_count(), 1);
    }

    // =========================================================================
    // Lanes
    // =========================================================================

    #[test]
    fn test_low_priority_update_rebases_on_commit() {
        let (mut rec, _) = setup();
        rec.render(counter()).unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "0");

        let unit = rec.tree().find_by_type("Counter").unwrap().id();
        let low = rec.request_lane(Urgency::Transition);
        rec.enqueue_update(unit, Payload::Merge(Props::new().with("x", 1)), low)
            .unwrap();
        rec.enqueue_update(unit, increment(), Lane::SYNC).unwrap();

        let WorkOutcome::Committed(high) = rec.perform_work().unwrap() else {
            panic!("expected the sync pass to commit");
        };
        assert_eq!(high.lanes, Lanes::SYNC);
        assert_eq!(rec.renderer().markup(), "1");

        let WorkOutcome::Committed(rebased) = rec.perform_work().unwrap() else {
            panic!("expected the transition pass to commit");
        };
        assert_eq!(rebased.lanes, low.to_lanes());
        assert_eq!(rec.renderer().markup(), "2");
        assert!(matches!(rec.perform_work().unwrap(), WorkOutcome::Idle));
    }

    #[test]
    fn test_update_callback_runs_on_commit() {
        let (mut rec, _) = setup();
        rec.render(counter()).unwrap();
        rec.flush_sync().unwrap();

        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let unit = rec.tree().find_by_type("Counter").unwrap().id();
        rec.enqueue_update_with_callback(unit, increment(), Lane::DEFAULT, move |state| {
            sink.set(state.get_int("x").unwrap_or(0));
        })
        .unwrap();

        let reports = rec.flush_sync().unwrap();
        assert_eq!(seen.get(), 1);
        assert_eq!(reports[0].names(CallbackPhase::UpdateCallback), vec!["Counter"]);
    }

    #[test]
    fn test_sync_update_discards_yielded_transition() {
        let (mut rec, scheduler) = setup();
        let lane = rec.request_lane(Urgency::Transition);
        rec.render_with_lane(Element::host("div").child(slow("late", &scheduler)), lane)
            .unwrap();

        assert!(matches!(rec.perform_work().unwrap(), WorkOutcome::Yielded));
        assert!(rec.has_pending_work());
        assert_eq!(rec.renderer().markup(), "");

        rec.render_with_lane(Element::host("p").child(Element::text("urgent")), Lane::SYNC)
            .unwrap();
        let WorkOutcome::Committed(report) = rec.perform_work().unwrap() else {
            panic!("expected the sync pass to commit");
        };
        assert_eq!(report.lanes, Lanes::SYNC);
        assert_eq!(rec.renderer().markup(), "<p>urgent</p>");

        // The transition re-bases on the sync render and changes nothing.
        let WorkOutcome::Committed(report) = rec.perform_work().unwrap() else {
            panic!("expected the transition pass to commit");
        };
        assert!(report.is_empty());
        assert_eq!(rec.renderer().markup(), "<p>urgent</p>");
        assert!(matches!(rec.perform_work().unwrap(), WorkOutcome::Idle));
    }

    #[test]
    fn test_yielded_pass_resumes() {
        let (mut rec, scheduler) = setup();
        let lane = rec.request_lane(Urgency::Transition);
        rec.render_with_lane(Element::host("div").child(slow("done", &scheduler)), lane)
            .unwrap();

        assert!(matches!(rec.perform_work().unwrap(), WorkOutcome::Yielded));
        assert_eq!(scheduler.pending(), 1);
        let reports = rec.run_until_idle().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(rec.renderer().markup(), "<div>done</div>");
    }

    #[test]
    fn test_frozen_clock_still_yields() {
        let (mut rec, scheduler) =
            setup_with(ReconcilerConfig::default().with_max_frozen_checks(4));
        let keys: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let lane = rec.request_lane(Urgency::Transition);
        rec.render_with_lane(list(&keys), lane).unwrap();

        assert!(matches!(rec.perform_work().unwrap(), WorkOutcome::Yielded));
        let reports = rec.run_until_idle().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(scheduler.current_time(), 0);
        assert!(rec.renderer().markup().starts_with("<ul><li>0</li><li>1</li>"));
    }

    #[test]
    fn test_expired_lane_renders_without_yielding() {
        let (mut rec, scheduler) =
            setup_with(ReconcilerConfig::default().with_transition_expiration(100));
        let lane = rec.request_lane(Urgency::Transition);
        rec.render_with_lane(Element::host("div").child(slow("done", &scheduler)), lane)
            .unwrap();
        scheduler.advance(150);

        assert!(matches!(rec.perform_work().unwrap(), WorkOutcome::Committed(_)));
        assert!(rec.root_lanes().expired.is_empty());
        assert_eq!(rec.renderer().markup(), "<div>done</div>");
    }

    #[test]
    fn test_expired_transition_not_starved_by_default_updates() {
        let (mut rec, scheduler) =
            setup_with(ReconcilerConfig::default().with_transition_expiration(100));
        rec.render(counter()).unwrap();
        rec.flush_sync().unwrap();

        let unit = rec.tree().find_by_type("Counter").unwrap().id();
        let transition = rec.request_lane(Urgency::Transition);
        rec.enqueue_update(unit, Payload::Merge(Props::new().with("x", 100)), transition)
            .unwrap();

        let mut committed = Vec::new();
        for _ in 0..6 {
            scheduler.advance(50);
            rec.enqueue_update(unit, increment(), Lane::DEFAULT).unwrap();
            if let WorkOutcome::Committed(report) = rec.perform_work().unwrap() {
                committed.push(report.lanes);
            }
        }
        assert_eq!(committed.len(), 6);
        assert_eq!(committed[0], Lanes::DEFAULT);
        assert_eq!(committed[1], transition.to_lanes());
        assert!(committed[2..].iter().all(|lanes| *lanes == Lanes::DEFAULT));

        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "106");
        assert!(rec.root_lanes().expired.is_empty());
    }

    #[test]
    fn test_entangled_lanes_commit_together() {
        let (mut rec, _) = setup();
        rec.render(counter()).unwrap();
        rec.flush_sync().unwrap();

        let unit = rec.tree().find_by_type("Counter").unwrap().id();
        let transition = rec.request_lane(Urgency::Transition);
        rec.entangle_lanes(Lanes::DEFAULT | transition.to_lanes());
        rec.enqueue_update(unit, increment(), transition).unwrap();
        rec.enqueue_update(unit, increment(), Lane::DEFAULT).unwrap();

        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].lanes, Lanes::DEFAULT | transition.to_lanes());
        assert_eq!(rec.renderer().markup(), "2");
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    #[test]
    fn test_waiting_boundary_fallback_and_retry() {
        let ready = Rc::new(Cell::new(false));
        let (mut rec, _) = setup();
        rec.render(Element::waiting([loader(&ready, 1)], [Element::text("loading")]))
            .unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "loading");
        assert!(rec.tree().find_by_type("#waiting").unwrap().is_showing_fallback());

        ready.set(true);
        assert!(rec.resolve(ResourceId(1)).unwrap());
        assert!(!rec.resolve(ResourceId(1)).unwrap());
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].lanes.intersects(Lanes::RETRIES));
        assert_eq!(rec.renderer().markup(), "data");
        assert!(!rec.tree().find_by_type("#waiting").unwrap().is_showing_fallback());
    }

    #[test]
    fn test_primary_unmounts_before_fallback_mounts() {
        let ready = Rc::new(Cell::new(true));
        let (mut rec, _) = setup();
        rec.render(Element::waiting([loader(&ready, 3)], [Element::text("loading")]))
            .unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "data");

        ready.set(false);
        let data = rec.tree().find_by_type("Data").unwrap().id();
        rec.enqueue_update(data, Payload::Force, Lane::SYNC).unwrap();
        let reports = rec.flush_sync().unwrap();
        let report = &reports[0];
        assert_eq!(rec.renderer().markup(), "loading");
        assert_eq!(report.names(CallbackPhase::Unmount), vec!["#text", "Data", "#fragment"]);
        assert_eq!(report.names(CallbackPhase::Mount), vec!["#text", "#fragment"]);

        let last_unmount = report
            .lifecycle
            .iter()
            .rposition(|e| e.phase == CallbackPhase::Unmount)
            .unwrap();
        let first_mount = report
            .lifecycle
            .iter()
            .position(|e| e.phase == CallbackPhase::Mount)
            .unwrap();
        assert!(last_unmount < first_mount);
    }

    #[test]
    fn test_root_suspends_until_resolved() {
        let ready = Rc::new(Cell::new(false));
        let (mut rec, _) = setup();
        rec.render(Element::host("main").child(loader(&ready, 9))).unwrap();

        assert!(matches!(
            rec.perform_work().unwrap(),
            WorkOutcome::Suspended(ResourceId(9))
        ));
        assert!(rec.flush_sync().unwrap().is_empty());
        assert_eq!(rec.renderer().markup(), "");
        assert_eq!(rec.root_lanes().suspended, Lanes::DEFAULT);

        ready.set(true);
        assert!(rec.resolve(ResourceId(9)).unwrap());
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(rec.renderer().markup(), "<main>data</main>");
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_uncaught_render_error_tears_down() {
        let (mut rec, _) = setup();
        rec.render(list(&["a"])).unwrap();
        rec.flush_sync().unwrap();

        rec.render(Element::function("Broken", |_| Err(RenderError::new("boom").into())))
            .unwrap();
        let err = rec.flush_sync().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(&err, FiberError::Uncaught { component, .. } if component == "Broken"));
        assert_eq!(rec.renderer().markup(), "");
        assert!(rec.tree().is_empty());
        assert!(!rec.has_pending_work());
    }

    #[test]
    fn test_render_error_recovered_by_boundary() {
        let (mut rec, _) = setup();
        rec.render(
            Element::class(Guard)
                .child(Element::function("Broken", |_| Err(RenderError::new("boom").into()))),
        )
        .unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "recovered: boom");
        assert!(rec.tree().find_by_type("Guard").unwrap().has_captured());
    }

    #[test]
    fn test_render_error_on_update_replaces_subtree() {
        let (mut rec, _) = setup();
        rec.render(Element::class(Guard).child(Element::host("div").child(Element::function(
            "Leaf",
            |cx| {
                if cx.state().get_bool("fail").unwrap_or(false) {
                    Err(RenderError::new("leaf failed").into())
                } else {
                    Ok(vec![Element::text("ok")])
                }
            },
        ))))
        .unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(rec.renderer().markup(), "<div>ok</div>");

        let leaf = rec.tree().find_by_type("Leaf").unwrap().id();
        rec.enqueue_update(leaf, Payload::Merge(Props::new().with("fail", true)), Lane::SYNC)
            .unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.names(CallbackPhase::Unmount), vec!["#text", "Leaf", "div"]);
        assert_eq!(report.names(CallbackPhase::Mount), vec!["#text"]);

        let last_unmount = report
            .lifecycle
            .iter()
            .rposition(|e| e.phase == CallbackPhase::Unmount)
            .unwrap();
        let first_mount = report
            .lifecycle
            .iter()
            .position(|e| e.phase == CallbackPhase::Mount)
            .unwrap();
        assert!(last_unmount < first_mount);
        assert_eq!(rec.renderer().markup(), "recovered: leaf failed");
        assert!(rec.tree().find_by_type("Leaf").is_none());
    }

    #[test]
    fn test_callback_error_routed_to_boundary() {
        let (mut rec, _) = setup();
        rec.render(Element::class(Guard).child(Element::class(FailsOnMount)))
            .unwrap();
        let reports = rec.flush_sync().unwrap();
        assert_eq!(reports.len(), 2);

        let failure = &reports[0].errors[0];
        assert_eq!(failure.component, "FailsOnMount");
        assert_eq!(failure.phase, CallbackPhase::Mount);
        assert!(failure.boundary.is_some());

        assert_eq!(reports[1].lanes, Lanes::SYNC);
        assert_eq!(reports[1].names(CallbackPhase::Unmount), vec!["span", "FailsOnMount"]);
        assert_eq!(rec.renderer().markup(), "recovered: mount failed");
    }

    #[test]
    fn test_callback_error_without_boundary_tears_down() {
        let (mut rec, _) = setup();
        rec.render(Element::class(FailsOnMount)).unwrap();
        let err = rec.flush_sync().unwrap_err();
        assert!(matches!(
            &err,
            FiberError::UncaughtCallback { component, phase: CallbackPhase::Mount, .. }
                if component == "FailsOnMount"
        ));
        assert_eq!(rec.renderer().markup(), "");
        assert!(rec.tree().is_empty());
    }

    #[test]
    fn test_nested_update_limit() {
        struct Looping;

        impl Looping {
            fn bump(cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
                cx.set_state(increment());
                Ok(())
            }
        }

        impl Component for Looping {
            fn name(&self) -> &str {
                "Looping"
            }

            fn render(&self, cx: &RenderCx<'_>) -> RenderResult {
                let x = cx.state().get_int("x").unwrap_or(0);
                Ok(vec![Element::text(x.to_string())])
            }

            fn did_mount(&self, cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
                Self::bump(cx)
            }

            fn did_update(&self, cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
                Self::bump(cx)
            }
        }

        let (mut rec, _) = setup_with(ReconcilerConfig::default().with_max_nested_updates(3));
        rec.render(Element::class(Looping)).unwrap();
        let err = rec.flush_sync().unwrap_err();
        assert!(matches!(err, FiberError::NestedUpdateLimit { limit: 3 }));
        assert_eq!(rec.renderer().markup(), "3");
        assert!(!rec.has_pending_work());
    }

    #[test]
    fn test_handle_validation() {
        let (mut rec, _) = setup();
        rec.render(
            Element::host("div").child(Element::function("Item", |_| Ok(Vec::new())).with_key("x")),
        )
        .unwrap();
        rec.flush_sync().unwrap();

        let item = rec.tree().find_by_key("x").unwrap().id();
        let div = rec.tree().find_by_type("div").unwrap().id();
        assert!(matches!(
            rec.enqueue_update(div, Payload::Force, Lane::DEFAULT),
            Err(FiberError::NotStateful(id)) if id == div
        ));

        let orphan = rec.units.insert(WorkUnit::from_element(
            &Element::function("Orphan", |_| Ok(Vec::new())),
            Identity::ROOT,
            0,
        ));
        assert!(matches!(
            rec.enqueue_update(orphan, Payload::Force, Lane::DEFAULT),
            Err(FiberError::DetachedNode(id)) if id == orphan
        ));

        rec.render(Element::host("div")).unwrap();
        rec.flush_sync().unwrap();
        assert!(matches!(
            rec.enqueue_update(item, Payload::Force, Lane::DEFAULT),
            Err(FiberError::StaleHandle(id)) if id == item
        ));
    }

    #[test]
    fn test_clock_skew_surfaces() {
        let scheduler = ManualScheduler::new();
        scheduler.set_time(100);
        let mut rec = Reconciler::new(MemoryRenderer::new(), scheduler.clone(), ReconcilerConfig::default());
        scheduler.set_time(50);
        let err = rec.render(list(&["a"])).unwrap_err();
        assert!(matches!(err, FiberError::ClockSkew { previous: 100, now: 50 }));
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[test]
    fn test_observers_and_snapshots() {
        let (mut rec, _) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        rec.subscribe(move |report: &CommitReport| sink.borrow_mut().push(report.lanes));
        let snapshot = rec.snapshot();

        rec.render(list(&["a", "b"])).unwrap();
        rec.flush_sync().unwrap();
        assert_eq!(*seen.borrow(), vec![Lanes::DEFAULT]);

        let latest = snapshot.get();
        assert_eq!(latest.commit, 1);
        assert_eq!(
            latest.outline(),
            "#root\n  ul\n    li#a\n      #text\n    li#b\n      #text\n"
        );
        assert!(latest.pending.is_empty());
    }

    #[test]
    fn test_snapshots_can_be_disabled() {
        let (mut rec, _) = setup_with(ReconcilerConfig::default().with_snapshots(false));
        let snapshot = rec.snapshot();
        rec.render(list(&["a"])).unwrap();
        rec.flush_sync().unwrap();
        assert!(snapshot.get().nodes.is_empty());
    }
}
