//! Commit engine: apply a completed pass to the host.
//!
//! Two passes over the effect list, then the swap:
//!
//! 1. **Mutation** - deletions, insertions, moves and host updates, in list
//!    order. Only this pass calls [`HostRenderer`] primitives.
//! 2. **Lifecycle** - every unmount callback first, then mount and update
//!    callbacks in list order. Callback errors are collected, never
//!    propagated mid-commit.
//!
//! After both passes the work-in-progress root becomes current and the
//! deleted units (and their alternates) are freed.

mod report;

pub use report::{CommitFailure, CommitReport, EffectRecord, LifecycleEvent};

use std::cell::RefCell;

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::effect::{Effect, EffectKind, EffectSpan};
use crate::element::{ElementKind, LifecycleCx, StateRequest};
use crate::error::{CallbackError, CallbackPhase};
use crate::host::{HostId, HostRenderer};
use crate::id::{ResourceId, UnitId};
use crate::unit::{EffectFlags, UnitArena, WorkKind};
use crate::walker::RenderSession;

/// Everything the reconciler needs after a commit.
pub(crate) struct CommitOutcome {
    pub report: CommitReport,
    /// State updates requested from lifecycle callbacks.
    pub requests: Vec<StateRequest>,
    /// Waiting boundaries now showing a fallback, by resource.
    pub waits: Vec<(ResourceId, UnitId)>,
}

/// Apply `session` and make its tree current.
pub(crate) fn commit_root<R: HostRenderer>(
    units: &mut UnitArena,
    host: &mut R,
    current_root: &mut UnitId,
    session: RenderSession,
) -> CommitOutcome {
    let RenderSession {
        lanes,
        root,
        effects,
        waits,
        ..
    } = session;
    let list = effects.to_vec(units[root].effects);
    debug!(lanes = ?lanes, effects = list.len(), "committing");

    let mut commit = Commit {
        units,
        host,
        report: CommitReport::new(lanes),
        requests: RefCell::new(Vec::new()),
        deleted: Vec::new(),
        deleted_set: FxHashSet::default(),
    };
    commit.mutation_pass(&list);
    commit.lifecycle_pass(&list);

    let Commit {
        units,
        report,
        requests,
        deleted,
        ..
    } = commit;

    let finished = &mut units[root];
    finished.effects = EffectSpan::default();
    finished.flags = EffectFlags::empty();
    *current_root = root;

    for id in deleted {
        units.remove_pair(id);
    }

    CommitOutcome {
        report,
        requests: requests.into_inner(),
        waits,
    }
}

struct Commit<'a, R> {
    units: &'a mut UnitArena,
    host: &'a mut R,
    report: CommitReport,
    requests: RefCell<Vec<StateRequest>>,
    /// Units of deleted subtrees, post-order.
    deleted: Vec<UnitId>,
    deleted_set: FxHashSet<UnitId>,
}

impl<R: HostRenderer> Commit<'_, R> {
    // =========================================================================
    // Mutation pass
    // =========================================================================

    fn mutation_pass(&mut self, effects: &[Effect]) {
        for effect in effects {
            let unit = &self.units[effect.unit];
            self.report.effects.push(EffectRecord {
                unit: effect.unit,
                identity: unit.identity,
                type_name: unit.type_name().into(),
                kind: effect.kind,
            });
            match effect.kind {
                EffectKind::Delete => self.commit_deletion(effect.unit),
                EffectKind::Create => self.commit_placement(effect.unit),
                EffectKind::Move => self.commit_move(effect.unit),
                EffectKind::Update => self.commit_update(effect.unit),
                EffectKind::Callback => {}
            }
        }
    }

    fn commit_deletion(&mut self, id: UnitId) {
        match self.host_parent(id) {
            Some(parent) => {
                for node in self.host_roots(id) {
                    self.host.remove_child(parent, node);
                }
            }
            None => warn!(unit = ?id, "deleted unit has no host parent"),
        }
        let mut subtree = Vec::new();
        self.post_order(id, &mut subtree);
        self.deleted_set.extend(subtree.iter().copied());
        self.deleted.extend(subtree);
    }

    fn commit_placement(&mut self, id: UnitId) {
        self.instantiate(id);
        self.insert(id);
        self.units[id].flags.remove(EffectFlags::PLACEMENT);
    }

    fn commit_move(&mut self, id: UnitId) {
        self.insert(id);
        self.units[id].flags.remove(EffectFlags::MOVE);
    }

    fn commit_update(&mut self, id: UnitId) {
        let unit = &mut self.units[id];
        unit.flags.remove(EffectFlags::UPDATE);
        let payload = unit.update_payload.take();
        let unit = &self.units[id];
        match (unit.kind, unit.host) {
            (WorkKind::HostElement, Some(node)) => {
                if let Some(changes) = payload {
                    self.host.update_instance(node, &changes);
                }
            }
            (WorkKind::HostText, Some(node)) => {
                if let Some(text) = unit.text() {
                    self.host.update_text(node, text);
                }
            }
            _ => warn!(unit = ?id, "update effect on a unit without a host node"),
        }
    }

    /// Create host nodes for a new subtree, children first, assembling them
    /// detached from the host tree.
    fn instantiate(&mut self, id: UnitId) {
        for child in self.units.children(id) {
            self.instantiate(child);
        }
        let unit = &self.units[id];
        let node = match (&unit.ty, unit.kind) {
            (ElementKind::Host(tag), WorkKind::HostElement) => {
                self.host.create_instance(tag, &unit.memoized_props)
            }
            (ElementKind::Text(text), WorkKind::HostText) => self.host.create_text(text),
            _ => return,
        };
        for child in self.child_host_roots(id) {
            self.host.append_child(node, child);
        }
        self.units[id].host = Some(node);
    }

    /// Put the top host nodes of `id` at its position: before the next
    /// stable host sibling, or last.
    fn insert(&mut self, id: UnitId) {
        let Some(parent) = self.host_parent(id) else {
            warn!(unit = ?id, "placed unit has no host parent");
            return;
        };
        let before = self.host_sibling(id);
        for node in self.host_roots(id) {
            match before {
                Some(before) => self.host.insert_before(parent, node, before),
                None => self.host.append_child(parent, node),
            }
        }
    }

    // =========================================================================
    // Lifecycle pass
    // =========================================================================

    fn lifecycle_pass(&mut self, effects: &[Effect]) {
        let deleted = std::mem::take(&mut self.deleted);
        for &id in &deleted {
            self.unmount(id);
        }
        self.deleted = deleted;

        for effect in effects {
            match effect.kind {
                EffectKind::Create => {
                    let mut subtree = Vec::new();
                    self.post_order(effect.unit, &mut subtree);
                    for id in subtree {
                        self.mount(id);
                    }
                }
                EffectKind::Callback => self.run_update_callbacks(effect.unit),
                _ => {}
            }
        }
    }

    fn record(&mut self, id: UnitId, phase: CallbackPhase) {
        let type_name = self.units[id].type_name().into();
        self.report.lifecycle.push(LifecycleEvent {
            unit: id,
            type_name,
            phase,
        });
    }

    fn unmount(&mut self, id: UnitId) {
        self.record(id, CallbackPhase::Unmount);
        let unit = &self.units[id];
        let ElementKind::Class(component) = &unit.ty else {
            return;
        };
        let result = component.will_unmount(&LifecycleCx {
            unit: id,
            props: &unit.memoized_props,
            state: &unit.memoized_state,
            previous: None,
            requests: &self.requests,
        });
        if let Err(error) = result {
            self.fail(id, CallbackPhase::Unmount, error);
        }
    }

    fn mount(&mut self, id: UnitId) {
        self.record(id, CallbackPhase::Mount);
        let unit = &self.units[id];
        let ElementKind::Class(component) = &unit.ty else {
            return;
        };
        let result = component.did_mount(&LifecycleCx {
            unit: id,
            props: &unit.memoized_props,
            state: &unit.memoized_state,
            previous: None,
            requests: &self.requests,
        });
        if let Err(error) = result {
            self.fail(id, CallbackPhase::Mount, error);
        }
    }

    /// `did_update` for class components, then the callbacks of the updates
    /// applied to the unit.
    fn run_update_callbacks(&mut self, id: UnitId) {
        self.units[id].flags.remove(EffectFlags::CALLBACK);
        if let ElementKind::Class(component) = &self.units[id].ty {
            let component = component.clone();
            self.record(id, CallbackPhase::Update);
            let unit = &self.units[id];
            let previous = self
                .units
                .alternate(id)
                .and_then(|alt| self.units.get(alt))
                .map(|old| (&old.memoized_props, &old.memoized_state));
            let result = component.did_update(&LifecycleCx {
                unit: id,
                props: &unit.memoized_props,
                state: &unit.memoized_state,
                previous,
                requests: &self.requests,
            });
            if let Err(error) = result {
                self.fail(id, CallbackPhase::Update, error);
            }
        }

        let callbacks = std::mem::take(&mut self.units[id].callbacks);
        for callback in callbacks {
            self.record(id, CallbackPhase::UpdateCallback);
            callback(&self.units[id].memoized_state);
        }
    }

    fn fail(&mut self, id: UnitId, phase: CallbackPhase, error: CallbackError) {
        let component = self.units[id].type_name().to_string();
        let boundary = self.boundary_of(id);
        warn!(component = %component, %phase, %error, ?boundary, "lifecycle callback failed");
        self.report.errors.push(CommitFailure {
            unit: id,
            component,
            phase,
            error,
            boundary,
        });
    }

    // =========================================================================
    // Tree queries
    // =========================================================================

    /// Nearest error boundary above `id` that stays mounted.
    fn boundary_of(&self, id: UnitId) -> Option<UnitId> {
        let mut cursor = self.units.get(id)?.parent;
        while let Some(parent) = cursor {
            let unit = self.units.get(parent)?;
            if unit.is_error_boundary() && !self.deleted_set.contains(&parent) {
                return Some(parent);
            }
            cursor = unit.parent;
        }
        None
    }

    fn post_order(&self, id: UnitId, out: &mut Vec<UnitId>) {
        for child in self.units.children(id) {
            self.post_order(child, out);
        }
        out.push(id);
    }

    /// Host node of the nearest host ancestor (or the root container).
    fn host_parent(&self, id: UnitId) -> Option<HostId> {
        let mut cursor = self.units.get(id)?.parent;
        while let Some(parent) = cursor {
            let unit = self.units.get(parent)?;
            if matches!(unit.kind, WorkKind::HostElement | WorkKind::HostRoot) {
                return unit.host;
            }
            cursor = unit.parent;
        }
        None
    }

    /// Topmost host nodes inside the subtree of `id`.
    fn host_roots(&self, id: UnitId) -> Vec<HostId> {
        let mut out = Vec::new();
        self.collect_host_roots(id, &mut out);
        out
    }

    fn child_host_roots(&self, id: UnitId) -> Vec<HostId> {
        let mut out = Vec::new();
        for child in self.units.children(id) {
            self.collect_host_roots(child, &mut out);
        }
        out
    }

    fn collect_host_roots(&self, id: UnitId, out: &mut Vec<HostId>) {
        let unit = &self.units[id];
        if unit.kind.is_host() {
            out.extend(unit.host);
            return;
        }
        for child in self.units.children(id) {
            self.collect_host_roots(child, out);
        }
    }

    /// First host node after `id` in tree order that is already in place,
    /// skipping units still waiting for their own insertion.
    fn host_sibling(&self, id: UnitId) -> Option<HostId> {
        let pending = EffectFlags::PLACEMENT | EffectFlags::MOVE;
        let mut node = id;
        'siblings: loop {
            loop {
                let unit = self.units.get(node)?;
                if let Some(sibling) = unit.sibling {
                    node = sibling;
                    break;
                }
                let parent = unit.parent?;
                if matches!(
                    self.units.get(parent)?.kind,
                    WorkKind::HostElement | WorkKind::HostRoot
                ) {
                    return None;
                }
                node = parent;
            }

            loop {
                let unit = self.units.get(node)?;
                if unit.flags.intersects(pending) {
                    continue 'siblings;
                }
                if unit.kind.is_host() {
                    match unit.host {
                        Some(host) => return Some(host),
                        None => continue 'siblings,
                    }
                }
                match unit.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
        }
    }
}
