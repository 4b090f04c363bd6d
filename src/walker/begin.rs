//! Begin phase: bail out or evaluate a unit, then reconcile its children.

use std::rc::Rc;

use tracing::trace;

use super::Walker;
use crate::algo::{plan_children, ChildPlan};
use crate::effect::{Effect, EffectKind};
use crate::element::{children_eq, Element, ElementKind, Interrupt, RenderCx};
use crate::id::{Identity, Key, UnitId};
use crate::lane::Lanes;
use crate::props::Props;
use crate::unit::{EffectFlags, UnitPhase, UnitQueue, WorkKind, WorkUnit};

/// Key of the fragment wrapping a waiting boundary's primary children.
pub(crate) const PRIMARY_KEY: &str = "#primary";

/// Key of the fragment wrapping a waiting boundary's fallback.
pub(crate) const FALLBACK_KEY: &str = "#fallback";

impl Walker<'_> {
    /// Begin `wip`. Returns its first child to walk next, `None` when the
    /// unit should complete right away.
    pub(super) fn begin_work(&mut self, wip: UnitId) -> Result<Option<UnitId>, Interrupt> {
        self.units[wip].phase = UnitPhase::Beginning;
        let render_lanes = self.session.lanes;

        if let Some(current) = self.current_of(wip) {
            let (old, new) = (&self.units[current], &self.units[wip]);
            let unchanged = old.memoized_props == new.pending_props
                && children_eq(&old.memoized_children, &new.pending_children)
                && old.ty.content_eq(&new.ty)
                && !new.flags.contains(EffectFlags::DID_CAPTURE);
            if unchanged && !new.lanes.intersects(render_lanes) {
                return Ok(self.bail_out(wip));
            }
        }

        self.units[wip].phase = UnitPhase::Evaluated;
        match self.units[wip].kind {
            WorkKind::HostRoot => Ok(self.update_host_root(wip)),
            WorkKind::HostElement | WorkKind::Fragment => {
                let unit = &mut self.units[wip];
                unit.lanes = Lanes::empty();
                let children = Rc::clone(&unit.pending_children);
                Ok(self.reconcile_children(wip, children))
            }
            WorkKind::HostText => {
                self.units[wip].lanes = Lanes::empty();
                Ok(None)
            }
            WorkKind::Function => self.update_function(wip),
            WorkKind::Class => self.update_class(wip),
            WorkKind::Waiting => Ok(self.update_waiting(wip)),
        }
    }

    /// Skip evaluation of an unchanged unit. Its children are walked only if
    /// some descendant has work in the rendered lanes.
    fn bail_out(&mut self, wip: UnitId) -> Option<UnitId> {
        let unit = &mut self.units[wip];
        unit.phase = UnitPhase::Bailed;
        if !unit.child_lanes.intersects(self.session.lanes) {
            trace!(unit = ?wip, ty = unit.type_name(), "bail out, subtree skipped");
            return None;
        }
        trace!(unit = ?wip, ty = unit.type_name(), "bail out, cloning children");
        self.clone_child_units(wip)
    }

    /// Replace the current children hanging off `wip` with their
    /// work-in-progress counterparts, keeping their input.
    fn clone_child_units(&mut self, wip: UnitId) -> Option<UnitId> {
        let mut cursor = self.units[wip].child;
        let mut first = None;
        let mut previous: Option<UnitId> = None;
        while let Some(current_child) = cursor {
            cursor = self.units[current_child].sibling;
            let child = self.work_in_progress(current_child, None);
            let unit = &mut self.units[child];
            unit.parent = Some(wip);
            unit.sibling = None;
            match previous {
                Some(previous) => self.units[previous].sibling = Some(child),
                None => first = Some(child),
            }
            previous = Some(child);
        }
        self.units[wip].child = first;
        first
    }

    // =========================================================================
    // Evaluation by kind
    // =========================================================================

    fn update_host_root(&mut self, wip: UnitId) -> Option<UnitId> {
        let lanes = self.session.lanes;
        let unit = &mut self.units[wip];
        let element = match &mut unit.queue {
            UnitQueue::Root { queue, state } => {
                let processed = queue.process(lanes);
                *state = processed.state;
                unit.lanes = processed.remaining;
                state.element.clone()
            }
            _ => None,
        };
        let children: Vec<Element> = element.into_iter().collect();
        self.reconcile_children(wip, Rc::from(children))
    }

    /// Fold the unit's update queue for the rendered lanes.
    fn process_state(&mut self, wip: UnitId) {
        let lanes = self.session.lanes;
        let unit = &mut self.units[wip];
        let UnitQueue::State(queue) = &mut unit.queue else {
            unit.lanes = Lanes::empty();
            return;
        };
        let processed = queue.process(lanes);
        unit.memoized_state = processed.state;
        unit.lanes = processed.remaining;
        if !processed.callbacks.is_empty() {
            unit.callbacks.extend(processed.callbacks);
            unit.flags |= EffectFlags::CALLBACK;
        }
    }

    fn update_function(&mut self, wip: UnitId) -> Result<Option<UnitId>, Interrupt> {
        self.process_state(wip);
        let unit = &self.units[wip];
        let ElementKind::Function(func) = &unit.ty else {
            return Ok(None);
        };
        let output = func.clone().call(&RenderCx {
            unit: wip,
            identity: unit.identity,
            props: &unit.pending_props,
            state: &unit.memoized_state,
            children: &unit.pending_children,
            lanes: self.session.lanes,
        })?;
        Ok(self.reconcile_children(wip, Rc::from(output)))
    }

    fn update_class(&mut self, wip: UnitId) -> Result<Option<UnitId>, Interrupt> {
        self.process_state(wip);
        let has_current = self.current_of(wip).is_some();
        let unit = &self.units[wip];
        let ElementKind::Class(component) = &unit.ty else {
            return Ok(None);
        };
        let component = Rc::clone(component);
        let recovering = unit.captured.is_some();
        let output = match &unit.captured {
            Some(error) => {
                trace!(unit = ?wip, ty = component.name(), %error, "rendering recovery output");
                component.recover(error, &unit.pending_props)
            }
            None => component.render(&RenderCx {
                unit: wip,
                identity: unit.identity,
                props: &unit.pending_props,
                state: &unit.memoized_state,
                children: &unit.pending_children,
                lanes: self.session.lanes,
            })?,
        };

        let unit = &mut self.units[wip];
        if recovering {
            unit.flags |= EffectFlags::DID_CAPTURE;
        }
        if has_current {
            unit.flags |= EffectFlags::CALLBACK;
        }
        Ok(self.reconcile_children(wip, Rc::from(output)))
    }

    /// A waiting boundary renders exactly one keyed fragment: its primary
    /// children, or its fallback after a descendant waited in this pass.
    fn update_waiting(&mut self, wip: UnitId) -> Option<UnitId> {
        let unit = &mut self.units[wip];
        unit.lanes = Lanes::empty();
        let show_fallback = unit.flags.contains(EffectFlags::DID_CAPTURE);
        unit.showing_fallback = show_fallback;

        let (key, children) = match (&unit.ty, show_fallback) {
            (ElementKind::Waiting { fallback }, true) => (FALLBACK_KEY, Rc::clone(fallback)),
            _ => (PRIMARY_KEY, Rc::clone(&unit.pending_children)),
        };
        let wrapper = Element {
            kind: ElementKind::Fragment,
            key: Some(Key::from(key)),
            props: Props::new(),
            children,
        };
        self.reconcile_children(wip, Rc::from(vec![wrapper]))
    }

    // =========================================================================
    // Child reconciliation
    // =========================================================================

    /// Match `children` against the current children of `wip` and link the
    /// resulting work-in-progress children under it.
    ///
    /// Units mounting for the first time (no current counterpart) place their
    /// whole subtree with a single create effect at the top, so their
    /// children are not tagged.
    pub(super) fn reconcile_children(&mut self, wip: UnitId, children: Rc<[Element]>) -> Option<UnitId> {
        let current = self.current_of(wip);
        let track = current.is_some();
        let old: Vec<UnitId> = current.map(|c| self.units.children(c)).unwrap_or_default();

        let plan = {
            let units = &*self.units;
            let old_keys: Vec<Option<&Key>> = old.iter().map(|id| units[*id].key.as_ref()).collect();
            let new_keys: Vec<Option<&Key>> = children.iter().map(|e| e.key.as_ref()).collect();
            plan_children(&old_keys, &new_keys, |i, j| {
                units[old[i]].ty.same_type(&children[j].kind)
            })
        };

        for &index in &plan.deletions {
            self.delete_child(wip, old[index]);
        }

        let parent_identity = self.units[wip].identity;
        let mut first = None;
        let mut previous: Option<UnitId> = None;
        for (position, (step, element)) in plan.children.iter().zip(children.iter()).enumerate() {
            let child = match *step {
                ChildPlan::Reuse { old: index, moved } => {
                    let child = self.work_in_progress(old[index], Some(element));
                    if moved {
                        self.units[child].flags |= EffectFlags::MOVE;
                    }
                    child
                }
                ChildPlan::Create => {
                    let identity =
                        Identity::child(parent_identity, element.type_name(), element.key.as_ref(), position);
                    let child = self.create_unit(WorkUnit::from_element(element, identity, position));
                    if track {
                        self.units[child].flags |= EffectFlags::PLACEMENT;
                    }
                    child
                }
            };

            let unit = &mut self.units[child];
            unit.index = position;
            unit.parent = Some(wip);
            unit.sibling = None;
            match previous {
                Some(previous) => self.units[previous].sibling = Some(child),
                None => first = Some(child),
            }
            previous = Some(child);
        }

        if plan.moves() > 0 || !plan.deletions.is_empty() {
            trace!(
                unit = ?wip,
                moves = plan.moves(),
                creates = plan.creates(),
                deletions = plan.deletions.len(),
                "reconciled children"
            );
        }
        self.units[wip].child = first;
        first
    }

    /// Record `child` (a current unit) for deletion under `wip`.
    fn delete_child(&mut self, wip: UnitId, child: UnitId) {
        let unit = &mut self.units[wip];
        unit.deletions.push(child);
        unit.flags |= EffectFlags::CHILD_DELETION;
        let mut span = unit.effects;
        self.session.effects.push(&mut span, Effect::new(child, EffectKind::Delete));
        self.units[wip].effects = span;
    }
}
