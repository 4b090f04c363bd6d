//! Complete phase: host diffs, effect recording and lane aggregation.

use std::rc::Rc;

use super::{PassStatus, Walker};
use crate::algo::diff_props;
use crate::effect::{Effect, EffectKind};
use crate::id::UnitId;
use crate::lane::Lanes;
use crate::unit::{EffectFlags, UnitPhase, WorkKind};

impl Walker<'_> {
    /// Complete `unit`, then walk up until a sibling is found or the root
    /// completes.
    pub(super) fn complete_unit_of_work(&mut self, unit: UnitId) {
        let mut completed = unit;
        loop {
            self.complete_work(completed);
            let (parent, sibling, span) = {
                let unit = &self.units[completed];
                (unit.parent, unit.sibling, unit.effects)
            };

            let parent = match parent {
                Some(parent) if completed != self.session.root => parent,
                _ => {
                    self.session.cursor = None;
                    self.session.status = PassStatus::Complete;
                    return;
                }
            };

            let mut parent_span = self.units[parent].effects;
            self.session.effects.link(&mut parent_span, span);
            self.units[parent].effects = parent_span;

            if let Some(sibling) = sibling {
                self.session.cursor = Some(sibling);
                return;
            }
            completed = parent;
        }
    }

    /// Diff host input, fold child lanes and append the unit's own effects
    /// after those of its subtree.
    fn complete_work(&mut self, wip: UnitId) {
        self.units[wip].phase = UnitPhase::Completing;

        let mut flags = EffectFlags::empty();
        let mut payload = None;
        if let Some(current) = self.current_of(wip) {
            let (old, new) = (&self.units[current], &self.units[wip]);
            match new.kind {
                WorkKind::HostElement => {
                    let changes = diff_props(&old.memoized_props, &new.pending_props);
                    if !changes.is_empty() {
                        payload = Some(changes);
                        flags |= EffectFlags::UPDATE;
                    }
                }
                WorkKind::HostText if old.text() != new.text() => flags |= EffectFlags::UPDATE,
                _ => {}
            }
        }

        let child_lanes = self
            .units
            .children(wip)
            .into_iter()
            .fold(Lanes::empty(), |acc, child| {
                let child = &self.units[child];
                acc | child.lanes | child.child_lanes
            });

        let unit = &mut self.units[wip];
        unit.flags |= flags;
        if payload.is_some() {
            unit.update_payload = payload;
        }
        unit.memoized_props = unit.pending_props.clone();
        unit.memoized_children = Rc::clone(&unit.pending_children);
        unit.child_lanes = child_lanes;

        let own = unit.flags;
        let mut span = unit.effects;
        let effects = &mut self.session.effects;
        if own.contains(EffectFlags::PLACEMENT) {
            effects.push(&mut span, Effect::new(wip, EffectKind::Create));
        } else if own.contains(EffectFlags::MOVE) {
            effects.push(&mut span, Effect::new(wip, EffectKind::Move));
        }
        if own.contains(EffectFlags::UPDATE) {
            effects.push(&mut span, Effect::new(wip, EffectKind::Update));
        }
        if own.contains(EffectFlags::CALLBACK) {
            effects.push(&mut span, Effect::new(wip, EffectKind::Callback));
        }

        let unit = &mut self.units[wip];
        unit.effects = span;
        unit.phase = UnitPhase::Completed;
    }
}
