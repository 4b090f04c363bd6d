//! Unwinding: route render errors and waits to the nearest boundary.

use tracing::{debug, warn};

use super::{PassStatus, Walker};
use crate::effect::EffectSpan;
use crate::element::Interrupt;
use crate::id::UnitId;
use crate::unit::{EffectFlags, UnitPhase, WorkKind, WorkUnit};

impl Walker<'_> {
    /// `unit` did not produce children. Restart at the boundary that takes
    /// over, or end the pass when there is none.
    pub(super) fn throw(&mut self, unit: UnitId, interrupt: Interrupt) {
        self.units[unit].flags |= EffectFlags::INCOMPLETE;
        match interrupt {
            Interrupt::Error(error) => {
                let boundary = self.find_ancestor(unit, |u| {
                    u.is_error_boundary() && !u.flags.contains(EffectFlags::DID_CAPTURE)
                });
                match boundary {
                    Some(boundary) => {
                        warn!(
                            unit = ?unit,
                            boundary = ?boundary,
                            ty = self.units[boundary].type_name(),
                            %error,
                            "render error captured"
                        );
                        self.restart_at(boundary);
                        let boundary = &mut self.units[boundary];
                        boundary.captured = Some(error);
                        boundary.flags |= EffectFlags::DID_CAPTURE;
                    }
                    None => {
                        let component = self.units[unit].type_name().to_string();
                        debug!(component = %component, %error, "render error has no boundary");
                        self.session.cursor = None;
                        self.session.status = PassStatus::Fatal { component, error };
                    }
                }
            }
            Interrupt::Pending(resource) => {
                let boundary = self.find_ancestor(unit, |u| {
                    u.kind == WorkKind::Waiting && !u.flags.contains(EffectFlags::DID_CAPTURE)
                });
                match boundary {
                    Some(boundary) => {
                        debug!(unit = ?unit, boundary = ?boundary, %resource, "showing fallback");
                        self.session.waits.push((resource, boundary));
                        self.restart_at(boundary);
                        self.units[boundary].flags |= EffectFlags::DID_CAPTURE;
                    }
                    None => {
                        debug!(unit = ?unit, %resource, "pass suspended");
                        self.session.cursor = None;
                        self.session.status = PassStatus::Suspended(resource);
                    }
                }
            }
        }
    }

    /// Nearest proper ancestor of `unit` matching `predicate`.
    fn find_ancestor(&self, unit: UnitId, predicate: impl Fn(&WorkUnit) -> bool) -> Option<UnitId> {
        let mut cursor = self.units[unit].parent;
        while let Some(id) = cursor {
            let ancestor = &self.units[id];
            if predicate(ancestor) {
                return Some(id);
            }
            cursor = ancestor.parent;
        }
        None
    }

    /// Drop the partial subtree under `boundary` and walk it again.
    fn restart_at(&mut self, boundary: UnitId) {
        let mut stack = self.units.children(boundary);
        while let Some(id) = stack.pop() {
            stack.extend(self.units.children(id));
            if self.session.fresh.remove(&id) {
                self.units.remove(id);
            }
        }

        let current_child = self.current_of(boundary).and_then(|c| self.units[c].child);
        let unit = &mut self.units[boundary];
        unit.child = current_child;
        unit.deletions.clear();
        unit.effects = EffectSpan::default();
        unit.flags &= EffectFlags::PLACEMENT | EffectFlags::MOVE | EffectFlags::CALLBACK;
        unit.update_payload = None;
        unit.phase = UnitPhase::Pending;
        self.session.cursor = Some(boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::super::RenderSession;
    use super::*;
    use crate::element::{Component, Element, RenderCx, RenderResult};
    use crate::error::RenderError;
    use crate::host::HostId;
    use crate::id::ResourceId;
    use crate::lane::{Lane, Lanes};
    use crate::unit::{RootState, UnitArena, UnitQueue};
    use crate::update::{Payload, Update};

    struct Boundary;

    impl Component for Boundary {
        fn name(&self) -> &str {
            "Boundary"
        }

        fn render(&self, cx: &RenderCx<'_>) -> RenderResult {
            Ok(cx.children().to_vec())
        }

        fn is_error_boundary(&self) -> bool {
            true
        }

        fn recover(&self, error: &RenderError, _props: &crate::props::Props) -> Vec<Element> {
            vec![Element::text(format!("failed: {}", error.message()))]
        }
    }

    fn run(element: Element) -> (UnitArena, RenderSession) {
        let mut units = UnitArena::new();
        let root = units.insert(WorkUnit::root(HostId(0)));
        if let UnitQueue::Root { queue, .. } = &mut units[root].queue {
            queue.enqueue(Update::new(
                Lane::DEFAULT,
                1,
                Payload::Replace(RootState {
                    element: Some(element),
                }),
            ));
        }
        units[root].lanes = Lanes::DEFAULT;
        let mut session = RenderSession::start(&mut units, root, Lanes::DEFAULT, 0);
        Walker::new(&mut units, &mut session).work_loop(|| Ok(false)).unwrap();
        (units, session)
    }

    fn broken() -> Element {
        Element::function("Broken", |_| Err(RenderError::new("boom").into()))
    }

    #[test]
    fn test_error_boundary_renders_recovery() {
        let (units, session) = run(
            Element::class(Boundary).with_children([Element::host("div").child(broken())]),
        );
        assert_eq!(session.status, PassStatus::Complete);

        let boundary = units[session.root].child.unwrap();
        assert!(units[boundary].captured.is_some());
        let text = units[boundary].child.unwrap();
        assert_eq!(units[text].text(), Some("failed: boom"));
        // The discarded div and function units were freed: root, boundary, text.
        assert_eq!(session.fresh.len(), 3);
    }

    #[test]
    fn test_wait_shows_fallback() {
        let pending = Element::function("Data", |_| Err(Interrupt::Pending(ResourceId(7))));
        let (units, session) = run(Element::waiting([pending], [Element::text("loading")]));
        assert_eq!(session.status, PassStatus::Complete);
        assert_eq!(session.waits.len(), 1);
        assert_eq!(session.waits[0].0, ResourceId(7));

        let boundary = units[session.root].child.unwrap();
        assert!(units[boundary].showing_fallback);
        let wrapper = units[boundary].child.unwrap();
        let text = units[wrapper].child.unwrap();
        assert_eq!(units[text].text(), Some("loading"));
    }

    #[test]
    fn test_wait_without_boundary_suspends() {
        let pending = Element::function("Data", |_| Err(Interrupt::Pending(ResourceId(1))));
        let (_, session) = run(Element::host("main").child(pending));
        assert_eq!(session.status, PassStatus::Suspended(ResourceId(1)));
    }

    #[test]
    fn test_error_in_recovery_escapes_boundary() {
        struct Fragile;
        impl Component for Fragile {
            fn name(&self) -> &str {
                "Fragile"
            }
            fn render(&self, _cx: &RenderCx<'_>) -> RenderResult {
                Err(RenderError::new("first").into())
            }
        }

        struct BadBoundary;
        impl Component for BadBoundary {
            fn name(&self) -> &str {
                "BadBoundary"
            }
            fn render(&self, _cx: &RenderCx<'_>) -> RenderResult {
                Ok(vec![Element::class(Fragile)])
            }
            fn is_error_boundary(&self) -> bool {
                true
            }
            fn recover(&self, _error: &RenderError, _props: &crate::props::Props) -> Vec<Element> {
                vec![Element::function("AlsoBroken", |_| Err(RenderError::new("second").into()))]
            }
        }

        let (_, session) = run(Element::class(BadBoundary));
        assert_eq!(
            session.status,
            PassStatus::Fatal {
                component: "AlsoBroken".to_string(),
                error: RenderError::new("second"),
            }
        );
    }
}
