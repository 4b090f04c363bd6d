//! What a commit did, for callers and observers.

use compact_str::CompactString;

use crate::effect::EffectKind;
use crate::error::{CallbackError, CallbackPhase};
use crate::id::{Identity, UnitId};
use crate::lane::Lanes;

/// One applied effect.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRecord {
    pub unit: UnitId,
    pub identity: Identity,
    pub type_name: CompactString,
    pub kind: EffectKind,
}

/// One lifecycle step taken in the lifecycle pass.
///
/// Mount and unmount events are recorded for every unit of a created or
/// deleted subtree, components and host nodes alike; callbacks only run on
/// class components.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub unit: UnitId,
    pub type_name: CompactString,
    pub phase: CallbackPhase,
}

/// A lifecycle callback that returned an error.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitFailure {
    pub unit: UnitId,
    /// Type name of the failing component.
    pub component: String,
    pub phase: CallbackPhase,
    pub error: CallbackError,
    /// Nearest mounted error boundary above the failing unit.
    pub boundary: Option<UnitId>,
}

/// Summary of one commit.
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    /// Lanes the committed pass rendered.
    pub lanes: Lanes,
    /// Effects in application order.
    pub effects: Vec<EffectRecord>,
    /// Lifecycle events in execution order.
    pub lifecycle: Vec<LifecycleEvent>,
    pub errors: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn new(lanes: Lanes) -> Self {
        Self {
            lanes,
            ..Self::default()
        }
    }

    /// Number of effects of `kind`.
    pub fn count(&self, kind: EffectKind) -> usize {
        self.effects.iter().filter(|e| e.kind == kind).count()
    }

    /// Whether the commit changed nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Lifecycle events of one phase, in order.
    pub fn events(&self, phase: CallbackPhase) -> impl Iterator<Item = &LifecycleEvent> {
        self.lifecycle.iter().filter(move |e| e.phase == phase)
    }

    /// Type names of the units with lifecycle events of `phase`.
    pub fn names(&self, phase: CallbackPhase) -> Vec<&str> {
        self.events(phase).map(|e| e.type_name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: EffectKind) -> EffectRecord {
        EffectRecord {
            unit: UnitId::new(0, 0),
            identity: Identity::ROOT,
            type_name: "li".into(),
            kind,
        }
    }

    #[test]
    fn test_counts() {
        let mut report = CommitReport::new(Lanes::DEFAULT);
        assert!(report.is_empty());
        report.effects.push(record(EffectKind::Move));
        report.effects.push(record(EffectKind::Update));
        report.effects.push(record(EffectKind::Move));
        assert_eq!(report.count(EffectKind::Move), 2);
        assert_eq!(report.count(EffectKind::Delete), 0);
    }

    #[test]
    fn test_names_by_phase() {
        let mut report = CommitReport::default();
        for (name, phase) in [("A", CallbackPhase::Unmount), ("B", CallbackPhase::Mount)] {
            report.lifecycle.push(LifecycleEvent {
                unit: UnitId::new(0, 0),
                type_name: name.into(),
                phase,
            });
        }
        assert_eq!(report.names(CallbackPhase::Mount), vec!["B"]);
        assert_eq!(report.names(CallbackPhase::Unmount), vec!["A"]);
    }
}
