//! Flat, singly linked effect list.
//!
//! Every pass owns one [`EffectList`] node pool. Each unit keeps an
//! [`EffectSpan`] (first/last node of its subtree's chain). When a unit
//! completes, its own effects are linked after its children's, and the
//! whole span is then linked onto its parent's span:
//!
//! ```text
//! parent span:  [deletions] -> [child 1 subtree] -> [child 2 subtree] -> [parent]
//! ```
//!
//! Linking is O(1), so the final list is built without re-walking the tree
//! and the commit engine consumes it in one linear pass.

use crate::id::UnitId;

// =============================================================================
// Effect
// =============================================================================

/// Kind of recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Instantiate and insert a new host subtree.
    Create,
    /// Re-insert an existing host subtree at a new position.
    Move,
    /// Apply property or text changes.
    Update,
    /// Detach a subtree and run its unmount callbacks.
    Delete,
    /// Run lifecycle or update callbacks.
    Callback,
}

/// One recorded mutation on one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub unit: UnitId,
    pub kind: EffectKind,
}

impl Effect {
    #[inline]
    pub const fn new(unit: UnitId, kind: EffectKind) -> Self {
        Self { unit, kind }
    }
}

// =============================================================================
// EffectList
// =============================================================================

/// First and last node of a chain in an [`EffectList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectSpan {
    first: Option<u32>,
    last: Option<u32>,
}

impl EffectSpan {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

#[derive(Debug, Clone)]
struct EffectNode {
    effect: Effect,
    next: Option<u32>,
}

/// Node pool for the effect chains of one pass.
#[derive(Debug, Clone, Default)]
pub struct EffectList {
    nodes: Vec<EffectNode>,
}

impl EffectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one effect to the end of `span`.
    pub fn push(&mut self, span: &mut EffectSpan, effect: Effect) {
        let index = self.nodes.len() as u32;
        self.nodes.push(EffectNode { effect, next: None });
        self.link(span, EffectSpan {
            first: Some(index),
            last: Some(index),
        });
    }

    /// Link the chain `tail` after `span`.
    pub fn link(&mut self, span: &mut EffectSpan, tail: EffectSpan) {
        let Some(first) = tail.first else {
            return;
        };
        match span.last {
            Some(last) => self.nodes[last as usize].next = Some(first),
            None => span.first = Some(first),
        }
        span.last = tail.last;
    }

    /// Walk the chain starting at `span`.
    pub fn iter(&self, span: EffectSpan) -> EffectIter<'_> {
        EffectIter {
            list: self,
            cursor: span.first,
        }
    }

    /// Collect the chain into a vector.
    pub fn to_vec(&self, span: EffectSpan) -> Vec<Effect> {
        self.iter(span).copied().collect()
    }

    /// Total nodes allocated in this pass.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Iterator over one effect chain.
pub struct EffectIter<'a> {
    list: &'a EffectList,
    cursor: Option<u32>,
}

impl<'a> Iterator for EffectIter<'a> {
    type Item = &'a Effect;

    fn next(&mut self) -> Option<&'a Effect> {
        let node = self.list.nodes.get(self.cursor? as usize)?;
        self.cursor = node.next;
        Some(&node.effect)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(n: u32) -> UnitId {
        UnitId::new(n, 0)
    }

    #[test]
    fn test_children_before_parent() {
        let mut list = EffectList::new();
        let mut parent = EffectSpan::default();
        list.push(&mut parent, Effect::new(unit(9), EffectKind::Delete));

        let mut first = EffectSpan::default();
        list.push(&mut first, Effect::new(unit(1), EffectKind::Create));
        let mut second = EffectSpan::default();
        list.push(&mut second, Effect::new(unit(3), EffectKind::Update));
        list.push(&mut second, Effect::new(unit(2), EffectKind::Move));

        list.link(&mut parent, first);
        list.link(&mut parent, second);
        list.link(&mut parent, EffectSpan::default());
        list.push(&mut parent, Effect::new(unit(0), EffectKind::Callback));

        let units: Vec<u32> = list.iter(parent).map(|e| e.unit.index()).collect();
        assert_eq!(units, vec![9, 1, 3, 2, 0]);
    }

    #[test]
    fn test_empty_span() {
        let list = EffectList::new();
        let span = EffectSpan::default();
        assert!(span.is_empty());
        assert_eq!(list.iter(span).count(), 0);
    }
}
