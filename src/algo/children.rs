//! Single-pass keyed child reconciliation.
//!
//! Plans how one sibling group changes: which old children are reused
//! (and whether they moved), which new children are created, and which old
//! children are deleted. The planner is pure; the walker applies the plan to
//! work units.
//!
//! # Algorithm
//!
//! 1. **Lockstep prefix**: walk both lists while keys line up (unkeyed
//!    children line up by position). Same type reuses, different type
//!    replaces.
//! 2. **Map**: the remaining old children are indexed by key (or by position
//!    when unkeyed). For duplicate keys the first one wins.
//! 3. **Match**: each remaining new child takes its entry out of the map.
//!    A type mismatch deletes the old child and creates a new one. Unmatched
//!    new children are created; whatever is left in the map is deleted.
//! 4. **Moves**: scan the matched children from the tail. A watermark holds
//!    the smallest old index retained so far. A child whose old index is
//!    above the watermark moves; otherwise it stays and lowers the watermark.
//!
//! `[a, b, c] -> [c, a, b]`: `b` (1) and `a` (0) stay, `c` (2) > 0 moves.
//! One move.
//!
//! This is a greedy O(n) approximation, not a minimum-move diff. Stayed
//! children keep their relative host order, so every moved child can be
//! inserted before its next stayed sibling.
//!
//! # Complexity
//!
//! - Time: O(n + m)
//! - Space: O(m) for the map

use rustc_hash::FxHashMap;

use crate::id::Key;

// =============================================================================
// Public Types
// =============================================================================

/// What happens to one new child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPlan {
    /// Reuse the old child at `old`.
    Reuse { old: usize, moved: bool },
    /// Create a new child.
    Create,
}

impl ChildPlan {
    #[inline]
    pub fn is_move(&self) -> bool {
        matches!(self, ChildPlan::Reuse { moved: true, .. })
    }
}

/// Plan for one sibling group.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[must_use]
pub struct ReconcilePlan {
    /// One entry per new child, in new order.
    pub children: Vec<ChildPlan>,
    /// Old children to delete, in old order.
    pub deletions: Vec<usize>,
}

impl ReconcilePlan {
    pub fn moves(&self) -> usize {
        self.children.iter().filter(|c| c.is_move()).count()
    }

    pub fn creates(&self) -> usize {
        self.children
            .iter()
            .filter(|c| matches!(c, ChildPlan::Create))
            .count()
    }
}

/// Match key of a child: explicit key, or position when unkeyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MatchKey<'a> {
    Key(&'a Key),
    Index(usize),
}

impl<'a> MatchKey<'a> {
    #[inline]
    fn of(key: Option<&'a Key>, index: usize) -> Self {
        match key {
            Some(key) => MatchKey::Key(key),
            None => MatchKey::Index(index),
        }
    }
}

// =============================================================================
// Main API
// =============================================================================

/// Plan the reconciliation of one sibling group.
///
/// `old` and `new` hold each child's explicit key; `same_type(old, new)`
/// compares the types of the children at those indices.
pub fn plan_children(
    old: &[Option<&Key>],
    new: &[Option<&Key>],
    same_type: impl Fn(usize, usize) -> bool,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        children: Vec::with_capacity(new.len()),
        deletions: Vec::new(),
    };

    // 1. Lockstep prefix
    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
        if same_type(prefix, prefix) {
            plan.children.push(ChildPlan::Reuse {
                old: prefix,
                moved: false,
            });
        } else {
            plan.deletions.push(prefix);
            plan.children.push(ChildPlan::Create);
        }
        prefix += 1;
    }

    // Quick path: only appends or only removals left
    if prefix == old.len() {
        plan.children
            .extend(std::iter::repeat_n(ChildPlan::Create, new.len() - prefix));
        return plan;
    }
    if prefix == new.len() {
        plan.deletions.extend(prefix..old.len());
        return plan;
    }

    // 2. Map remaining old children; first seen wins
    let mut remaining: FxHashMap<MatchKey<'_>, usize> = FxHashMap::default();
    for (i, key) in old.iter().enumerate().skip(prefix) {
        remaining.entry(MatchKey::of(*key, i)).or_insert(i);
    }

    // 3. Match remaining new children
    for (j, key) in new.iter().enumerate().skip(prefix) {
        match remaining.remove(&MatchKey::of(*key, j)) {
            Some(i) if same_type(i, j) => plan.children.push(ChildPlan::Reuse { old: i, moved: false }),
            Some(i) => {
                plan.deletions.push(i);
                plan.children.push(ChildPlan::Create);
            }
            None => plan.children.push(ChildPlan::Create),
        }
    }

    // Duplicate old keys never entered the map; they go too.
    let mut matched = vec![false; old.len()];
    for child in &plan.children {
        if let ChildPlan::Reuse { old, .. } = child {
            matched[*old] = true;
        }
    }
    for i in &plan.deletions {
        matched[*i] = true;
    }
    plan.deletions.extend((prefix..old.len()).filter(|i| !matched[*i]));
    plan.deletions.sort_unstable();

    // 4. Moves, scanning from the tail
    let mut watermark: Option<usize> = None;
    for child in plan.children[prefix..].iter_mut().rev() {
        if let ChildPlan::Reuse { old, moved } = child {
            match watermark {
                Some(mark) if *old > mark => *moved = true,
                _ => watermark = Some(*old),
            }
        }
    }

    plan
}

// =============================================================================
// Tests
// =============================================================================
