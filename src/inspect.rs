//! Read-only access to the committed tree.
//!
//! - [`TreeView`]: borrowed, zero-copy view of the current units
//! - [`TreeSnapshot`]: owned copy taken after a commit, shareable across
//!   threads through [`SharedSnapshot`]
//! - [`CommitObserver`]: hook called after every commit

use std::fmt::Write as _;
use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::RwLock;

use crate::commit::CommitReport;
use crate::host::HostId;
use crate::id::{Identity, Key, UnitId};
use crate::lane::Lanes;
use crate::props::Props;
use crate::unit::{UnitArena, WorkKind, WorkUnit};

// =============================================================================
// TreeView
// =============================================================================

/// One committed unit.
#[derive(Clone, Copy)]
pub struct UnitView<'a> {
    id: UnitId,
    depth: usize,
    unit: &'a WorkUnit,
}

impl<'a> UnitView<'a> {
    /// Handle usable with `enqueue_update` and friends.
    #[inline]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Distance from the root (the root is 0).
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn kind(&self) -> WorkKind {
        self.unit.kind
    }

    #[inline]
    pub fn type_name(&self) -> &'a str {
        self.unit.type_name()
    }

    #[inline]
    pub fn key(&self) -> Option<&'a Key> {
        self.unit.key.as_ref()
    }

    #[inline]
    pub fn identity(&self) -> Identity {
        self.unit.identity
    }

    #[inline]
    pub fn props(&self) -> &'a Props {
        &self.unit.memoized_props
    }

    #[inline]
    pub fn state(&self) -> &'a Props {
        &self.unit.memoized_state
    }

    /// Lanes of pending updates on this unit.
    #[inline]
    pub fn lanes(&self) -> Lanes {
        self.unit.lanes
    }

    /// Lanes of pending updates below this unit.
    #[inline]
    pub fn child_lanes(&self) -> Lanes {
        self.unit.child_lanes
    }

    #[inline]
    pub fn host(&self) -> Option<HostId> {
        self.unit.host
    }

    #[inline]
    pub fn text(&self) -> Option<&'a str> {
        self.unit.text()
    }

    /// Whether this error boundary is showing recovery output.
    #[inline]
    pub fn has_captured(&self) -> bool {
        self.unit.captured.is_some()
    }

    /// Whether this waiting boundary is showing its fallback.
    #[inline]
    pub fn is_showing_fallback(&self) -> bool {
        self.unit.showing_fallback
    }
}

impl std::fmt::Debug for UnitView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitView")
            .field("id", &self.id)
            .field("type", &self.type_name())
            .field("key", &self.key())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Borrowed view of the committed tree.
pub struct TreeView<'a> {
    units: &'a UnitArena,
    root: UnitId,
}

impl<'a> TreeView<'a> {
    pub(crate) fn new(units: &'a UnitArena, root: UnitId) -> Self {
        Self { units, root }
    }

    pub fn root(&self) -> UnitView<'a> {
        UnitView {
            id: self.root,
            depth: 0,
            unit: &self.units[self.root],
        }
    }

    /// Look up a unit by handle; `None` once freed.
    pub fn get(&self, id: UnitId) -> Option<UnitView<'a>> {
        let unit = self.units.get(id)?;
        Some(UnitView { id, depth: 0, unit })
    }

    /// Children of `id`, in order.
    pub fn children(&self, id: UnitId) -> Vec<UnitView<'a>> {
        self.units
            .children(id)
            .into_iter()
            .filter_map(|child| self.units.get(child).map(|unit| UnitView { id: child, depth: 0, unit }))
            .collect()
    }

    /// All units in pre-order, the root first.
    pub fn iter(&self) -> impl Iterator<Item = UnitView<'a>> + use<'a> {
        let units = self.units;
        let mut stack = vec![(self.root, 0usize)];
        std::iter::from_fn(move || {
            let (id, depth) = stack.pop()?;
            let unit = units.get(id)?;
            stack.extend(units.children(id).into_iter().rev().map(|child| (child, depth + 1)));
            Some(UnitView { id, depth, unit })
        })
    }

    /// First unit in pre-order with the given key.
    pub fn find_by_key(&self, key: &str) -> Option<UnitView<'a>> {
        self.iter().find(|u| u.key().is_some_and(|k| k.as_str() == key))
    }

    /// First unit in pre-order with the given type name.
    pub fn find_by_type(&self, type_name: &str) -> Option<UnitView<'a>> {
        self.iter().find(|u| u.type_name() == type_name)
    }

    pub fn find_all_by_type(&self, type_name: &str) -> Vec<UnitView<'a>> {
        self.iter().filter(|u| u.type_name() == type_name).collect()
    }

    /// Committed units, root included.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root().unit.child.is_none()
    }
}

// =============================================================================
// TreeSnapshot
// =============================================================================

/// Owned copy of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    pub identity: Identity,
    pub type_name: CompactString,
    pub key: Option<Key>,
    pub props: Props,
    pub state: Props,
    pub depth: usize,
}

/// Owned copy of the committed tree, in pre-order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeSnapshot {
    /// Number of commits so far, this one included.
    pub commit: u64,
    /// Lanes still pending when the snapshot was taken.
    pub pending: Lanes,
    pub nodes: Vec<SnapshotNode>,
}

impl TreeSnapshot {
    pub fn capture(view: &TreeView<'_>, commit: u64, pending: Lanes) -> Self {
        let nodes = view
            .iter()
            .map(|u| SnapshotNode {
                identity: u.identity(),
                type_name: u.type_name().into(),
                key: u.key().cloned(),
                props: u.props().clone(),
                state: u.state().clone(),
                depth: u.depth(),
            })
            .collect();
        Self {
            commit,
            pending,
            nodes,
        }
    }

    pub fn find_by_key(&self, key: &str) -> Option<&SnapshotNode> {
        self.nodes.iter().find(|n| n.key.as_ref().is_some_and(|k| k.as_str() == key))
    }

    pub fn find_by_type(&self, type_name: &str) -> Option<&SnapshotNode> {
        self.nodes.iter().find(|n| n.type_name == type_name)
    }

    /// One line per unit, indented by depth: `type` or `type#key`.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let indent = "  ".repeat(node.depth);
            let _ = match &node.key {
                Some(key) => writeln!(out, "{indent}{}#{key}", node.type_name),
                None => writeln!(out, "{indent}{}", node.type_name),
            };
        }
        out
    }
}

/// Thread-safe handle to the latest published [`TreeSnapshot`].
///
/// Uses `parking_lot::RwLock`; readers clone the inner `Arc` and never
/// block the next publish for longer than the pointer swap.
#[derive(Debug, Default)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<Arc<TreeSnapshot>>>,
}

impl Clone for SharedSnapshot {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest snapshot.
    pub fn get(&self) -> Arc<TreeSnapshot> {
        self.with_read(Arc::clone)
    }

    /// Execute a closure with read access to the latest snapshot.
    pub fn with_read<R>(&self, f: impl FnOnce(&Arc<TreeSnapshot>) -> R) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    pub(crate) fn publish(&self, snapshot: TreeSnapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }
}

// =============================================================================
// CommitObserver
// =============================================================================

/// Called after every commit, once the tree has been swapped.
pub trait CommitObserver {
    fn on_commit(&mut self, report: &CommitReport);
}

impl<F: FnMut(&CommitReport)> CommitObserver for F {
    fn on_commit(&mut self, report: &CommitReport) {
        self(report)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn build() -> (UnitArena, UnitId) {
        let mut units = UnitArena::new();
        let root = units.insert(WorkUnit::root(HostId(0)));
        let list = units.insert(WorkUnit::from_element(&Element::host("ul"), Identity::ROOT, 0));
        let a = units.insert(WorkUnit::from_element(&Element::host("li").with_key("a"), Identity::ROOT, 0));
        let b = units.insert(WorkUnit::from_element(&Element::host("li").with_key("b"), Identity::ROOT, 1));
        units[root].child = Some(list);
        units[list].parent = Some(root);
        units[list].child = Some(a);
        units[a].sibling = Some(b);
        units[a].parent = Some(list);
        units[b].parent = Some(list);
        (units, root)
    }

    #[test]
    fn test_view_preorder_and_lookup() {
        let (units, root) = build();
        let view = TreeView::new(&units, root);
        let names: Vec<&str> = view.iter().map(|u| u.type_name()).collect();
        assert_eq!(names, vec!["#root", "ul", "li", "li"]);
        assert_eq!(view.len(), 4);

        let b = view.find_by_key("b").unwrap();
        assert_eq!(b.type_name(), "li");
        assert!(view.find_by_key("z").is_none());
        assert_eq!(view.find_all_by_type("li").len(), 2);
    }

    #[test]
    fn test_snapshot_outline() {
        let (units, root) = build();
        let snapshot = TreeSnapshot::capture(&TreeView::new(&units, root), 3, Lanes::empty());
        assert_eq!(snapshot.outline(), "#root\n  ul\n    li#a\n    li#b\n");
        assert_eq!(snapshot.find_by_key("a").map(|n| n.depth), Some(2));
    }

    #[test]
    fn test_shared_snapshot_publish() {
        let shared = SharedSnapshot::new();
        let reader = shared.clone();
        assert!(reader.get().nodes.is_empty());

        shared.publish(TreeSnapshot {
            commit: 1,
            ..TreeSnapshot::default()
        });
        assert_eq!(reader.get().commit, 1);
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = 0;
        {
            let mut observer = |_: &CommitReport| seen += 1;
            observer.on_commit(&CommitReport::default());
            observer.on_commit(&CommitReport::default());
        }
        assert_eq!(seen, 2);
    }

    static_assertions::assert_impl_all!(SharedSnapshot: Send, Sync, Clone);
    static_assertions::assert_impl_all!(TreeSnapshot: Send, Sync);
}
