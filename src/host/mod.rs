//! Host renderer interface.
//!
//! The reconciler never touches host nodes directly; the commit engine's
//! mutation pass calls these primitives, and nothing else does.
//!
//! [`MemoryRenderer`] keeps a real in-memory host tree, logs every call as a
//! [`HostOp`] and prints the tree as markup. It serves tests and headless
//! embedders.

mod markup;
mod memory;

pub use markup::MarkupConfig;
pub use memory::{HostNode, HostNodeKind, HostOp, MemoryRenderer};

use crate::props::{PropChange, Props};

/// Handle to a host node, issued by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u32);

/// Host mutation primitives.
pub trait HostRenderer {
    /// The node the root renders into.
    fn container(&self) -> HostId;

    fn create_instance(&mut self, tag: &str, props: &Props) -> HostId;

    fn create_text(&mut self, text: &str) -> HostId;

    /// Apply property changes (`None` removes).
    fn update_instance(&mut self, id: HostId, changes: &[PropChange]);

    fn update_text(&mut self, id: HostId, text: &str);

    /// Append `child` as the last child of `parent`, detaching it first if
    /// it is already attached.
    fn append_child(&mut self, parent: HostId, child: HostId);

    /// Insert `child` right before `before`, detaching it first if it is
    /// already attached.
    fn insert_before(&mut self, parent: HostId, child: HostId, before: HostId);

    /// Detach `child`; the host may release it.
    fn remove_child(&mut self, parent: HostId, child: HostId);
}
