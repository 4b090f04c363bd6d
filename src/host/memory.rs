//! In-memory host tree with an operation log.

use compact_str::CompactString;
use smallvec::SmallVec;
use tracing::warn;

use super::markup::{self, MarkupConfig};
use super::{HostId, HostRenderer};
use crate::props::{PropChange, PropChanges, Props};

// =============================================================================
// HostOp
// =============================================================================

/// One recorded host primitive call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateInstance {
        id: HostId,
        tag: CompactString,
    },
    CreateText {
        id: HostId,
        text: CompactString,
    },
    UpdateInstance {
        id: HostId,
        changes: PropChanges,
    },
    UpdateText {
        id: HostId,
        text: CompactString,
    },
    AppendChild {
        parent: HostId,
        child: HostId,
    },
    InsertBefore {
        parent: HostId,
        child: HostId,
        before: HostId,
    },
    RemoveChild {
        parent: HostId,
        child: HostId,
    },
}

impl HostOp {
    /// The node the operation acts on.
    pub fn target(&self) -> HostId {
        match self {
            HostOp::CreateInstance { id, .. }
            | HostOp::CreateText { id, .. }
            | HostOp::UpdateInstance { id, .. }
            | HostOp::UpdateText { id, .. } => *id,
            HostOp::AppendChild { child, .. }
            | HostOp::InsertBefore { child, .. }
            | HostOp::RemoveChild { child, .. } => *child,
        }
    }

    /// Whether the operation changes tree structure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            HostOp::AppendChild { .. } | HostOp::InsertBefore { .. } | HostOp::RemoveChild { .. }
        )
    }
}

// =============================================================================
// HostNode
// =============================================================================

/// What a host node is.
#[derive(Debug, Clone, PartialEq)]
pub enum HostNodeKind {
    Container,
    Element { tag: CompactString, props: Props },
    Text(CompactString),
}

/// One node of the in-memory host tree.
#[derive(Debug, Clone)]
pub struct HostNode {
    pub kind: HostNodeKind,
    pub parent: Option<HostId>,
    pub children: SmallVec<[HostId; 4]>,
}

impl HostNode {
    fn new(kind: HostNodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: SmallVec::new(),
        }
    }
}

// =============================================================================
// MemoryRenderer
// =============================================================================

/// Headless host renderer.
///
/// A node passed to `remove_child` is freed together with its subtree and
/// its id is handed out again by later creations.
#[derive(Debug, Clone)]
pub struct MemoryRenderer {
    nodes: Vec<Option<HostNode>>,
    free: Vec<HostId>,
    log: Vec<HostOp>,
}

impl Default for MemoryRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRenderer {
    /// A renderer holding only the container node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(HostNode::new(HostNodeKind::Container))],
            free: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn node(&self, id: HostId) -> Option<&HostNode> {
        self.nodes.get(id.0 as usize)?.as_ref()
    }

    fn node_mut(&mut self, id: HostId) -> Option<&mut HostNode> {
        self.nodes.get_mut(id.0 as usize)?.as_mut()
    }

    /// Children of `id`, in order.
    pub fn children(&self, id: HostId) -> &[HostId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Text content of a text node.
    pub fn text(&self, id: HostId) -> Option<&str> {
        match &self.node(id)?.kind {
            HostNodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Properties of an element node.
    pub fn props(&self, id: HostId) -> Option<&Props> {
        match &self.node(id)?.kind {
            HostNodeKind::Element { props, .. } => Some(props),
            _ => None,
        }
    }

    /// Every primitive call so far.
    pub fn log(&self) -> &[HostOp] {
        &self.log
    }

    /// Drain the log.
    pub fn take_log(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.log)
    }

    /// Live nodes, container included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Markup of the container's children.
    pub fn markup(&self) -> String {
        self.markup_with(&MarkupConfig::default())
    }

    pub fn markup_with(&self, config: &MarkupConfig) -> String {
        let mut output = String::new();
        for child in self.children(self.container()) {
            markup::render_node(self, *child, config, &mut output);
        }
        output
    }

    fn alloc(&mut self, kind: HostNodeKind) -> HostId {
        let node = Some(HostNode::new(kind));
        if let Some(id) = self.free.pop() {
            self.nodes[id.0 as usize] = node;
            return id;
        }
        let id = HostId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Free `id` and every node below it.
    fn release(&mut self, id: HostId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(id);
            }
        }
    }

    fn detach(&mut self, child: HostId) {
        let Some(parent) = self.node(child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
    }

    fn valid(&self, ids: &[HostId]) -> bool {
        let ok = ids.iter().all(|id| self.node(*id).is_some());
        if !ok {
            warn!(?ids, "host operation on unknown node ignored");
        }
        ok
    }
}

impl HostRenderer for MemoryRenderer {
    fn container(&self) -> HostId {
        HostId(0)
    }

    fn create_instance(&mut self, tag: &str, props: &Props) -> HostId {
        let id = self.alloc(HostNodeKind::Element {
            tag: CompactString::from(tag),
            props: props.clone(),
        });
        self.log.push(HostOp::CreateInstance {
            id,
            tag: CompactString::from(tag),
        });
        id
    }

    fn create_text(&mut self, text: &str) -> HostId {
        let id = self.alloc(HostNodeKind::Text(CompactString::from(text)));
        self.log.push(HostOp::CreateText {
            id,
            text: CompactString::from(text),
        });
        id
    }

    fn update_instance(&mut self, id: HostId, changes: &[PropChange]) {
        if !self.valid(&[id]) {
            return;
        }
        if let Some(HostNode {
            kind: HostNodeKind::Element { props, .. },
            ..
        }) = self.node_mut(id)
        {
            for (name, value) in changes {
                match value {
                    Some(value) => props.set(name.clone(), value.clone()),
                    None => {
                        props.remove(name);
                    }
                }
            }
        }
        self.log.push(HostOp::UpdateInstance {
            id,
            changes: changes.to_vec(),
        });
    }

    fn update_text(&mut self, id: HostId, text: &str) {
        if !self.valid(&[id]) {
            return;
        }
        if let Some(HostNode {
            kind: HostNodeKind::Text(content),
            ..
        }) = self.node_mut(id)
        {
            *content = CompactString::from(text);
        }
        self.log.push(HostOp::UpdateText {
            id,
            text: CompactString::from(text),
        });
    }

    fn append_child(&mut self, parent: HostId, child: HostId) {
        if !self.valid(&[parent, child]) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.log.push(HostOp::AppendChild { parent, child });
    }

    fn insert_before(&mut self, parent: HostId, child: HostId, before: HostId) {
        if !self.valid(&[parent, child, before]) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            let siblings = &mut node.children;
            match siblings.iter().position(|c| *c == before) {
                Some(pos) => siblings.insert(pos, child),
                None => {
                    warn!(?parent, ?before, "insert_before anchor not found, appending");
                    siblings.push(child);
                }
            }
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.log.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
    }

    fn remove_child(&mut self, parent: HostId, child: HostId) {
        if !self.valid(&[parent, child]) {
            return;
        }
        self.detach(child);
        self.release(child);
        self.log.push(HostOp::RemoveChild { parent, child });
    }
}

// =============================================================================
// Tests
// =============================================================================
