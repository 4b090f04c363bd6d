//! Work units: one tree position for one render pass.
//!
//! Units live in a [`UnitArena`] and link to each other through [`UnitId`]
//! handles (parent, first child, next sibling). Each identity has at most two
//! units: the committed one (current) and its alternate (work in progress).
//! The alternate relation is a map held by the arena, not a field.

mod arena;

pub use arena::UnitArena;

use std::rc::Rc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::effect::EffectSpan;
use crate::element::{Element, ElementKind};
use crate::error::RenderError;
use crate::host::HostId;
use crate::id::{Identity, Key, UnitId};
use crate::lane::Lanes;
use crate::props::{PropChanges, Props};
use crate::update::{State, UpdateCallback, UpdateQueue};

// =============================================================================
// Kinds and flags
// =============================================================================

/// Closed set of unit kinds, dispatched by `match` in the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    HostRoot,
    HostElement,
    HostText,
    Function,
    Class,
    Fragment,
    Waiting,
}

impl WorkKind {
    pub fn of(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Host(_) => WorkKind::HostElement,
            ElementKind::Text(_) => WorkKind::HostText,
            ElementKind::Function(_) => WorkKind::Function,
            ElementKind::Class(_) => WorkKind::Class,
            ElementKind::Fragment => WorkKind::Fragment,
            ElementKind::Waiting { .. } => WorkKind::Waiting,
        }
    }

    /// Kinds that own a host instance.
    #[inline]
    pub fn is_host(self) -> bool {
        matches!(self, WorkKind::HostElement | WorkKind::HostText)
    }
}

bitflags! {
    /// Effect tag set on a unit during a pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EffectFlags: u16 {
        /// Newly created: insert the host subtree.
        const PLACEMENT = 1 << 0;
        /// Reused at a new position.
        const MOVE = 1 << 1;
        /// Host properties or text changed.
        const UPDATE = 1 << 2;
        /// Some old children were deleted.
        const CHILD_DELETION = 1 << 3;
        /// Lifecycle or update callbacks to run.
        const CALLBACK = 1 << 4;
        /// Boundary rendering its recovery output in this pass.
        const DID_CAPTURE = 1 << 5;
        /// Unwound by a render error or a wait.
        const INCOMPLETE = 1 << 6;
    }
}

/// Walker state of a unit within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitPhase {
    #[default]
    Pending,
    Beginning,
    Bailed,
    Evaluated,
    Completing,
    Completed,
}

// =============================================================================
// Queues
// =============================================================================

/// State of a host root: the element rendered into it.
#[derive(Debug, Clone, Default)]
pub struct RootState {
    pub element: Option<Element>,
}

impl State for RootState {
    fn merge(&self, patch: &Self) -> Self {
        patch.clone()
    }
}

/// Update queue attached to a unit, by kind.
#[derive(Debug, Clone)]
pub enum UnitQueue {
    None,
    Root {
        queue: UpdateQueue<RootState>,
        state: RootState,
    },
    State(UpdateQueue<Props>),
}

// =============================================================================
// WorkUnit
// =============================================================================

/// One instantiated element, host node or root.
#[derive(Clone)]
pub struct WorkUnit {
    pub kind: WorkKind,
    /// Element kind this unit was created from (component handle, tag, text).
    pub ty: ElementKind,
    pub key: Option<Key>,
    pub identity: Identity,
    /// Position among siblings.
    pub index: usize,

    pub pending_props: Props,
    pub memoized_props: Props,
    pub pending_children: Rc<[Element]>,
    pub memoized_children: Rc<[Element]>,
    /// Component state.
    pub memoized_state: Props,
    pub queue: UnitQueue,

    /// Lanes of updates on this unit.
    pub lanes: Lanes,
    /// Union of `lanes` over the subtree.
    pub child_lanes: Lanes,

    pub parent: Option<UnitId>,
    pub child: Option<UnitId>,
    pub sibling: Option<UnitId>,

    pub flags: EffectFlags,
    /// Old children to delete, recorded on the parent.
    pub deletions: SmallVec<[UnitId; 2]>,
    /// Host property changes computed on completion.
    pub update_payload: Option<PropChanges>,
    pub host: Option<HostId>,
    pub phase: UnitPhase,

    /// Error captured by a boundary; it renders recovery output while set.
    pub captured: Option<RenderError>,
    /// Waiting boundary showing its fallback.
    pub showing_fallback: bool,
    /// Update callbacks to run on commit.
    pub callbacks: Vec<UpdateCallback<Props>>,
    /// Effect chain of this subtree in the pass's effect list.
    pub effects: EffectSpan,
}

impl WorkUnit {
    fn blank(kind: WorkKind, ty: ElementKind, identity: Identity) -> Self {
        let empty: Rc<[Element]> = Rc::from(Vec::new());
        Self {
            kind,
            ty,
            key: None,
            identity,
            index: 0,
            pending_props: Props::new(),
            memoized_props: Props::new(),
            pending_children: Rc::clone(&empty),
            memoized_children: empty,
            memoized_state: Props::new(),
            queue: UnitQueue::None,
            lanes: Lanes::empty(),
            child_lanes: Lanes::empty(),
            parent: None,
            child: None,
            sibling: None,
            flags: EffectFlags::empty(),
            deletions: SmallVec::new(),
            update_payload: None,
            host: None,
            phase: UnitPhase::Pending,
            captured: None,
            showing_fallback: false,
            callbacks: Vec::new(),
            effects: EffectSpan::default(),
        }
    }

    /// Host root unit owning `container`.
    pub fn root(container: HostId) -> Self {
        let mut unit = Self::blank(WorkKind::HostRoot, ElementKind::Fragment, Identity::ROOT);
        unit.host = Some(container);
        unit.queue = UnitQueue::Root {
            queue: UpdateQueue::new(RootState::default()),
            state: RootState::default(),
        };
        unit
    }

    /// Fresh unit for an element seen for the first time.
    pub fn from_element(element: &Element, identity: Identity, index: usize) -> Self {
        let kind = WorkKind::of(&element.kind);
        let mut unit = Self::blank(kind, element.kind.clone(), identity);
        unit.key = element.key.clone();
        unit.index = index;
        unit.pending_props = element.props.clone();
        unit.pending_children = Rc::clone(&element.children);
        match &element.kind {
            ElementKind::Class(component) => {
                let state = component.initial_state(&element.props);
                unit.memoized_state = state.clone();
                unit.queue = UnitQueue::State(UpdateQueue::new(state));
            }
            ElementKind::Function(_) => {
                unit.queue = UnitQueue::State(UpdateQueue::new(Props::new()));
            }
            _ => {}
        }
        unit
    }

    /// Overwrite `self` (an alternate slot) with `current`'s committed fields,
    /// resetting everything that belongs to a single pass.
    pub fn reset_from(&mut self, current: &WorkUnit) {
        self.kind = current.kind;
        self.ty = current.ty.clone();
        self.key = current.key.clone();
        self.identity = current.identity;
        self.index = current.index;
        self.pending_props = current.memoized_props.clone();
        self.memoized_props = current.memoized_props.clone();
        self.pending_children = Rc::clone(&current.memoized_children);
        self.memoized_children = Rc::clone(&current.memoized_children);
        self.memoized_state = current.memoized_state.clone();
        self.queue = current.queue.clone();
        self.lanes = current.lanes;
        self.child_lanes = current.child_lanes;
        self.parent = current.parent;
        self.child = current.child;
        self.sibling = None;
        self.flags = EffectFlags::empty();
        self.deletions.clear();
        self.update_payload = None;
        self.host = current.host;
        self.phase = UnitPhase::Pending;
        self.captured = current.captured.clone();
        self.showing_fallback = current.showing_fallback;
        self.callbacks.clear();
        self.effects = EffectSpan::default();
    }

    /// Take new input from an element.
    pub fn set_input(&mut self, element: &Element) {
        self.ty = element.kind.clone();
        self.pending_props = element.props.clone();
        self.pending_children = Rc::clone(&element.children);
    }

    /// Text content of a host text unit.
    pub fn text(&self) -> Option<&str> {
        match &self.ty {
            ElementKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether this unit is a class component acting as an error boundary.
    pub fn is_error_boundary(&self) -> bool {
        matches!(&self.ty, ElementKind::Class(c) if c.is_error_boundary())
    }

    /// Whether updates can be enqueued on this unit.
    #[inline]
    pub fn is_stateful(&self) -> bool {
        matches!(self.queue, UnitQueue::State(_))
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        match self.kind {
            WorkKind::HostRoot => "#root",
            _ => self.ty.type_name(),
        }
    }

    /// The element the root renders, once committed.
    pub fn root_element(&self) -> Option<&Element> {
        match &self.queue {
            UnitQueue::Root { state, .. } => state.element.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("kind", &self.kind)
            .field("type", &self.type_name())
            .field("key", &self.key)
            .field("index", &self.index)
            .field("lanes", &self.lanes)
            .field("child_lanes", &self.child_lanes)
            .field("flags", &self.flags)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
