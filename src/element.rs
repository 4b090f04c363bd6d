//! Element descriptions and the component model.
//!
//! Components return [`Element`] trees; the reconciler diffs them against
//! the work units of the current tree.
//!
//! # Type identity
//!
//! Two elements have the same type when:
//! - both are host elements with the same tag
//! - both are text, fragments or waiting boundaries
//! - both are components with the same [`Component::name`] (or the same
//!   function name)
//!
//! Component output must depend only on props, state and children: an
//! element whose props and children are unchanged is not re-evaluated.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use compact_str::CompactString;

use crate::error::{CallbackError, RenderError};
use crate::id::{Identity, Key, ResourceId, UnitId};
use crate::lane::Lanes;
use crate::props::{Props, Value};
use crate::update::Payload;

// =============================================================================
// Render results
// =============================================================================

/// Why a render did not produce children.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// The component failed; handled by the nearest error boundary.
    Error(RenderError),
    /// The component waits on a resource; handled by the nearest waiting
    /// boundary.
    Pending(ResourceId),
}

impl From<RenderError> for Interrupt {
    fn from(err: RenderError) -> Self {
        Interrupt::Error(err)
    }
}

/// Output of one component render.
pub type RenderResult = Result<Vec<Element>, Interrupt>;

// =============================================================================
// Component
// =============================================================================

/// A stateful (class) component.
///
/// Lifecycle callbacks run during the commit's lifecycle pass. Their errors
/// never abort the commit; they are routed to the nearest error boundary
/// afterwards.
pub trait Component {
    /// Type name; components with equal names are the same type.
    fn name(&self) -> &str;

    /// State of a freshly mounted instance.
    fn initial_state(&self, _props: &Props) -> Props {
        Props::new()
    }

    fn render(&self, cx: &RenderCx<'_>) -> RenderResult;

    fn did_mount(&self, _cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
        Ok(())
    }

    fn did_update(&self, _cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
        Ok(())
    }

    fn will_unmount(&self, _cx: &LifecycleCx<'_>) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Whether this component intercepts render errors of its subtree.
    fn is_error_boundary(&self) -> bool {
        false
    }

    /// Replacement output for a captured error.
    fn recover(&self, _error: &RenderError, _props: &Props) -> Vec<Element> {
        Vec::new()
    }
}

type RenderFn = dyn Fn(&RenderCx<'_>) -> RenderResult;

/// A component backed by a closure.
///
/// Its state starts empty and only changes through enqueued updates.
#[derive(Clone)]
pub struct FunctionComponent {
    name: CompactString,
    render: Rc<RenderFn>,
}

impl FunctionComponent {
    pub fn new(
        name: impl Into<CompactString>,
        render: impl Fn(&RenderCx<'_>) -> RenderResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, cx: &RenderCx<'_>) -> RenderResult {
        (self.render)(cx)
    }
}

impl fmt::Debug for FunctionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionComponent({})", self.name)
    }
}

// =============================================================================
// ElementKind
// =============================================================================

/// What an element instantiates.
#[derive(Clone)]
pub enum ElementKind {
    /// Host element with a tag.
    Host(CompactString),
    /// Host text node.
    Text(CompactString),
    Function(FunctionComponent),
    Class(Rc<dyn Component>),
    /// Transparent grouping of children.
    Fragment,
    /// Shows `fallback` while a descendant waits on a resource.
    Waiting { fallback: Rc<[Element]> },
}

impl ElementKind {
    /// Type equality used to decide between reuse and replace.
    pub fn same_type(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Text(_), ElementKind::Text(_)) => true,
            (ElementKind::Function(a), ElementKind::Function(b)) => {
                Rc::ptr_eq(&a.render, &b.render) || a.name == b.name
            }
            (ElementKind::Class(a), ElementKind::Class(b)) => a.name() == b.name(),
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            (ElementKind::Waiting { .. }, ElementKind::Waiting { .. }) => true,
            _ => false,
        }
    }

    /// Name used in identities, logs and inspection.
    pub fn type_name(&self) -> &str {
        match self {
            ElementKind::Host(tag) => tag,
            ElementKind::Text(_) => "#text",
            ElementKind::Function(f) => f.name(),
            ElementKind::Class(c) => c.name(),
            ElementKind::Fragment => "#fragment",
            ElementKind::Waiting { .. } => "#waiting",
        }
    }

    /// Same type and same type-specific content.
    ///
    /// Components compare by instance: a new closure or component value
    /// under an old name must render again.
    pub(crate) fn content_eq(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Text(a), ElementKind::Text(b)) => a == b,
            (ElementKind::Function(a), ElementKind::Function(b)) => {
                Rc::ptr_eq(&a.render, &b.render) && a.name == b.name
            }
            (ElementKind::Class(a), ElementKind::Class(b)) => Rc::ptr_eq(a, b),
            (ElementKind::Waiting { fallback: a }, ElementKind::Waiting { fallback: b }) => {
                children_eq(a, b)
            }
            _ => self.same_type(other),
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "Host({tag})"),
            ElementKind::Text(text) => write!(f, "Text({text:?})"),
            ElementKind::Function(func) => write!(f, "Function({})", func.name()),
            ElementKind::Class(c) => write!(f, "Class({})", c.name()),
            ElementKind::Fragment => f.write_str("Fragment"),
            ElementKind::Waiting { fallback } => write!(f, "Waiting(fallback: {})", fallback.len()),
        }
    }
}

// =============================================================================
// Element
// =============================================================================

/// Immutable description of one tree position.
#[derive(Clone, Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<Key>,
    pub props: Props,
    pub children: Rc<[Element]>,
}

impl Element {
    fn of(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children: Rc::from(Vec::new()),
        }
    }

    /// Host element `<tag>`.
    pub fn host(tag: impl Into<CompactString>) -> Self {
        Self::of(ElementKind::Host(tag.into()))
    }

    /// Host text node.
    pub fn text(content: impl Into<CompactString>) -> Self {
        Self::of(ElementKind::Text(content.into()))
    }

    /// Function component.
    pub fn function(
        name: impl Into<CompactString>,
        render: impl Fn(&RenderCx<'_>) -> RenderResult + 'static,
    ) -> Self {
        Self::of(ElementKind::Function(FunctionComponent::new(name, render)))
    }

    /// Function component from an existing definition.
    pub fn component(func: &FunctionComponent) -> Self {
        Self::of(ElementKind::Function(func.clone()))
    }

    /// Stateful component.
    pub fn class(component: impl Component + 'static) -> Self {
        Self::of(ElementKind::Class(Rc::new(component)))
    }

    /// Stateful component from a shared instance.
    pub fn class_rc(component: Rc<dyn Component>) -> Self {
        Self::of(ElementKind::Class(component))
    }

    pub fn fragment(children: impl IntoIterator<Item = Element>) -> Self {
        Self::of(ElementKind::Fragment).with_children(children)
    }

    /// Waiting boundary showing `fallback` while `children` wait.
    pub fn waiting(
        children: impl IntoIterator<Item = Element>,
        fallback: impl IntoIterator<Item = Element>,
    ) -> Self {
        let fallback: Vec<Element> = fallback.into_iter().collect();
        Self::of(ElementKind::Waiting {
            fallback: Rc::from(fallback),
        })
        .with_children(children)
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_prop(mut self, name: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.props.set(name, value);
        self
    }

    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        let children: Vec<Element> = children.into_iter().collect();
        self.children = Rc::from(children);
        self
    }

    /// Append one child.
    #[must_use]
    pub fn child(mut self, child: Element) -> Self {
        let mut children = self.children.to_vec();
        children.push(child);
        self.children = Rc::from(children);
        self
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.kind.content_eq(&other.kind)
            && self.key == other.key
            && self.props == other.props
            && children_eq(&self.children, &other.children)
    }
}

/// Deep equality, short-circuiting on shared storage.
pub(crate) fn children_eq(a: &Rc<[Element]>, b: &Rc<[Element]>) -> bool {
    Rc::ptr_eq(a, b) || a[..] == b[..]
}

// =============================================================================
// Contexts
// =============================================================================

/// Inputs of one render call.
pub struct RenderCx<'a> {
    pub(crate) unit: UnitId,
    pub(crate) identity: Identity,
    pub(crate) props: &'a Props,
    pub(crate) state: &'a Props,
    pub(crate) children: &'a Rc<[Element]>,
    pub(crate) lanes: Lanes,
}

impl<'a> RenderCx<'a> {
    /// Handle of the unit being rendered; valid for `enqueue_update`.
    #[inline]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    #[inline]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    #[inline]
    pub fn props(&self) -> &'a Props {
        self.props
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> &'a Props {
        self.state
    }

    /// Children passed by the parent element.
    #[inline]
    pub fn children(&self) -> &'a [Element] {
        self.children
    }

    /// Children passed by the parent element, shared.
    #[inline]
    pub fn children_rc(&self) -> Rc<[Element]> {
        Rc::clone(self.children)
    }

    /// Lanes the pass is rendering.
    #[inline]
    pub fn render_lanes(&self) -> Lanes {
        self.lanes
    }
}

/// A state update requested from a lifecycle callback.
pub(crate) type StateRequest = (UnitId, Payload<Props>);

/// Inputs of one lifecycle callback.
pub struct LifecycleCx<'a> {
    pub(crate) unit: UnitId,
    pub(crate) props: &'a Props,
    pub(crate) state: &'a Props,
    pub(crate) previous: Option<(&'a Props, &'a Props)>,
    pub(crate) requests: &'a RefCell<Vec<StateRequest>>,
}

impl<'a> LifecycleCx<'a> {
    #[inline]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    #[inline]
    pub fn props(&self) -> &'a Props {
        self.props
    }

    #[inline]
    pub fn state(&self) -> &'a Props {
        self.state
    }

    /// Props before this commit (update callbacks only).
    #[inline]
    pub fn previous_props(&self) -> Option<&'a Props> {
        self.previous.map(|(props, _)| props)
    }

    /// State before this commit (update callbacks only).
    #[inline]
    pub fn previous_state(&self) -> Option<&'a Props> {
        self.previous.map(|(_, state)| state)
    }

    /// Schedule a synchronous state update on this unit after the commit.
    pub fn set_state(&self, payload: Payload<Props>) {
        self.requests.borrow_mut().push((self.unit, payload));
    }
}

// =============================================================================
// Tests
// =============================================================================
