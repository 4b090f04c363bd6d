//! Prelude module for common imports.
//!
//! ```ignore
//! use tola_fiber::prelude::*;
//! ```

// Entry point
pub use crate::config::ReconcilerConfig;
pub use crate::reconciler::{Reconciler, WorkOutcome};

// Elements and components
pub use crate::element::{
    Component, Element, ElementKind, FunctionComponent, Interrupt, LifecycleCx, RenderCx,
    RenderResult,
};

// Lanes and updates
pub use crate::lane::{Lane, Lanes, RootLanes, Urgency};
pub use crate::update::{Payload, Update, UpdateQueue};

// Identity and props
pub use crate::id::{Identity, Key, ResourceId, UnitId};
pub use crate::props::{Props, Value};

// Host
pub use crate::host::{HostId, HostNode, HostNodeKind, HostOp, HostRenderer, MarkupConfig, MemoryRenderer};

// Scheduler
pub use crate::scheduler::{CallbackId, HostScheduler, ManualScheduler, Millis, SchedulerPriority};

// Reports
pub use crate::commit::{CommitFailure, CommitReport, EffectRecord, LifecycleEvent};
pub use crate::effect::EffectKind;

// Inspection
pub use crate::inspect::{
    CommitObserver, SharedSnapshot, SnapshotNode, TreeSnapshot, TreeView, UnitView,
};

// Error
pub use crate::error::{
    CallbackError, CallbackPhase, FiberError, FiberResult, RenderError,
};
