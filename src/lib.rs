//! tola-fiber - Incremental, priority-aware UI reconciliation
//!
//! ## Core Concepts
//!
//! **Double-buffered work units**: every mounted element is backed by a
//! [`WorkUnit`](unit::WorkUnit) in an arena. A render pass builds the
//! work-in-progress tree next to the committed one, reusing each unit's
//! alternate, and a commit swaps the two.
//!
//! **Lanes**: updates carry a priority [`Lane`]. A pass renders one group of
//! lanes; lower priority updates are skipped and re-based later, and
//! non-blocking passes yield to the host between units.
//!
//! ## Modules
//! - `element`: elements, components and render contexts
//! - `lane`: lanes, lane sets and per-root lane bookkeeping
//! - `update`: update queues with lane-aware re-basing
//! - `reconciler`: the entry point driving passes and commits
//! - `commit`: applying a pass to a [`HostRenderer`]
//! - `scheduler`: host clock and callbacks, yield decisions
//! - `host`: the renderer contract and an in-memory renderer
//! - `inspect`: tree views, snapshots and commit observers
//! - `algo`: child reconciliation and property diffing
//!
//! ## Usage
//!
//! ```ignore
//! use tola_fiber::prelude::*;
//!
//! let scheduler = ManualScheduler::new();
//! let mut rec = Reconciler::new(MemoryRenderer::new(), scheduler, ReconcilerConfig::default());
//!
//! rec.render(
//!     Element::host("ul")
//!         .child(Element::host("li").with_key("a").child(Element::text("a")))
//!         .child(Element::host("li").with_key("b").child(Element::text("b"))),
//! )?;
//! let reports = rec.run_until_idle()?;
//! assert_eq!(rec.renderer().markup(), "<ul><li>a</li><li>b</li></ul>");
//! ```

// =============================================================================
// Core modules
// =============================================================================

/// Deterministic identity hashing
pub mod hash;

/// Unit handles, keys and identities
pub mod id;

/// Property maps
pub mod props;

/// Lanes and root lane bookkeeping
pub mod lane;

/// Update queues
pub mod update;

/// Error types
pub mod error;

/// Host clock and callbacks
pub mod scheduler;

/// Elements and components
pub mod element;

/// Effect lists
pub mod effect;

/// Work units and their arena
pub mod unit;

/// Algorithms: children, props
pub mod algo;

mod walker;

/// Commit engine and reports
pub mod commit;

/// Host renderer contract
pub mod host;

/// Tree inspection
pub mod inspect;

/// Reconciler configuration
pub mod config;

/// Reconciler entry point
pub mod reconciler;

/// Async driving
#[cfg(feature = "async")]
pub mod driver;

/// Prelude for common imports
pub mod prelude;

// =============================================================================
// Re-exports
// =============================================================================

// Entry point
pub use reconciler::{Reconciler, WorkOutcome};
pub use config::ReconcilerConfig;

// Elements
pub use element::{Component, Element, Interrupt, LifecycleCx, RenderCx, RenderResult};

// Lanes and updates
pub use lane::{Lane, Lanes, RootLanes, Urgency};
pub use update::Payload;

// Identity
pub use id::{Identity, Key, ResourceId, UnitId};
pub use props::{Props, Value};

// Host and scheduler
pub use host::{HostId, HostRenderer, MemoryRenderer};
pub use scheduler::{HostScheduler, ManualScheduler, SchedulerPriority};

// Reports and inspection
pub use commit::CommitReport;
pub use inspect::{CommitObserver, SharedSnapshot, TreeSnapshot, TreeView};

// Error types
pub use error::{CallbackError, CallbackPhase, FiberError, FiberResult, RenderError};
