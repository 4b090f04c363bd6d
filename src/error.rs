//! Error types for tola-fiber.
//!
//! Three layers:
//! - [`RenderError`]: returned by a component's render, recovered by the
//!   nearest error boundary.
//! - [`CallbackError`]: returned by a lifecycle callback during commit,
//!   collected per callback and routed to a boundary after the commit.
//! - [`FiberError`]: what the public API surfaces: contract violations and
//!   errors no boundary recovered.

use std::fmt;

use thiserror::Error;

use crate::id::UnitId;
use crate::scheduler::Millis;

// =============================================================================
// RenderError
// =============================================================================

/// A component failed to render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CallbackError> for RenderError {
    fn from(err: CallbackError) -> Self {
        Self::new(err.message)
    }
}

// =============================================================================
// CallbackError
// =============================================================================

/// Which lifecycle callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Mount,
    Update,
    Unmount,
    /// A callback attached to a state update.
    UpdateCallback,
}

impl fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallbackPhase::Mount => "mount",
            CallbackPhase::Update => "update",
            CallbackPhase::Unmount => "unmount",
            CallbackPhase::UpdateCallback => "update callback",
        })
    }
}

/// A lifecycle callback failed during commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// =============================================================================
// FiberError
// =============================================================================

/// Errors surfaced by the reconciler.
#[derive(Debug, Error)]
pub enum FiberError {
    /// The handle refers to a unit that has been freed.
    #[error("stale unit handle {0}")]
    StaleHandle(UnitId),

    /// The unit is not reachable from a root through its parent links.
    #[error("unit {0} is not attached to a root")]
    DetachedNode(UnitId),

    /// The unit has no update queue (host nodes, fragments, boundaries).
    #[error("unit {0} does not hold state")]
    NotStateful(UnitId),

    /// The host clock went backwards.
    #[error("host clock went backwards: {previous}ms -> {now}ms")]
    ClockSkew {
        /// Last reading
        previous: Millis,
        /// Current reading
        now: Millis,
    },

    /// Commits kept scheduling synchronous commits.
    #[error("maximum update depth exceeded: more than {limit} nested commits")]
    NestedUpdateLimit {
        /// Configured limit
        limit: usize,
    },

    /// A render error reached the root without meeting a boundary.
    #[error("uncaught render error in <{component}>: {error}")]
    Uncaught {
        /// Type name of the failing unit
        component: String,
        error: RenderError,
    },

    /// A lifecycle callback error reached the root without meeting a boundary.
    #[error("uncaught {phase} error in <{component}>: {error}")]
    UncaughtCallback {
        /// Type name of the failing unit
        component: String,
        phase: CallbackPhase,
        error: CallbackError,
    },
}

/// Result type alias for reconciler operations.
pub type FiberResult<T> = Result<T, FiberError>;

impl FiberError {
    /// Create an uncaught render error.
    pub fn uncaught(component: impl Into<String>, error: RenderError) -> Self {
        Self::Uncaught {
            component: component.into(),
            error,
        }
    }

    /// Whether this error tore down the mounted tree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Uncaught { .. } | Self::UncaughtCallback { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FiberError::ClockSkew { previous: 10, now: 4 };
        assert_eq!(err.to_string(), "host clock went backwards: 10ms -> 4ms");

        let err = FiberError::uncaught("Leaf", RenderError::new("boom"));
        assert_eq!(err.to_string(), "uncaught render error in <Leaf>: boom");
        assert!(err.is_fatal());

        let err = FiberError::UncaughtCallback {
            component: "Panel".to_string(),
            phase: CallbackPhase::Mount,
            error: CallbackError::new("no focus target"),
        };
        assert_eq!(err.to_string(), "uncaught mount error in <Panel>: no focus target");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FiberError>();
    }
}
