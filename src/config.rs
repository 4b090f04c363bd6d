//! Reconciler configuration.

use crate::scheduler::Millis;

/// Default time slice before the walker yields to the host.
const DEFAULT_TIME_SLICE: Millis = 5;

/// Default starvation timeout for sync and continuous input lanes.
const DEFAULT_SYNC_EXPIRATION: Millis = 250;

/// Default starvation timeout for default and transition lanes.
const DEFAULT_TRANSITION_EXPIRATION: Millis = 5000;

/// Default limit on commits scheduled synchronously from commits.
const DEFAULT_MAX_NESTED_UPDATES: usize = 50;

/// Default yield checks within one clock reading before a slice is cut.
const DEFAULT_MAX_FROZEN_CHECKS: usize = 10_000;

/// Tuning knobs for scheduling, lane aging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Milliseconds of work per slice before yielding.
    /// Default: 5
    pub time_slice: Millis,
    /// Age after which a sync or continuous lane expires.
    /// Default: 250
    pub sync_expiration: Millis,
    /// Age after which a default or transition lane expires.
    /// Default: 5000
    pub transition_expiration: Millis,
    /// Maximum chained synchronous commits before giving up.
    /// Default: 50
    pub max_nested_updates: usize,
    /// Yield checks a time-sliced pass may make without the host clock
    /// advancing; past it the slice ends and a warning is logged.
    /// Default: 10000
    pub max_frozen_checks: usize,
    /// Whether to publish a [`TreeSnapshot`](crate::inspect::TreeSnapshot)
    /// after every commit.
    /// Default: true
    pub publish_snapshots: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            time_slice: DEFAULT_TIME_SLICE,
            sync_expiration: DEFAULT_SYNC_EXPIRATION,
            transition_expiration: DEFAULT_TRANSITION_EXPIRATION,
            max_nested_updates: DEFAULT_MAX_NESTED_UPDATES,
            max_frozen_checks: DEFAULT_MAX_FROZEN_CHECKS,
            publish_snapshots: true,
        }
    }
}

impl ReconcilerConfig {
    /// Create config with custom slice and expirations.
    pub fn new(time_slice: Millis, sync_expiration: Millis, transition_expiration: Millis) -> Self {
        Self {
            time_slice,
            sync_expiration,
            transition_expiration,
            ..Self::default()
        }
    }

    /// Longer slices: fewer yields, higher latency for urgent updates.
    pub fn throughput() -> Self {
        Self {
            time_slice: 16,
            ..Self::default()
        }
    }

    /// Short slices and quick aging, for input-heavy hosts.
    pub fn responsive() -> Self {
        Self {
            time_slice: 2,
            sync_expiration: 100,
            transition_expiration: 2000,
            ..Self::default()
        }
    }

    pub fn with_time_slice(mut self, ms: Millis) -> Self {
        self.time_slice = ms;
        self
    }

    pub fn with_sync_expiration(mut self, ms: Millis) -> Self {
        self.sync_expiration = ms;
        self
    }

    pub fn with_transition_expiration(mut self, ms: Millis) -> Self {
        self.transition_expiration = ms;
        self
    }

    pub fn with_max_nested_updates(mut self, limit: usize) -> Self {
        self.max_nested_updates = limit;
        self
    }

    pub fn with_max_frozen_checks(mut self, checks: usize) -> Self {
        self.max_frozen_checks = checks;
        self
    }

    pub fn with_snapshots(mut self, publish: bool) -> Self {
        self.publish_snapshots = publish;
        self
    }
}
