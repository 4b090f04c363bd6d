//! Async driving of a reconciler (requires `async` feature).
//!
//! Work runs in slices on the calling task; between slices control returns
//! to the executor so other tasks make progress.

use std::future::Future;
use std::task::Poll;

use futures_util::future::poll_fn;
use tracing::trace;

use crate::commit::CommitReport;
use crate::error::FiberResult;
use crate::host::HostRenderer;
use crate::id::ResourceId;
use crate::reconciler::{Reconciler, WorkOutcome};
use crate::scheduler::HostScheduler;

/// Pending once, waking itself, then ready.
async fn yield_now() {
    let mut yielded = false;
    poll_fn(|cx| {
        if yielded {
            return Poll::Ready(());
        }
        yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await;
}

impl<R: HostRenderer, S: HostScheduler> Reconciler<R, S> {
    /// Run slices until no lane has runnable work, yielding to the executor
    /// after every slice that ran out of time.
    ///
    /// Returns the reports of every commit, in order.
    ///
    /// # Example
    ///
    /// ```ignore
    /// rec.render(app())?;
    /// let reports = rec.run_until_idle_async().await?;
    /// ```
    pub async fn run_until_idle_async(&mut self) -> FiberResult<Vec<CommitReport>> {
        let mut reports = Vec::new();
        loop {
            match self.perform_work()? {
                WorkOutcome::Idle => return Ok(reports),
                WorkOutcome::Committed(report) => reports.push(report),
                WorkOutcome::Suspended(resource) => {
                    trace!(%resource, "suspended, waiting for resolve");
                }
                WorkOutcome::Yielded => yield_now().await,
            }
        }
    }

    /// Wait for `ready`, resolve `resource` and run the retried work.
    pub async fn resolve_when<F>(&mut self, resource: ResourceId, ready: F) -> FiberResult<Vec<CommitReport>>
    where
        F: Future<Output = ()>,
    {
        ready.await;
        if !self.resolve(resource)? {
            trace!(%resource, "nothing waiting on resolved resource");
        }
        self.run_until_idle_async().await
    }
}

// =============================================================================
// Tests
// =============================================================================
