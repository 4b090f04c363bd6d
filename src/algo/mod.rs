//! Pure diff algorithms.
//!
//! - `children`: single-pass keyed reconciliation of one sibling group
//! - `props`: host property diff

mod children;
mod props;

pub use children::{plan_children, ChildPlan, ReconcilePlan};
pub use props::diff_props;
