//! Host property diff.

use crate::props::{PropChanges, Props};

/// Compute the changes turning `old` into `new`.
///
/// Changed and added properties come first in `new` order (`Some`), then
/// removed properties in `old` order (`None`). An empty result means the
/// host instance needs no update.
pub fn diff_props(old: &Props, new: &Props) -> PropChanges {
    let mut changes = PropChanges::new();

    // Changed or added
    for (name, value) in new.iter() {
        if old.get(name) != Some(value) {
            changes.push((name.clone(), Some(value.clone())));
        }
    }

    // Removed
    for (name, _) in old.iter() {
        if !new.contains(name) {
            changes.push((name.clone(), None));
        }
    }

    changes
}
