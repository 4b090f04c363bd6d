//! Handles and stable identities for work units.
//!
//! Two kinds of identifiers live here:
//! - [`UnitId`]: an arena handle. Cheap, `Copy`, generation-checked so a
//!   handle to a freed slot is detected instead of silently aliasing a new unit.
//! - [`Identity`]: a content-derived hash that stays the same across renders
//!   for the same logical position (parent identity + type + key or index).
//!
//! Both the current unit and its alternate share one `Identity`; they differ
//! in `UnitId`.

use std::fmt;

use compact_str::{CompactString, ToCompactString};

use crate::hash::IdentityHasher;

// =============================================================================
// UnitId
// =============================================================================

/// Handle to a work unit slot in the arena.
///
/// # Memory Layout
///
/// - 8 bytes (slot index + generation)
/// - `Copy`, no heap allocation
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct UnitId {
    index: u32,
    generation: u32,
}

impl UnitId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at the time the handle was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Key
// =============================================================================

/// Explicit identity key supplied by an element.
///
/// Unkeyed children are matched by position instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(CompactString);

impl Key {
    /// Create a key from anything string-like.
    #[inline]
    pub fn new(key: impl Into<CompactString>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(CompactString::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(CompactString::from(s))
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Self(n.to_compact_string())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Stable position identity.
///
/// Computed from:
/// - the parent identity
/// - the element type name
/// - the explicit key, or the position among siblings when unkeyed
///
/// Keyed identities are position-independent, so a reordered keyed child
/// keeps its identity and is recorded as a move.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct Identity(u64);

impl Identity {
    /// Identity of every host root.
    pub const ROOT: Self = Self(0);

    /// Derive the identity of a child position.
    pub fn child(parent: Identity, type_name: &str, key: Option<&Key>, index: usize) -> Self {
        let hasher = IdentityHasher::new()
            .write_u64(parent.0)
            .write_str(type_name);
        let hasher = match key {
            Some(key) => hasher.write_str("k").write_str(key.as_str()),
            None => hasher.write_str("i").write_usize(index),
        };
        Self(hasher.finish())
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Lowercase hex, no prefix.
    #[inline]
    pub fn to_hex(self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:016x})", self.0)
    }
}

// =============================================================================
// ResourceId
// =============================================================================

/// Opaque token for an asynchronous value a component is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_identity_ignores_position() {
        let key = Key::from("a");
        let first = Identity::child(Identity::ROOT, "li", Some(&key), 0);
        let later = Identity::child(Identity::ROOT, "li", Some(&key), 5);
        assert_eq!(first, later);
    }

    #[test]
    fn test_unkeyed_identity_tracks_position() {
        let first = Identity::child(Identity::ROOT, "li", None, 0);
        let second = Identity::child(Identity::ROOT, "li", None, 1);
        assert_ne!(first, second);
    }

    #[test]
    fn test_identity_depends_on_type_and_parent() {
        let key = Key::from("a");
        let li = Identity::child(Identity::ROOT, "li", Some(&key), 0);
        let div = Identity::child(Identity::ROOT, "div", Some(&key), 0);
        assert_ne!(li, div);

        let nested = Identity::child(li, "li", Some(&key), 0);
        assert_ne!(nested, li);
    }

    #[test]
    fn test_key_index_and_numeric_string_differ_from_position() {
        // A key "0" is not the same as position 0.
        let keyed = Identity::child(Identity::ROOT, "li", Some(&Key::from(0usize)), 0);
        let positional = Identity::child(Identity::ROOT, "li", None, 0);
        assert_ne!(keyed, positional);
    }

    #[test]
    fn test_unit_id_debug() {
        let id = UnitId::new(3, 7);
        assert_eq!(format!("{id:?}"), "#3v7");
        assert_eq!(id.index(), 3);
        assert_eq!(id.generation(), 7);
    }
}
