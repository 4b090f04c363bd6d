//! Deterministic hashing for unit identities.
//!
//! Identities must be reproducible across processes so that dev tooling can
//! correlate nodes between sessions, which rules out `std::hash`.

// =============================================================================
// IdentityHasher - Builder Pattern
// =============================================================================

/// Builder over blake3 producing a `u64` digest.
///
/// Strings are length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide.
pub struct IdentityHasher {
    inner: blake3::Hasher,
}

impl IdentityHasher {
    /// Start an empty digest.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    /// Mix in a `u64` (little-endian).
    #[inline]
    pub fn write_u64(mut self, value: u64) -> Self {
        self.inner.update(&value.to_le_bytes());
        self
    }

    /// Mix in a `usize`, widened to `u64` so 32/64-bit targets agree.
    #[inline]
    pub fn write_usize(self, value: usize) -> Self {
        self.write_u64(value as u64)
    }

    /// Mix in a length-prefixed string.
    #[inline]
    pub fn write_str(self, value: &str) -> Self {
        let mut this = self.write_usize(value.len());
        this.inner.update(value.as_bytes());
        this
    }

    /// Finish and fold the digest into a `u64`.
    #[inline]
    pub fn finish(self) -> u64 {
        let digest = self.inner.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new()
    }
}
