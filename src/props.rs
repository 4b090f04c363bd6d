//! Property bag for elements and component state.
//!
//! Props are a small ordered list of `(name, value)` pairs. Most elements
//! carry a handful of properties, so the list is inline (`SmallVec`) and
//! lookups are linear scans.
//!
//! Equality is order-insensitive: `{a: 1, b: 2} == {b: 2, a: 1}`. The
//! bail-out check relies on this.

use std::fmt;

use compact_str::CompactString;
use smallvec::SmallVec;

// =============================================================================
// Value
// =============================================================================

/// A single property value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(CompactString),
}

impl Value {
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(CompactString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(CompactString::from(s))
    }
}

// =============================================================================
// Props
// =============================================================================

/// Ordered property list with set semantics on names.
#[derive(Debug, Clone, Default)]
pub struct Props {
    entries: SmallVec<[(CompactString, Value); 4]>,
}

impl Props {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Props::set`].
    #[inline]
    pub fn with(mut self, name: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    #[inline]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    #[inline]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    #[inline]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Insert or overwrite a property, keeping the original position.
    pub fn set(&mut self, name: impl Into<CompactString>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Remove a property, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries
            .iter()
            .position(|(k, _)| k == name)
            .map(|pos| self.entries.remove(pos).1)
    }

    /// Overlay every entry of `other` onto `self`.
    pub fn extend_from(&mut self, other: &Props) {
        for (name, value) in other.iter() {
            self.set(name.clone(), value.clone());
        }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Props {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V> FromIterator<(K, V)> for Props
where
    K: Into<CompactString>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

// =============================================================================
// Changes
// =============================================================================

/// One property change: `Some(value)` sets, `None` removes.
pub type PropChange = (CompactString, Option<Value>);

/// Ordered property changes for one host instance.
pub type PropChanges = Vec<PropChange>;

// =============================================================================
// Tests
// =============================================================================
