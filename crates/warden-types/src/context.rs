//! Context values and context sets.
//!
//! A [`ContextValue`] is a situational qualifier such as `world=nether`.
//! A [`ContextSet`] is an unordered set of them; the empty set is the
//! global context and applies unconditionally.
//!
//! # Applicability
//!
//! ```text
//! stored key K        query C                         applicable?
//! {}                  {world=nether, difficulty=hard}  yes (global)
//! {world=nether}      {world=nether, difficulty=hard}  yes (K ⊆ C)
//! {world=end}         {world=nether, difficulty=hard}  no
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A typed `(key, value)` situational qualifier.
///
/// Two values are equal iff key and raw value match exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextValue {
    key: String,
    value: String,
}

impl ContextValue {
    /// Creates a new context value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the context key (e.g. `"world"`).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the raw context value (e.g. `"nether"`).
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// A string could not be read as `key=value`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid context value '{0}': expected key=value")]
pub struct InvalidContextValue(pub String);

impl FromStr for ContextValue {
    type Err = InvalidContextValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(Self::new(key.trim(), value.trim()))
            }
            _ => Err(InvalidContextValue(s.to_string())),
        }
    }
}

/// An unordered set of [`ContextValue`]s, compared by content.
///
/// Ordering (`Ord`) is lexicographic over the sorted members. It carries no
/// meaning beyond giving equally specific sets a deterministic order.
///
/// # Example
///
/// ```
/// use warden_types::{ContextSet, ContextValue};
///
/// let nether = ContextSet::of([("world", "nether")]);
/// let active = ContextSet::of([("world", "nether"), ("difficulty", "hard")]);
///
/// assert!(ContextSet::global().is_subset_of(&active));
/// assert!(nether.is_subset_of(&active));
/// assert!(!active.is_subset_of(&nether));
/// assert!(active.contains(&ContextValue::new("difficulty", "hard")));
/// ```
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContextSet(BTreeSet<ContextValue>);

impl ContextSet {
    /// The global (empty) context set.
    #[must_use]
    pub fn global() -> Self {
        Self::default()
    }

    /// Builds a set from `(key, value)` pairs.
    #[must_use]
    pub fn of<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| ContextValue::new(k, v))
            .collect()
    }

    /// Returns `true` for the global context.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of context values; used as the specificity of a stored segment.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Same as [`is_global`](Self::is_global).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `value` is a member.
    #[must_use]
    pub fn contains(&self, value: &ContextValue) -> bool {
        self.0.contains(value)
    }

    /// Returns `true` if every member of `self` is present in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &ContextSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Adds a value, returning whether it was newly inserted.
    pub fn insert(&mut self, value: ContextValue) -> bool {
        self.0.insert(value)
    }

    /// Returns a copy with `value` added.
    #[must_use]
    pub fn with(mut self, value: ContextValue) -> Self {
        self.0.insert(value);
        self
    }

    /// Iterates members in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ContextValue> {
        self.0.iter()
    }

    /// Distinct keys used by this set.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<&str> {
        self.0.iter().map(ContextValue::key).collect()
    }

    /// All values stored under `key`.
    pub fn values_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |cv| cv.key() == key)
            .map(ContextValue::value)
    }
}

impl FromIterator<ContextValue> for ContextSet {
    fn from_iter<T: IntoIterator<Item = ContextValue>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<ContextValue> for ContextSet {
    fn extend<T: IntoIterator<Item = ContextValue>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ContextSet {
    type Item = ContextValue;
    type IntoIter = std::collections::btree_set::IntoIter<ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ContextSet {
    type Item = &'a ContextValue;
    type IntoIter = std::collections::btree_set::Iter<'a, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("global");
        }
        f.write_str("{")?;
        for (i, cv) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{cv}")?;
        }
        f.write_str("}")
    }
}
