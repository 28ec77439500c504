//! Segments: the data one subject holds under one exact context set.
//!
//! # Permission values
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `0` | unset, no entry here |
//! | `> 0` | true, magnitude is a priority weight |
//! | `< 0` | false, magnitude is a priority weight |
//!
//! Every `with*`/`without*`/`clear*` method returns a new segment and leaves
//! the receiver untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warden_types::SubjectRef;

/// Immutable bundle of permissions, options, parents and a fallback
/// permission value.
///
/// # Example
///
/// ```
/// use warden_data::Segment;
/// use warden_types::SubjectRef;
///
/// let base = Segment::new();
/// let admin = base
///     .with_permission("world.edit", 1)
///     .with_option("prefix", "[A]")
///     .with_added_parent(SubjectRef::new("group", "mod"));
///
/// assert!(base.is_empty());
/// assert_eq!(admin.permission("world.edit"), 1);
/// assert_eq!(admin.option("prefix"), Some("[A]"));
/// assert_eq!(admin.parents(), &[SubjectRef::new("group", "mod")]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    permissions: BTreeMap<String, i32>,
    options: BTreeMap<String, String>,
    parents: Vec<SubjectRef>,
    fallback_permission: i32,
}

impl Segment {
    /// The empty segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` iff there are no permissions, options, parents and the
    /// fallback permission is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
            && self.options.is_empty()
            && self.parents.is_empty()
            && self.fallback_permission == 0
    }

    /// Permission entries of this segment.
    #[must_use]
    pub fn permissions(&self) -> &BTreeMap<String, i32> {
        &self.permissions
    }

    /// Exact-key permission value, `0` when absent (no wildcard matching).
    #[must_use]
    pub fn permission(&self, name: &str) -> i32 {
        self.permissions.get(name).copied().unwrap_or(0)
    }

    /// Option entries of this segment.
    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Value of one option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Parents in priority order (earliest wins).
    #[must_use]
    pub fn parents(&self) -> &[SubjectRef] {
        &self.parents
    }

    /// Value used for any permission not matched in this segment.
    #[must_use]
    pub fn fallback_permission(&self) -> i32 {
        self.fallback_permission
    }

    /// Sets one permission; `0` removes the entry.
    #[must_use]
    pub fn with_permission(&self, name: impl Into<String>, value: i32) -> Self {
        let mut next = self.clone();
        let name = name.into();
        if value == 0 {
            next.permissions.remove(&name);
        } else {
            next.permissions.insert(name, value);
        }
        next
    }

    /// Removes one permission.
    #[must_use]
    pub fn without_permission(&self, name: &str) -> Self {
        self.with_permission(name, 0)
    }

    /// Replaces all permissions; `0` values are dropped.
    #[must_use]
    pub fn with_permissions(&self, permissions: BTreeMap<String, i32>) -> Self {
        Self {
            permissions: permissions.into_iter().filter(|(_, v)| *v != 0).collect(),
            ..self.clone()
        }
    }

    /// Removes all permissions.
    #[must_use]
    pub fn clear_permissions(&self) -> Self {
        self.with_permissions(BTreeMap::new())
    }

    /// Sets one option.
    #[must_use]
    pub fn with_option(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.options.insert(key.into(), value.into());
        next
    }

    /// Removes one option.
    #[must_use]
    pub fn without_option(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.options.remove(key);
        next
    }

    /// Replaces all options.
    #[must_use]
    pub fn with_options(&self, options: BTreeMap<String, String>) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    /// Removes all options.
    #[must_use]
    pub fn clear_options(&self) -> Self {
        self.with_options(BTreeMap::new())
    }

    /// Replaces the parent list.
    #[must_use]
    pub fn with_parents(&self, parents: Vec<SubjectRef>) -> Self {
        Self {
            parents,
            ..self.clone()
        }
    }

    /// Puts `parent` first in the list (highest priority), moving it if it
    /// was already present.
    #[must_use]
    pub fn with_added_parent(&self, parent: SubjectRef) -> Self {
        let mut next = self.clone();
        next.parents.retain(|p| *p != parent);
        next.parents.insert(0, parent);
        next
    }

    /// Removes `parent` from the list.
    #[must_use]
    pub fn without_parent(&self, parent: &SubjectRef) -> Self {
        let mut next = self.clone();
        next.parents.retain(|p| p != parent);
        next
    }

    /// Removes all parents.
    #[must_use]
    pub fn clear_parents(&self) -> Self {
        self.with_parents(Vec::new())
    }

    /// Sets the fallback permission (`0` unsets it).
    #[must_use]
    pub fn with_fallback_permission(&self, value: i32) -> Self {
        Self {
            fallback_permission: value,
            ..self.clone()
        }
    }

    /// Right-biased merge.
    ///
    /// Permissions and options from `other` overwrite same-key entries,
    /// `other`'s parents are appended after ours, and `other`'s fallback
    /// wins when it is set.
    #[must_use]
    pub fn merge_from(&self, other: &Segment) -> Self {
        let mut next = self.clone();
        next.permissions.extend(other.permissions.iter().map(|(k, v)| (k.clone(), *v)));
        next.options.extend(other.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        next.parents.extend(other.parents.iter().cloned());
        if other.fallback_permission != 0 {
            next.fallback_permission = other.fallback_permission;
        }
        next
    }
}
