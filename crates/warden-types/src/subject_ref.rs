//! Subject references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An immutable `(subject type, identifier)` pair.
///
/// The identifier is held in the subject type's serialized form, which makes
/// references of different identifier types storable side by side (a user's
/// parent list may name groups and roles). Equality is structural on both
/// fields. Use `SubjectType::resolve` to get the typed identifier back.
///
/// # Example
///
/// ```
/// use warden_types::SubjectRef;
///
/// let admin = SubjectRef::new("group", "admin");
/// assert_eq!(admin.subject_type(), "group");
/// assert_eq!(admin.identifier(), "admin");
/// assert_eq!(admin.to_string(), "group:admin");
/// assert_eq!(admin, SubjectRef::new("group", "admin"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    #[serde(rename = "type")]
    subject_type: Arc<str>,
    identifier: Arc<str>,
}

impl SubjectRef {
    /// Creates a reference from a type name and a serialized identifier.
    #[must_use]
    pub fn new(subject_type: impl AsRef<str>, identifier: impl AsRef<str>) -> Self {
        Self {
            subject_type: Arc::from(subject_type.as_ref()),
            identifier: Arc::from(identifier.as_ref()),
        }
    }

    /// Name of the subject type.
    #[must_use]
    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    /// Serialized identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.identifier)
    }
}
