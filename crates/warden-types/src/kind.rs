//! Type-erased subject types.
//!
//! Caches and the resolution engine handle every subject type uniformly,
//! working on serialized identifiers. [`SubjectKind`] is the function table
//! they see; every [`SubjectType<I>`] implements it.

use crate::subject_type::{AssociatedObject, Identifier, SubjectType};
use crate::InvalidIdentifier;
use std::fmt;

/// Object-safe view of a [`SubjectType`].
pub trait SubjectKind: fmt::Debug + Send + Sync {
    /// Type name.
    fn name(&self) -> &str;

    /// Whether transient data wins over persistent data.
    fn transient_has_priority(&self) -> bool;

    /// Parses and re-serializes `raw`, yielding the canonical identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] when `raw` does not parse.
    fn normalize_identifier(&self, raw: &str) -> Result<String, InvalidIdentifier>;

    /// Parse-or-coerce, returning the canonical identifier.
    fn coerce_identifier(&self, raw: &str) -> Option<String>;

    /// Undefined permission policy; `false` for unparsable identifiers.
    fn undefined_permission_value(&self, identifier: &str) -> bool;

    /// Associated host object for a serialized identifier.
    fn associated_object(&self, identifier: &str) -> Option<AssociatedObject>;

    /// Enumerated identifiers for fixed-entry types.
    fn fixed_identifiers(&self) -> Option<Vec<String>>;

    /// `true` iff `raw` parses.
    fn is_identifier_valid(&self, raw: &str) -> bool {
        self.normalize_identifier(raw).is_ok()
    }
}

impl<I: Identifier> SubjectKind for SubjectType<I> {
    fn name(&self) -> &str {
        SubjectType::name(self)
    }

    fn transient_has_priority(&self) -> bool {
        SubjectType::transient_has_priority(self)
    }

    fn normalize_identifier(&self, raw: &str) -> Result<String, InvalidIdentifier> {
        self.parse_identifier(raw)
            .map(|id| self.serialize_identifier(&id))
    }

    fn coerce_identifier(&self, raw: &str) -> Option<String> {
        self.parse_or_coerce_identifier(raw)
            .map(|id| self.serialize_identifier(&id))
    }

    fn undefined_permission_value(&self, identifier: &str) -> bool {
        self.parse_identifier(identifier)
            .map(|id| SubjectType::undefined_permission_value(self, &id))
            .unwrap_or(false)
    }

    fn associated_object(&self, identifier: &str) -> Option<AssociatedObject> {
        self.parse_identifier(identifier)
            .ok()
            .and_then(|id| SubjectType::associated_object(self, &id))
    }

    fn fixed_identifiers(&self) -> Option<Vec<String>> {
        SubjectType::fixed_identifiers(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn erased_view_normalizes() {
        let kind: Arc<dyn SubjectKind> = Arc::new(
            SubjectType::<u16>::from_str_builder("slot")
                .undefined_permission_value(|id| *id > 10)
                .build(),
        );
        assert_eq!(kind.name(), "slot");
        assert_eq!(kind.normalize_identifier("007"), Ok("7".to_string()));
        assert!(kind.normalize_identifier("x").is_err());
        assert!(kind.is_identifier_valid("65535"));
        assert!(!kind.is_identifier_valid("65536"));
        assert!(kind.undefined_permission_value("11"));
        assert!(!kind.undefined_permission_value("nope"));
    }
}
