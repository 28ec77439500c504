//! Subject types.
//!
//! A [`SubjectType`] names a kind of subject (`"user"`, `"group"`, ...) and
//! carries the identifier codec and resolution policy for it. It is built
//! once through [`SubjectTypeBuilder`] and immutable afterwards.
//!
//! # Typed and erased views
//!
//! ```text
//! SubjectType<I>         typed: parse/serialize `I`, build SubjectRefs
//!      │ impl
//!      ▼
//! dyn SubjectKind        erased: operates on serialized identifiers,
//!                        used by caches and the resolution engine
//! ```

use crate::{InvalidIdentifier, SubjectRef};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

/// Requirements on an identifier type.
pub trait Identifier: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Identifier for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Host object associated with a subject (e.g. an online player handle).
pub type AssociatedObject = Arc<dyn Any + Send + Sync>;

type ParseFn<I> = Arc<dyn Fn(&str) -> Option<I> + Send + Sync>;
type SerializeFn<I> = Arc<dyn Fn(&I) -> String + Send + Sync>;
type CoerceFn<I> = Arc<dyn Fn(&str) -> Option<I> + Send + Sync>;
type UndefinedValueFn<I> = Arc<dyn Fn(&I) -> bool + Send + Sync>;
type AssociatedFn<I> = Arc<dyn Fn(&I) -> Option<AssociatedObject> + Send + Sync>;
/// Supplies the associated object of one fixed entry.
pub type EntrySupplier = Arc<dyn Fn() -> Option<AssociatedObject> + Send + Sync>;

struct Inner<I> {
    name: String,
    transient_has_priority: bool,
    parse: ParseFn<I>,
    serialize: SerializeFn<I>,
    friendly_name: Option<CoerceFn<I>>,
    undefined_value: UndefinedValueFn<I>,
    associated_object: Option<AssociatedFn<I>>,
    /// Serialized identifier -> associated object supplier.
    fixed_entries: Option<BTreeMap<String, EntrySupplier>>,
}

/// Immutable configuration for one kind of subject.
///
/// Cloning is cheap (shared inner state). Two subject types are equal when
/// their names are equal.
///
/// # Example
///
/// ```
/// use warden_types::SubjectType;
///
/// let groups = SubjectType::string_builder("group").build();
/// let id = groups.parse_identifier("admin").expect("any string is a group name");
/// assert_eq!(groups.serialize_identifier(&id), "admin");
///
/// let worlds = SubjectType::string_builder("world")
///     .fixed_entries(["overworld", "nether"])
///     .build();
/// assert!(worlds.is_identifier_valid("nether"));
/// assert!(worlds.parse_identifier("end").is_err());
/// ```
pub struct SubjectType<I> {
    inner: Arc<Inner<I>>,
}

impl<I> Clone for SubjectType<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> fmt::Debug for SubjectType<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectType")
            .field("name", &self.inner.name)
            .field("transient_has_priority", &self.inner.transient_has_priority)
            .field(
                "fixed_entries",
                &self.inner.fixed_entries.as_ref().map(|e| e.len()),
            )
            .finish_non_exhaustive()
    }
}

impl<I> PartialEq for SubjectType<I> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl<I> Eq for SubjectType<I> {}

impl SubjectType<String> {
    /// Builder for a type whose identifiers are plain strings.
    #[must_use]
    pub fn string_builder(name: impl Into<String>) -> SubjectTypeBuilder<String> {
        SubjectTypeBuilder::new(name, |raw| Some(raw.to_string()), String::clone)
    }
}

impl<I: Identifier + FromStr + fmt::Display> SubjectType<I> {
    /// Builder for a type whose identifiers round-trip through
    /// [`FromStr`] and [`Display`](fmt::Display).
    #[must_use]
    pub fn from_str_builder(name: impl Into<String>) -> SubjectTypeBuilder<I> {
        SubjectTypeBuilder::new(name, |raw| raw.parse().ok(), |id: &I| id.to_string())
    }
}

impl<I: Identifier> SubjectType<I> {
    /// Builder with explicit parse and serialize functions.
    ///
    /// `serialize` must be a left inverse of `parse`:
    /// `parse(serialize(i)) == Some(i)`.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        parse: impl Fn(&str) -> Option<I> + Send + Sync + 'static,
        serialize: impl Fn(&I) -> String + Send + Sync + 'static,
    ) -> SubjectTypeBuilder<I> {
        SubjectTypeBuilder::new(name, parse, serialize)
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether transient data wins over persistent data during resolution.
    #[must_use]
    pub fn transient_has_priority(&self) -> bool {
        self.inner.transient_has_priority
    }

    /// Parses a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] if the string cannot be deserialized or,
    /// for fixed-entry types, is not one of the enumerated identifiers.
    pub fn parse_identifier(&self, raw: &str) -> Result<I, InvalidIdentifier> {
        let id = (self.inner.parse)(raw).ok_or_else(|| self.invalid(raw))?;
        if let Some(entries) = &self.inner.fixed_entries {
            if !entries.contains_key(&(self.inner.serialize)(&id)) {
                return Err(self.invalid(raw));
            }
        }
        Ok(id)
    }

    /// Parses `raw`, falling back to the type's friendly-name resolver.
    ///
    /// Never fails with [`InvalidIdentifier`]; returns `None` when neither
    /// path produces an identifier.
    #[must_use]
    pub fn parse_or_coerce_identifier(&self, raw: &str) -> Option<I> {
        self.parse_or_coerce_with(raw, |_| None)
    }

    /// Like [`parse_or_coerce_identifier`](Self::parse_or_coerce_identifier)
    /// with a caller-supplied resolver consulted after the type's own one.
    pub fn parse_or_coerce_with(
        &self,
        raw: &str,
        resolver: impl FnOnce(&str) -> Option<I>,
    ) -> Option<I> {
        if let Ok(id) = self.parse_identifier(raw) {
            return Some(id);
        }
        self.inner
            .friendly_name
            .as_ref()
            .and_then(|coerce| coerce(raw))
            .or_else(|| resolver(raw))
            .filter(|id| self.is_known(id))
    }

    /// `true` iff [`parse_identifier`](Self::parse_identifier) succeeds.
    #[must_use]
    pub fn is_identifier_valid(&self, raw: &str) -> bool {
        self.parse_identifier(raw).is_ok()
    }

    /// Serializes an identifier.
    #[must_use]
    pub fn serialize_identifier(&self, id: &I) -> String {
        (self.inner.serialize)(id)
    }

    /// The boolean callers should read an undefined (0) permission as.
    ///
    /// The engine itself always returns the raw tri-state.
    #[must_use]
    pub fn undefined_permission_value(&self, id: &I) -> bool {
        (self.inner.undefined_value)(id)
    }

    /// Host object associated with `id`, if any.
    #[must_use]
    pub fn associated_object(&self, id: &I) -> Option<AssociatedObject> {
        if let Some(entries) = &self.inner.fixed_entries {
            return entries
                .get(&self.serialize_identifier(id))
                .and_then(|supplier| supplier());
        }
        self.inner
            .associated_object
            .as_ref()
            .and_then(|accessor| accessor(id))
    }

    /// Enumerated identifiers (serialized), for fixed-entry types.
    #[must_use]
    pub fn fixed_identifiers(&self) -> Option<Vec<String>> {
        self.inner
            .fixed_entries
            .as_ref()
            .map(|entries| entries.keys().cloned().collect())
    }

    /// Builds a reference to the subject `id` of this type.
    #[must_use]
    pub fn reference(&self, id: &I) -> SubjectRef {
        SubjectRef::new(&self.inner.name, self.serialize_identifier(id))
    }

    /// Recovers the typed identifier from a reference.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] (with the whole reference as input) when
    /// the reference names another type, or when its identifier does not
    /// parse.
    pub fn resolve(&self, subject: &SubjectRef) -> Result<I, InvalidIdentifier> {
        if subject.subject_type() != self.inner.name {
            return Err(self.invalid(&subject.to_string()));
        }
        self.parse_identifier(subject.identifier())
    }

    fn is_known(&self, id: &I) -> bool {
        self.inner
            .fixed_entries
            .as_ref()
            .map_or(true, |entries| {
                entries.contains_key(&self.serialize_identifier(id))
            })
    }

    fn invalid(&self, raw: &str) -> InvalidIdentifier {
        InvalidIdentifier::new(&self.inner.name, raw)
    }
}

/// Builder for [`SubjectType`].
pub struct SubjectTypeBuilder<I> {
    name: String,
    transient_has_priority: bool,
    parse: ParseFn<I>,
    serialize: SerializeFn<I>,
    friendly_name: Option<CoerceFn<I>>,
    undefined_value: UndefinedValueFn<I>,
    associated_object: Option<AssociatedFn<I>>,
    fixed_entries: Option<BTreeMap<String, EntrySupplier>>,
}

impl<I: Identifier> SubjectTypeBuilder<I> {
    fn new(
        name: impl Into<String>,
        parse: impl Fn(&str) -> Option<I> + Send + Sync + 'static,
        serialize: impl Fn(&I) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            transient_has_priority: true,
            parse: Arc::new(parse),
            serialize: Arc::new(serialize),
            friendly_name: None,
            undefined_value: Arc::new(|_| false),
            associated_object: None,
            fixed_entries: None,
        }
    }

    /// Sets whether transient data wins over persistent data (default `true`).
    #[must_use]
    pub fn transient_has_priority(mut self, value: bool) -> Self {
        self.transient_has_priority = value;
        self
    }

    /// Sets the resolver used by `parse_or_coerce_identifier`.
    #[must_use]
    pub fn friendly_name_resolver(
        mut self,
        resolver: impl Fn(&str) -> Option<I> + Send + Sync + 'static,
    ) -> Self {
        self.friendly_name = Some(Arc::new(resolver));
        self
    }

    /// Sets the per-identifier undefined permission policy (default `false`).
    #[must_use]
    pub fn undefined_permission_value(
        mut self,
        policy: impl Fn(&I) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.undefined_value = Arc::new(policy);
        self
    }

    /// Sets the associated-object accessor.
    ///
    /// Ignored for fixed-entry types, whose entries carry their own supplier.
    #[must_use]
    pub fn associated_object(
        mut self,
        accessor: impl Fn(&I) -> Option<AssociatedObject> + Send + Sync + 'static,
    ) -> Self {
        self.associated_object = Some(Arc::new(accessor));
        self
    }

    /// Restricts the type to the listed identifiers, none of which carry an
    /// associated object.
    #[must_use]
    pub fn fixed_entries<S: Into<String>>(self, identifiers: impl IntoIterator<Item = S>) -> Self {
        self.fixed_entries_with(identifiers.into_iter().map(|id| {
            let supplier: EntrySupplier = Arc::new(|| None);
            (id, supplier)
        }))
    }

    /// Restricts the type to the listed identifiers, each with its own
    /// associated-object supplier.
    #[must_use]
    pub fn fixed_entries_with<S: Into<String>>(
        mut self,
        entries: impl IntoIterator<Item = (S, EntrySupplier)>,
    ) -> Self {
        let map = self.fixed_entries.get_or_insert_with(BTreeMap::new);
        for (id, supplier) in entries {
            map.insert(id.into(), supplier);
        }
        self
    }

    /// Finishes the type.
    #[must_use]
    pub fn build(self) -> SubjectType<I> {
        SubjectType {
            inner: Arc::new(Inner {
                name: self.name,
                transient_has_priority: self.transient_has_priority,
                parse: self.parse,
                serialize: self.serialize,
                friendly_name: self.friendly_name,
                undefined_value: self.undefined_value,
                associated_object: self.associated_object,
                fixed_entries: self.fixed_entries,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn numeric() -> SubjectType<u32> {
        SubjectType::from_str_builder("account")
            .friendly_name_resolver(|raw| match raw {
                "root" => Some(0),
                _ => None,
            })
            .undefined_permission_value(|id| *id == 0)
            .build()
    }

    #[test]
    fn parse_failure_carries_raw_input() {
        let err = numeric()
            .parse_identifier("abc")
            .expect_err("letters are not an account number");
        assert_eq!(err.raw, "abc");
        assert_eq!(err.subject_type, "account");
    }

    #[test]
    fn coerce_uses_friendly_name() {
        let ty = numeric();
        assert_eq!(ty.parse_or_coerce_identifier("7"), Some(7));
        assert_eq!(ty.parse_or_coerce_identifier("root"), Some(0));
        assert_eq!(ty.parse_or_coerce_identifier("nobody"), None);
        assert_eq!(ty.parse_or_coerce_with("nobody", |_| Some(42)), Some(42));
    }

    #[test]
    fn undefined_permission_policy_is_per_identifier() {
        let ty = numeric();
        assert!(ty.undefined_permission_value(&0));
        assert!(!ty.undefined_permission_value(&1));
    }

    #[test]
    fn defaults() {
        let ty = SubjectType::string_builder("group").build();
        assert!(ty.transient_has_priority());
        assert!(!ty.undefined_permission_value(&"x".to_string()));
        assert!(ty.fixed_identifiers().is_none());
        assert!(ty.associated_object(&"x".to_string()).is_none());
    }

    #[test]
    fn fixed_entries_restrict_identifiers() {
        let ty = SubjectType::string_builder("realm")
            .fixed_entries(["alpha", "beta"])
            .build();
        assert_eq!(ty.parse_identifier("alpha"), Ok("alpha".to_string()));
        let err = ty
            .parse_identifier("gamma")
            .expect_err("gamma is not enumerated");
        assert_eq!(err.raw, "gamma");
        assert_eq!(
            ty.fixed_identifiers(),
            Some(vec!["alpha".to_string(), "beta".to_string()])
        );
    }

    #[test]
    fn fixed_entries_coerce_rejects_unknown() {
        let ty = SubjectType::string_builder("realm")
            .fixed_entries(["alpha"])
            .build();
        assert_eq!(ty.parse_or_coerce_with("gamma", |_| Some("gamma".into())), None);
        assert_eq!(
            ty.parse_or_coerce_with("ALPHA", |raw| Some(raw.to_lowercase())),
            Some("alpha".to_string())
        );
    }

    #[test]
    fn fixed_entry_supplies_associated_object() {
        let supplier: EntrySupplier = Arc::new(|| Some(Arc::new(5_u8) as AssociatedObject));
        let ty = SubjectType::string_builder("realm")
            .fixed_entries_with([("alpha", supplier)])
            .build();
        let obj = ty
            .associated_object(&"alpha".to_string())
            .expect("alpha has an object");
        assert_eq!(obj.downcast_ref::<u8>(), Some(&5));
    }

    #[test]
    fn reference_and_resolve() {
        let ty = numeric();
        let r = ty.reference(&12);
        assert_eq!(r, SubjectRef::new("account", "12"));
        assert_eq!(ty.resolve(&r), Ok(12));

        let foreign = SubjectRef::new("group", "12");
        let err = ty.resolve(&foreign).expect_err("wrong type");
        assert_eq!(err.raw, "group:12");
    }

    #[test]
    fn equality_is_by_name() {
        let a = SubjectType::string_builder("group").build();
        let b = SubjectType::string_builder("group")
            .transient_has_priority(false)
            .build();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn numeric_identifiers_round_trip(id in any::<u32>()) {
            let ty = numeric();
            prop_assert_eq!(ty.parse_identifier(&ty.serialize_identifier(&id)), Ok(id));
        }

        #[test]
        fn string_identifiers_round_trip(id in ".*") {
            let ty = SubjectType::string_builder("group").build();
            prop_assert_eq!(ty.parse_identifier(&ty.serialize_identifier(&id)), Ok(id.clone()));
        }
    }
}
