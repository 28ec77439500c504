//! Core types for the warden permission engine.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  warden-types   : contexts, subject types, refs  ◄── HERE   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  warden-data    : Segment, ImmutableSubjectData, NodeTree,  │
//! │                   DataStore / notifier / context traits     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  warden-runtime : data caches, calculated subjects, engine  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is immutable once built and freely shareable across
//! threads.
//!
//! # Example
//!
//! ```
//! use warden_types::{ContextSet, SubjectType};
//!
//! let users = SubjectType::<u64>::from_str_builder("user").build();
//! let alice = users.reference(&1001);
//! assert_eq!(alice.to_string(), "user:1001");
//!
//! let in_nether = ContextSet::of([("world", "nether")]);
//! assert!(!in_nether.is_global());
//! ```

mod context;
mod error;
mod kind;
mod subject_ref;
mod subject_type;

pub use context::{ContextSet, ContextValue, InvalidContextValue};
pub use error::{assert_error_code, assert_error_codes, ErrorCode, InvalidIdentifier};
pub use kind::SubjectKind;
pub use subject_ref::SubjectRef;
pub use subject_type::{
    AssociatedObject, EntrySupplier, Identifier, SubjectType, SubjectTypeBuilder,
};
