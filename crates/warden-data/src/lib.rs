//! Subject data model and collaborator contracts for warden.
//!
//! # Crate Architecture
//!
//! ```text
//! warden-types  (ContextSet, SubjectType, SubjectRef)
//!      ↑
//! warden-data   ◄── THIS CRATE
//!      │  Segment, ImmutableSubjectData      immutable data model
//!      │  NodeTree                            wildcard permission matcher
//!      │  DataStore, MemoryDataStore          storage boundary
//!      │  PermissionCheckNotifier             audit boundary
//!      │  ContextCalculator                   context accumulation boundary
//!      ↑
//! warden-runtime (caches, calculated subjects, engine)
//! ```
//!
//! # Design Principles
//!
//! - **Immutable data**: every write returns a new value; values are freely
//!   shared across threads without locking
//! - **Traits at the boundaries**: storage, audit and context sources are
//!   supplied by the host; this crate ships in-memory and tracing defaults

pub mod context_calc;
pub mod node_tree;
pub mod notifier;
pub mod segment;
pub mod store;
pub mod subject_data;

pub use context_calc::{ContextCalculator, FnCalculator, StaticContexts};
pub use node_tree::NodeTree;
pub use notifier::{
    CheckRecord, MultiplexingNotifier, NoopNotifier, PermissionCheckNotifier, RecordingNotifier,
    TracingNotifier,
};
pub use segment::Segment;
pub use store::{DataStore, MemoryDataStore, StoreError};
pub use subject_data::{ImmutableSubjectData, SegmentEntry};

// Re-export the primitives every user of this crate needs
pub use warden_types::{ContextSet, ContextValue, SubjectRef};
