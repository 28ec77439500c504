//! Runtime for the warden permission engine.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  warden-types   : contexts, subject types, refs             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  warden-data    : Segment, ImmutableSubjectData, NodeTree,  │
//! │                   DataStore / notifier / context traits     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  warden-runtime : data caches, calculated subjects, engine  │
//! │                                                  ◄── HERE   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Query flow
//!
//! ```text
//! CalculatedSubject::permission(C, "world.edit")
//!   │
//!   ├─► SubjectDataCache (transient) ─┐
//!   ├─► SubjectDataCache (persistent) ├─► segments K ⊆ C, merged by
//!   │                                 │   specificity, tiers combined
//!   │                                 ▼
//!   │                         NodeTree + fallback
//!   ├─► parents (depth-first, list order, cycle guard)
//!   ├─► defaults:<type>, defaults:<fallback>
//!   └─► PermissionCheckNotifier
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cache`] | [`SubjectDataCache`], listeners, tiers |
//! | [`subject`] | [`CalculatedSubject`], [`SubjectDataHandle`] |
//! | [`config`] | [`EngineConfig`](config::EngineConfig), [`ConfigLoader`](config::ConfigLoader) |
//! | [`logging`] | tracing bootstrap |

pub mod cache;
mod clock;
mod collection;
pub mod config;
mod engine;
mod error;
pub mod logging;
pub mod subject;

pub use cache::{DataListener, ListenerId, ListenerMode, SubjectDataCache, Tier};
pub use clock::ContextClock;
pub use collection::SubjectTypeCollection;
pub use engine::{PermissionsEngine, PermissionsEngineBuilder};
pub use error::CacheError;
pub use subject::{CalculatedSubject, SubjectDataHandle, SubjectListener};
