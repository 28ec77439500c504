//! Engine wiring.
//!
//! ```text
//! PermissionsEngine (Clone, Arc inside)
//! ├── config       : EngineConfig
//! ├── store        : Arc<dyn DataStore>          persistent tier
//! ├── transient    : Arc<MemoryDataStore>        transient tier
//! ├── kinds        : name ─► registered SubjectKind
//! ├── collections  : name ─► SubjectTypeCollection
//! ├── notifier     : Arc<dyn PermissionCheckNotifier>
//! ├── calculators  : Vec<Arc<dyn ContextCalculator>>
//! └── clock        : ContextClock
//! ```
//!
//! Calculated subjects hold only a weak reference back to the engine, so
//! dropping the last [`PermissionsEngine`] handle frees everything.
//!
//! Registered kinds outlive their collections: after
//! [`PermissionsEngine::shutdown`] a collection is rebuilt from the kind
//! registered under its name, and only names that were never registered
//! fall back to a string-identified type.

use crate::cache::ListenerMode;
use crate::clock::ContextClock;
use crate::collection::SubjectTypeCollection;
use crate::config::{ConfigError, EngineConfig};
use crate::subject::{load_tiers, Baked, CalculatedSubject};
use crate::CacheError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_data::{
    ContextCalculator, DataStore, ImmutableSubjectData, MemoryDataStore, NoopNotifier,
    PermissionCheckNotifier, StaticContexts,
};
use warden_types::{
    ContextSet, Identifier, InvalidIdentifier, SubjectKind, SubjectRef, SubjectType,
};

pub(crate) struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn DataStore>,
    transient_store: Arc<MemoryDataStore>,
    kinds: RwLock<HashMap<String, Arc<dyn SubjectKind>>>,
    collections: RwLock<HashMap<String, Arc<SubjectTypeCollection>>>,
    notifier: Arc<dyn PermissionCheckNotifier>,
    calculators: RwLock<Vec<Arc<dyn ContextCalculator>>>,
    clock: ContextClock,
}

impl EngineInner {
    fn new(
        config: EngineConfig,
        store: Arc<dyn DataStore>,
        notifier: Arc<dyn PermissionCheckNotifier>,
        calculators: Vec<Arc<dyn ContextCalculator>>,
    ) -> Self {
        Self {
            config,
            store,
            transient_store: Arc::new(MemoryDataStore::new()),
            kinds: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            notifier,
            calculators: RwLock::new(calculators),
            clock: ContextClock::new(),
        }
    }

    fn listener_mode(&self) -> ListenerMode {
        if self.config.cache.weak_listeners {
            ListenerMode::Weak
        } else {
            ListenerMode::Strong
        }
    }

    fn new_collection(
        self: &Arc<Self>,
        kind: Arc<dyn SubjectKind>,
    ) -> Arc<SubjectTypeCollection> {
        Arc::new(SubjectTypeCollection::new(
            kind,
            Arc::clone(&self.transient_store) as Arc<dyn DataStore>,
            Arc::clone(&self.store),
            Arc::downgrade(self),
            Arc::clone(&self.notifier),
            self.listener_mode(),
        ))
    }

    pub(crate) fn collection(self: &Arc<Self>, name: &str) -> Arc<SubjectTypeCollection> {
        if let Some(existing) = self.collections.read().get(name) {
            return Arc::clone(existing);
        }
        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            return Arc::clone(existing);
        }
        let registered = self.kinds.read().get(name).cloned();
        let kind = match registered {
            Some(kind) => {
                debug!(subject_type = name, "rebuilding collection for registered type");
                kind
            }
            None => {
                debug!(subject_type = name, "creating string-identified subject type on demand");
                Arc::new(SubjectType::<String>::string_builder(name).build())
                    as Arc<dyn SubjectKind>
            }
        };
        let collection = self.new_collection(kind);
        collections.insert(name.to_string(), Arc::clone(&collection));
        collection
    }

    pub(crate) fn calculated(self: &Arc<Self>, subject: &SubjectRef) -> Arc<CalculatedSubject> {
        self.collection(subject.subject_type())
            .subject(subject.identifier())
    }

    /// Baked view of `subject` alone, reusing the live calculated subject's
    /// cache when there is one. Never creates a calculated subject.
    pub(crate) async fn baked(
        self: &Arc<Self>,
        subject: &SubjectRef,
        contexts: &ContextSet,
    ) -> Arc<Baked> {
        let collection = self.collection(subject.subject_type());
        match collection.live(subject.identifier()) {
            Some(live) => live.baked(contexts).await,
            None => collection.bake(subject.identifier(), contexts).await,
        }
    }

    /// Both tiers of `subject`, unreadable ones as empty.
    pub(crate) async fn raw_tiers(
        self: &Arc<Self>,
        subject: &SubjectRef,
    ) -> (ImmutableSubjectData, ImmutableSubjectData) {
        let collection = self.collection(subject.subject_type());
        let (transient, persistent, _) =
            load_tiers(subject, collection.transient(), collection.persistent()).await;
        (transient, persistent)
    }

    /// Default subjects consulted after `subject`'s own inheritance, in
    /// order.
    pub(crate) fn defaults_for(&self, subject: &SubjectRef) -> Vec<SubjectRef> {
        let defaults = &self.config.defaults;
        if !defaults.enabled || subject.subject_type() == defaults.subject_type {
            return Vec::new();
        }
        let by_type = SubjectRef::new(&defaults.subject_type, subject.subject_type());
        let fallback = SubjectRef::new(&defaults.subject_type, &defaults.fallback_identifier);
        if by_type == fallback {
            vec![by_type]
        } else {
            vec![by_type, fallback]
        }
    }

    pub(crate) fn accumulate_contexts(&self, subject: &SubjectRef) -> ContextSet {
        let mut contexts = ContextSet::global();
        for calculator in self.calculators.read().iter() {
            calculator.accumulate(subject, &mut contexts);
        }
        contexts
    }

    pub(crate) fn clock(&self) -> &ContextClock {
        &self.clock
    }
}

/// Builder for [`PermissionsEngine`].
#[derive(Default)]
pub struct PermissionsEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn DataStore>>,
    notifier: Option<Arc<dyn PermissionCheckNotifier>>,
    calculators: Vec<Arc<dyn ContextCalculator>>,
}

impl PermissionsEngineBuilder {
    /// Uses `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistent store. Defaults to a fresh [`MemoryDataStore`].
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Check notifier. Defaults to [`NoopNotifier`].
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn PermissionCheckNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Adds a context calculator.
    #[must_use]
    pub fn calculator(mut self, calculator: Arc<dyn ContextCalculator>) -> Self {
        self.calculators.push(calculator);
        self
    }

    /// Builds the engine.
    ///
    /// Static contexts from the configuration are registered before any
    /// calculator added here.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidContext`] for a malformed static
    /// context.
    pub fn build(self) -> Result<PermissionsEngine, ConfigError> {
        let mut calculators: Vec<Arc<dyn ContextCalculator>> = Vec::new();
        let statics = self.config.contexts.parsed_static()?;
        if !statics.is_empty() {
            calculators.push(Arc::new(StaticContexts::new(statics)));
        }
        calculators.extend(self.calculators);

        let inner = EngineInner::new(
            self.config,
            self.store
                .unwrap_or_else(|| Arc::new(MemoryDataStore::new())),
            self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier)),
            calculators,
        );
        info!(
            weak_listeners = inner.config.cache.weak_listeners,
            defaults = inner.config.defaults.enabled,
            "permissions engine ready"
        );
        Ok(PermissionsEngine {
            inner: Arc::new(inner),
        })
    }
}

impl fmt::Debug for PermissionsEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionsEngineBuilder")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("notifier", &self.notifier.is_some())
            .field("calculators", &self.calculators.len())
            .finish()
    }
}

/// Entry point: owns configuration, stores, subject type collections,
/// the notifier, context calculators and the active-context clock.
///
/// # Example
///
/// ```
/// use warden_runtime::PermissionsEngine;
/// use warden_types::{ContextSet, SubjectType};
///
/// # tokio_test_block(async {
/// let engine = PermissionsEngine::builder().build()?;
/// let users = engine.register_type(SubjectType::<String>::string_builder("user").build());
///
/// let alice = users.get("alice").await?;
/// alice
///     .data()
///     .update_segment(ContextSet::global(), |s| s.with_permission("world.edit", 1))
///     .await?;
///
/// assert_eq!(alice.permission(&ContextSet::global(), "world.edit.blocks").await, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct PermissionsEngine {
    inner: Arc<EngineInner>,
}

impl PermissionsEngine {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> PermissionsEngineBuilder {
        PermissionsEngineBuilder::default()
    }

    /// Engine with default configuration over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let inner = EngineInner::new(
            EngineConfig::default(),
            store,
            Arc::new(NoopNotifier),
            Vec::new(),
        );
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Check notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn PermissionCheckNotifier> {
        &self.inner.notifier
    }

    /// Registers a subject type, replacing any collection of the same name.
    ///
    /// A replaced collection is closed (see [`shutdown`](Self::shutdown));
    /// stored data of both tiers is kept.
    pub fn register_type<I: Identifier>(
        &self,
        subject_type: SubjectType<I>,
    ) -> Arc<SubjectTypeCollection> {
        self.register_kind(Arc::new(subject_type))
    }

    /// Type-erased [`register_type`](Self::register_type).
    pub fn register_kind(&self, kind: Arc<dyn SubjectKind>) -> Arc<SubjectTypeCollection> {
        let name = kind.name().to_string();
        self.inner
            .kinds
            .write()
            .insert(name.clone(), Arc::clone(&kind));
        let collection = self.inner.new_collection(kind);
        let replaced = self
            .inner
            .collections
            .write()
            .insert(name.clone(), Arc::clone(&collection));
        if let Some(old) = replaced {
            warn!(subject_type = %name, "replacing registered subject type");
            old.close();
        } else {
            debug!(subject_type = %name, "registered subject type");
        }
        collection
    }

    /// Collection for `name`; unknown names get a string-identified type.
    #[must_use]
    pub fn subjects(&self, name: &str) -> Arc<SubjectTypeCollection> {
        self.inner.collection(name)
    }

    /// Names of every registered type and every live collection, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.kinds.read().keys().cloned().collect();
        names.extend(self.inner.collections.read().keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Parses `raw` as an identifier of `subject_type`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] when `raw` does not parse.
    pub fn reference_to(
        &self,
        subject_type: &str,
        raw: &str,
    ) -> Result<SubjectRef, InvalidIdentifier> {
        self.subjects(subject_type).reference_to(raw)
    }

    /// Live calculated subject for `subject`. No I/O.
    #[must_use]
    pub fn calculated(&self, subject: &SubjectRef) -> Arc<CalculatedSubject> {
        self.inner.calculated(subject)
    }

    /// Calculated subject for `subject` with both tiers loaded.
    ///
    /// # Errors
    ///
    /// See [`SubjectTypeCollection::get`].
    pub async fn subject(
        &self,
        subject: &SubjectRef,
    ) -> Result<Arc<CalculatedSubject>, CacheError> {
        self.subjects(subject.subject_type())
            .get(subject.identifier())
            .await
    }

    /// Adds a context calculator.
    pub fn add_context_calculator(&self, calculator: Arc<dyn ContextCalculator>) {
        self.inner.calculators.write().push(calculator);
    }

    /// Contexts the calculators currently report for `subject`, bypassing
    /// the per-tick cache.
    #[must_use]
    pub fn accumulate_contexts(&self, subject: &SubjectRef) -> ContextSet {
        self.inner.accumulate_contexts(subject)
    }

    /// Advances the active-context clock; returns the new tick.
    pub fn tick(&self) -> u64 {
        self.inner.clock.advance()
    }

    /// Current tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.inner.clock.current()
    }

    /// Spawns a task advancing the clock every `contexts.tick_ms`.
    ///
    /// The task ends on its own once every engine handle is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let period = Duration::from_millis(self.inner.config.contexts.tick_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match engine.upgrade() {
                    Some(inner) => {
                        inner.clock.advance();
                    }
                    None => break,
                }
            }
            debug!("context ticker stopped");
        })
    }

    /// Closes every collection and its caches.
    ///
    /// Handles obtained before the shutdown fail writes with
    /// [`CacheError::IllegalState`]. The engine itself stays usable:
    /// later lookups start over with fresh caches of the same registered
    /// subject types.
    pub fn shutdown(&self) {
        let collections: Vec<Arc<SubjectTypeCollection>> =
            self.inner.collections.write().drain().map(|(_, c)| c).collect();
        for collection in &collections {
            collection.close();
        }
        info!(collections = collections.len(), "permissions engine shut down");
    }
}

impl fmt::Debug for PermissionsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionsEngine")
            .field("types", &self.registered_types())
            .field("tick", &self.current_tick())
            .finish_non_exhaustive()
    }
}
