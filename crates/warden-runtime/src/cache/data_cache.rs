//! Per-type subject data cache.
//!
//! # Entry protocol
//!
//! ```text
//! entries: identifier ──► Entry { gate: async mutex, current: snapshot }
//!
//! data()    : snapshot hit ─► return
//!             miss ─► lock gate ─► re-check ─► store.load ─► publish
//! update()  : lock gate ─► load if absent ─► f(old) ─► store.save
//!             ─► publish ─► notify listeners ─► unlock
//! ```
//!
//! The gate serializes every load and write for one identifier, so
//! concurrent `data()` calls share a single backend load and concurrent
//! `update()` calls each observe the previous one. The snapshot is only
//! advanced after the store acknowledged the write; a failed save leaves
//! the cache untouched.
//!
//! An entry leaves the map when it is invalidated or its load failed, but
//! only if nobody else holds it at that moment. A task still waiting on
//! the gate keeps the entry alive, so a single gate guards each
//! identifier at any time.

use super::listener::{DataListener, ListenerId, ListenerMode, ListenerRegistry};
use crate::CacheError;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use warden_data::{DataStore, ImmutableSubjectData, StoreError};
use warden_types::SubjectKind;

/// Which of a subject's two data sources a cache serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// In-memory overlay, lost on restart.
    Transient,
    /// Backed by the engine's data store.
    Persistent,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

#[derive(Default)]
struct Entry {
    gate: tokio::sync::Mutex<()>,
    current: RwLock<Option<ImmutableSubjectData>>,
}

impl Entry {
    fn snapshot(&self) -> Option<ImmutableSubjectData> {
        self.current.read().clone()
    }

    fn publish(&self, data: ImmutableSubjectData) {
        *self.current.write() = Some(data);
    }
}

/// Cache of [`ImmutableSubjectData`] for one subject type and one tier.
///
/// Identifiers are expected in canonical (serialized) form; validation
/// happens when references are built, see
/// [`SubjectTypeCollection::reference_to`](crate::SubjectTypeCollection::reference_to).
pub struct SubjectDataCache {
    kind: Arc<dyn SubjectKind>,
    tier: Tier,
    store: Arc<dyn DataStore>,
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    listeners: ListenerRegistry,
    closed: AtomicBool,
}

impl SubjectDataCache {
    /// Creates a cache for `kind` backed by `store`.
    #[must_use]
    pub fn new(kind: Arc<dyn SubjectKind>, tier: Tier, store: Arc<dyn DataStore>) -> Self {
        Self {
            kind,
            tier,
            store,
            entries: Mutex::new(HashMap::new()),
            listeners: ListenerRegistry::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Subject type served by this cache.
    #[must_use]
    pub fn kind(&self) -> &Arc<dyn SubjectKind> {
        &self.kind
    }

    /// Tier served by this cache.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    fn type_name(&self) -> &str {
        self.kind.name()
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::illegal_state(format!(
                "{} cache for '{}' is closed",
                self.tier,
                self.type_name()
            )));
        }
        Ok(())
    }

    fn entry(&self, identifier: &str) -> Arc<Entry> {
        let mut entries = self.entries.lock();
        Arc::clone(entries.entry(identifier.to_string()).or_default())
    }

    /// Must be called with the entry's gate held.
    async fn load_locked(
        &self,
        identifier: &str,
        entry: &Entry,
    ) -> Result<ImmutableSubjectData, CacheError> {
        if let Some(data) = entry.snapshot() {
            return Ok(data);
        }
        debug!(
            subject_type = self.type_name(),
            identifier,
            tier = %self.tier,
            "loading subject data"
        );
        let data = self
            .store
            .load(self.type_name(), identifier)
            .await
            .map_err(|e| {
                warn!(
                    subject_type = self.type_name(),
                    identifier,
                    tier = %self.tier,
                    error = %e,
                    "load failed"
                );
                e
            })?;
        entry.publish(data.clone());
        Ok(data)
    }

    /// Drops `entry` from the map if the map and the caller hold the only
    /// references. Must be called with the entry's gate held.
    fn evict_if_idle(&self, identifier: &str, entry: &Arc<Entry>) -> bool {
        let mut entries = self.entries.lock();
        let idle = entries
            .get(identifier)
            .is_some_and(|held| Arc::ptr_eq(held, entry) && Arc::strong_count(entry) == 2);
        if idle {
            entries.remove(identifier);
        }
        idle
    }

    fn notify(&self, identifier: &str, data: &ImmutableSubjectData) {
        for listener in self.listeners.live(identifier) {
            listener(identifier, data);
        }
    }

    /// Current data for `identifier`, loading it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the load fails (nothing is cached)
    /// and [`CacheError::IllegalState`] once the cache is closed.
    pub async fn data(&self, identifier: &str) -> Result<ImmutableSubjectData, CacheError> {
        self.ensure_open()?;
        let entry = self.entry(identifier);
        if let Some(data) = entry.snapshot() {
            return Ok(data);
        }
        let _gate = entry.gate.lock().await;
        let result = self.load_locked(identifier, &entry).await;
        if result.is_err() {
            self.evict_if_idle(identifier, &entry);
        }
        result
    }

    /// [`data`](Self::data) plus a listener registration for the same
    /// identifier.
    ///
    /// # Errors
    ///
    /// As [`data`](Self::data). The listener is registered only on success.
    pub async fn data_with_listener(
        &self,
        identifier: &str,
        listener: Arc<DataListener>,
        mode: ListenerMode,
    ) -> Result<(ImmutableSubjectData, ListenerId), CacheError> {
        let data = self.data(identifier).await?;
        Ok((data, self.add_listener(identifier, listener, mode)))
    }

    /// Cached data without touching the store.
    #[must_use]
    pub fn cached(&self, identifier: &str) -> Option<ImmutableSubjectData> {
        self.entries
            .lock()
            .get(identifier)
            .and_then(|entry| entry.snapshot())
    }

    /// Atomically applies `f` to the current data, persists the result and
    /// notifies listeners.
    ///
    /// Updates to one identifier are serialized; `f` runs exactly once per
    /// call, against the result of the previous update.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if loading or saving fails. On a failed
    /// save the cached value and listeners are left untouched.
    pub async fn update<F>(
        &self,
        identifier: &str,
        f: F,
    ) -> Result<ImmutableSubjectData, CacheError>
    where
        F: FnOnce(ImmutableSubjectData) -> ImmutableSubjectData + Send,
    {
        self.ensure_open()?;
        let entry = self.entry(identifier);
        let _gate = entry.gate.lock().await;
        let old = self.load_locked(identifier, &entry).await?;
        let new = f(old);
        self.write_locked(identifier, &entry, new).await
    }

    /// Replaces the data for `identifier`; `None` removes it.
    ///
    /// Returns the new data (empty after a removal).
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update).
    pub async fn set(
        &self,
        identifier: &str,
        data: Option<ImmutableSubjectData>,
    ) -> Result<ImmutableSubjectData, CacheError> {
        match data {
            Some(data) => self.update(identifier, move |_| data).await,
            None => self.remove(identifier).await.map(|_| ImmutableSubjectData::new()),
        }
    }

    /// Deletes the stored data, returning what existed right before.
    ///
    /// Listeners receive empty data.
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update).
    pub async fn remove(&self, identifier: &str) -> Result<ImmutableSubjectData, CacheError> {
        self.ensure_open()?;
        let entry = self.entry(identifier);
        let _gate = entry.gate.lock().await;
        let previous = self.load_locked(identifier, &entry).await?;
        self.store
            .remove(self.type_name(), identifier)
            .await
            .map_err(|e| self.write_failed(identifier, e))?;
        let empty = ImmutableSubjectData::new();
        entry.publish(empty.clone());
        debug!(
            subject_type = self.type_name(),
            identifier,
            tier = %self.tier,
            "removed subject data"
        );
        self.notify(identifier, &empty);
        Ok(previous)
    }

    async fn write_locked(
        &self,
        identifier: &str,
        entry: &Entry,
        data: ImmutableSubjectData,
    ) -> Result<ImmutableSubjectData, CacheError> {
        self.store
            .save(self.type_name(), identifier, &data)
            .await
            .map_err(|e| self.write_failed(identifier, e))?;
        entry.publish(data.clone());
        debug!(
            subject_type = self.type_name(),
            identifier,
            tier = %self.tier,
            "updated subject data"
        );
        self.notify(identifier, &data);
        Ok(data)
    }

    fn write_failed(&self, identifier: &str, error: StoreError) -> CacheError {
        warn!(
            subject_type = self.type_name(),
            identifier,
            tier = %self.tier,
            error = %error,
            "write rejected by store, cache left unchanged"
        );
        error.into()
    }

    /// Drops the cached value; the next read reloads from the store.
    ///
    /// Waits for an in-flight load or write on the same identifier. The
    /// entry itself is released unless another task is using it.
    pub async fn invalidate(&self, identifier: &str) {
        let entry = self.entries.lock().get(identifier).cloned();
        if let Some(entry) = entry {
            let _gate = entry.gate.lock().await;
            *entry.current.write() = None;
            let evicted = self.evict_if_idle(identifier, &entry);
            debug!(
                subject_type = self.type_name(),
                identifier,
                tier = %self.tier,
                evicted,
                "invalidated"
            );
        }
    }

    /// `true` iff the backing store holds data for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the store cannot answer.
    pub async fn is_registered(&self, identifier: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        Ok(self.store.is_registered(self.type_name(), identifier).await?)
    }

    /// Every identifier with stored data.
    pub fn all_identifiers(&self) -> BoxStream<'static, Result<String, StoreError>> {
        if self.closed.load(Ordering::Acquire) {
            return stream::empty().boxed();
        }
        self.store.all_identifiers(self.type_name())
    }

    /// Identifiers currently holding a cached value.
    #[must_use]
    pub fn cached_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.current.read().is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of identifiers with an entry, cached value or not.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Registers `listener` for changes to `identifier`.
    pub fn add_listener(
        &self,
        identifier: &str,
        listener: Arc<DataListener>,
        mode: ListenerMode,
    ) -> ListenerId {
        self.listeners.add(identifier, listener, mode)
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, identifier: &str, id: ListenerId) -> bool {
        self.listeners.remove(identifier, id)
    }

    /// Number of live listeners for `identifier`.
    #[must_use]
    pub fn listener_count(&self, identifier: &str) -> usize {
        self.listeners.count(identifier)
    }

    /// Closes the cache: drops every entry and listener. Later reads and
    /// writes fail with [`CacheError::IllegalState`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.entries.lock().clear();
        self.listeners.clear();
        debug!(subject_type = self.type_name(), tier = %self.tier, "cache closed");
    }

    /// `true` after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SubjectDataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectDataCache")
            .field("subject_type", &self.type_name())
            .field("tier", &self.tier)
            .field("entries", &self.entries.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
