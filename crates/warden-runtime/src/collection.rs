//! Subject type collections.
//!
//! A [`SubjectTypeCollection`] groups everything the engine keeps for one
//! subject type:
//!
//! ```text
//! SubjectTypeCollection("user")
//! ├── kind        : Arc<dyn SubjectKind>
//! ├── transient   : SubjectDataCache ─► engine's in-memory store
//! ├── persistent  : SubjectDataCache ─► engine's DataStore
//! └── subjects    : identifier ─► Arc<CalculatedSubject>
//! ```
//!
//! `subjects` only holds subjects that were asked for by identifier
//! ([`SubjectTypeCollection::subject`] and [`SubjectTypeCollection::get`]);
//! they stay until [`SubjectTypeCollection::uncache`]. Inheritance walks
//! read ancestors straight from the caches.

use crate::cache::{ListenerMode, SubjectDataCache, Tier};
use crate::engine::EngineInner;
use crate::subject::{load_tiers, Baked, CalculatedSubject};
use crate::CacheError;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;
use warden_data::{DataStore, PermissionCheckNotifier, StoreError};
use warden_types::{ContextSet, InvalidIdentifier, SubjectKind, SubjectRef};

/// Caches and live subjects of one subject type.
pub struct SubjectTypeCollection {
    kind: Arc<dyn SubjectKind>,
    transient: Arc<SubjectDataCache>,
    persistent: Arc<SubjectDataCache>,
    subjects: Mutex<HashMap<String, Arc<CalculatedSubject>>>,
    engine: Weak<EngineInner>,
    notifier: Arc<dyn PermissionCheckNotifier>,
    listener_mode: ListenerMode,
}

impl SubjectTypeCollection {
    pub(crate) fn new(
        kind: Arc<dyn SubjectKind>,
        transient_store: Arc<dyn DataStore>,
        persistent_store: Arc<dyn DataStore>,
        engine: Weak<EngineInner>,
        notifier: Arc<dyn PermissionCheckNotifier>,
        listener_mode: ListenerMode,
    ) -> Self {
        Self {
            transient: Arc::new(SubjectDataCache::new(
                Arc::clone(&kind),
                Tier::Transient,
                transient_store,
            )),
            persistent: Arc::new(SubjectDataCache::new(
                Arc::clone(&kind),
                Tier::Persistent,
                persistent_store,
            )),
            kind,
            subjects: Mutex::new(HashMap::new()),
            engine,
            notifier,
            listener_mode,
        }
    }

    /// Subject type of this collection.
    #[must_use]
    pub fn subject_type(&self) -> &Arc<dyn SubjectKind> {
        &self.kind
    }

    /// Subject type name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Persistent tier cache.
    #[must_use]
    pub fn persistent(&self) -> &Arc<SubjectDataCache> {
        &self.persistent
    }

    /// Transient tier cache.
    #[must_use]
    pub fn transient(&self) -> &Arc<SubjectDataCache> {
        &self.transient
    }

    /// Parses `raw` into a reference with a canonical identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] when `raw` does not parse.
    pub fn reference_to(&self, raw: &str) -> Result<SubjectRef, InvalidIdentifier> {
        let identifier = self.kind.normalize_identifier(raw)?;
        Ok(SubjectRef::new(self.name(), identifier))
    }

    /// Like [`reference_to`](Self::reference_to) but falls back to the
    /// type's friendly-name resolver.
    #[must_use]
    pub fn coerce_reference(&self, raw: &str) -> Option<SubjectRef> {
        self.kind
            .coerce_identifier(raw)
            .map(|identifier| SubjectRef::new(self.name(), identifier))
    }

    /// Live calculated subject for a canonical identifier, created on first
    /// use. Does not touch the stores.
    #[must_use]
    pub fn subject(&self, identifier: &str) -> Arc<CalculatedSubject> {
        let mut subjects = self.subjects.lock();
        if let Some(existing) = subjects.get(identifier) {
            return Arc::clone(existing);
        }
        let subject = CalculatedSubject::new(
            SubjectRef::new(self.name(), identifier),
            Arc::clone(&self.kind),
            Arc::clone(&self.transient),
            Arc::clone(&self.persistent),
            self.engine.clone(),
            Arc::clone(&self.notifier),
            self.listener_mode,
        );
        subjects.insert(identifier.to_string(), Arc::clone(&subject));
        subject
    }

    /// Live calculated subject for `identifier`, if one is held.
    pub(crate) fn live(&self, identifier: &str) -> Option<Arc<CalculatedSubject>> {
        self.subjects.lock().get(identifier).cloned()
    }

    /// Uncached baked view of `identifier` alone.
    pub(crate) async fn bake(&self, identifier: &str, contexts: &ContextSet) -> Arc<Baked> {
        let subject = SubjectRef::new(self.name(), identifier);
        let (transient, persistent, _) =
            load_tiers(&subject, &self.transient, &self.persistent).await;
        Arc::new(Baked::from_tiers(
            &transient,
            &persistent,
            contexts,
            self.kind.transient_has_priority(),
        ))
    }

    /// Validates `raw`, then returns its calculated subject with both tiers
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidIdentifier`] before any I/O when `raw`
    /// does not parse, and [`CacheError::Store`] when a tier cannot be
    /// loaded.
    pub async fn get(&self, raw: &str) -> Result<Arc<CalculatedSubject>, CacheError> {
        let reference = self.reference_to(raw)?;
        let identifier = reference.identifier();
        let (transient, persistent) = futures::join!(
            self.transient.data(identifier),
            self.persistent.data(identifier)
        );
        transient?;
        persistent?;
        Ok(self.subject(identifier))
    }

    /// Drops the calculated subject and both cached tiers for `identifier`.
    pub async fn uncache(&self, identifier: &str) {
        let removed = self.subjects.lock().remove(identifier);
        futures::join!(
            self.transient.invalidate(identifier),
            self.persistent.invalidate(identifier)
        );
        debug!(
            subject_type = self.name(),
            identifier,
            live = removed.is_some(),
            "uncached subject"
        );
    }

    /// `true` iff either tier's store holds data for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if a store cannot answer.
    pub async fn is_registered(&self, identifier: &str) -> Result<bool, CacheError> {
        if self.transient.is_registered(identifier).await? {
            return Ok(true);
        }
        self.persistent.is_registered(identifier).await
    }

    /// Every identifier with data in either tier, persistent first, without
    /// duplicates.
    pub fn all_identifiers(&self) -> BoxStream<'static, Result<String, StoreError>> {
        let mut seen = HashSet::new();
        self.persistent
            .all_identifiers()
            .chain(self.transient.all_identifiers())
            .filter(move |item| {
                let keep = match item {
                    Ok(id) => seen.insert(id.clone()),
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed()
    }

    /// Calculated subjects currently held, ordered by identifier.
    #[must_use]
    pub fn active_subjects(&self) -> Vec<Arc<CalculatedSubject>> {
        let mut subjects: Vec<Arc<CalculatedSubject>> =
            self.subjects.lock().values().cloned().collect();
        subjects.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        subjects
    }

    pub(crate) fn close(&self) {
        self.subjects.lock().clear();
        self.transient.close();
        self.persistent.close();
    }
}

impl fmt::Debug for SubjectTypeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectTypeCollection")
            .field("name", &self.name())
            .field("subjects", &self.subjects.lock().len())
            .field("listener_mode", &self.listener_mode)
            .finish_non_exhaustive()
    }
}
