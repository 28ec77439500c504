//! Calculated subjects: contextual resolution over both tiers and the
//! inheritance graph.
//!
//! # Resolution walk
//!
//! ```text
//! permission(C, name):
//!   self      : tree(name) ─► fallback ─┐ non-zero ─► return
//!   parents   : depth-first, list order  │  (same C, same probe)
//!   defaults  : defaults:<type>, defaults:<fallback id>
//!   otherwise : 0
//! ```
//!
//! The walk is iterative with an explicit stack. A subject already on the
//! current path is a cycle: it is skipped, logged at `debug` and reported
//! through [`PermissionCheckNotifier::inheritance_cycle`]. A subject reached
//! a second time through another branch (diamond) is skipped silently.
//! Visited state lives in the call and is never shared between queries.
//! Ancestors are baked through their collection's caches; the walk never
//! creates calculated subjects for them.
//!
//! Queries never fail. A tier that cannot be loaded is logged at `warn`
//! and treated as empty for that query only.

use super::handle::SubjectDataHandle;
use super::resolve::Baked;
use crate::cache::{DataListener, ListenerId, ListenerMode, SubjectDataCache, Tier};
use crate::engine::EngineInner;
use crate::CacheError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use warden_data::{ImmutableSubjectData, NodeTree, PermissionCheckNotifier};
use warden_types::{AssociatedObject, ContextSet, SubjectKind, SubjectRef};

/// Callback invoked with the subject after either tier changed.
pub type SubjectListener = dyn Fn(&Arc<CalculatedSubject>) + Send + Sync;

/// Baked views kept per subject before the map is cleared.
const BAKED_CAPACITY: usize = 64;

/// Loads both tiers of `subject`; an unreadable tier is logged and
/// replaced by empty data. The flag is `false` when either tier failed.
pub(crate) async fn load_tiers(
    subject: &SubjectRef,
    transient: &SubjectDataCache,
    persistent: &SubjectDataCache,
) -> (ImmutableSubjectData, ImmutableSubjectData, bool) {
    let id = subject.identifier();
    let (t, p) = futures::join!(transient.data(id), persistent.data(id));
    let (t, t_ok) = tier_or_empty(subject, Tier::Transient, t);
    let (p, p_ok) = tier_or_empty(subject, Tier::Persistent, p);
    (t, p, t_ok && p_ok)
}

fn tier_or_empty(
    subject: &SubjectRef,
    tier: Tier,
    result: Result<ImmutableSubjectData, CacheError>,
) -> (ImmutableSubjectData, bool) {
    match result {
        Ok(data) => (data, true),
        Err(e) => {
            warn!(
                subject = %subject,
                %tier,
                error = %e,
                "treating unreadable tier as empty"
            );
            (ImmutableSubjectData::new(), false)
        }
    }
}

/// Live, queryable composition of one subject's transient and persistent
/// data, its inheritance and its active contexts.
///
/// Obtained from [`SubjectTypeCollection::subject`](crate::SubjectTypeCollection::subject)
/// or [`PermissionsEngine::calculated`](crate::PermissionsEngine::calculated).
pub struct CalculatedSubject {
    subject: SubjectRef,
    kind: Arc<dyn SubjectKind>,
    transient: Arc<SubjectDataCache>,
    persistent: Arc<SubjectDataCache>,
    engine: Weak<EngineInner>,
    notifier: Arc<dyn PermissionCheckNotifier>,
    /// Baked views per query context set; cleared on every data change
    /// and when full.
    baked: Mutex<HashMap<ContextSet, Arc<Baked>>>,
    generation: AtomicU64,
    active: Mutex<Option<(u64, ContextSet)>>,
    on_change: Arc<DataListener>,
    registrations: Mutex<Vec<(Tier, ListenerId)>>,
    listeners: Mutex<Vec<(u64, Arc<SubjectListener>)>>,
    next_listener: AtomicU64,
}

impl CalculatedSubject {
    pub(crate) fn new(
        subject: SubjectRef,
        kind: Arc<dyn SubjectKind>,
        transient: Arc<SubjectDataCache>,
        persistent: Arc<SubjectDataCache>,
        engine: Weak<EngineInner>,
        notifier: Arc<dyn PermissionCheckNotifier>,
        mode: ListenerMode,
    ) -> Arc<Self> {
        let this = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let on_change: Arc<DataListener> = Arc::new(move |_, _| {
                if let Some(subject) = weak.upgrade() {
                    subject.data_changed();
                }
            });
            Self {
                subject,
                kind,
                transient,
                persistent,
                engine,
                notifier,
                baked: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
                on_change,
                registrations: Mutex::new(Vec::with_capacity(2)),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }
        });

        let identifier = this.subject.identifier();
        let registrations = vec![
            (
                Tier::Transient,
                this.transient
                    .add_listener(identifier, Arc::clone(&this.on_change), mode),
            ),
            (
                Tier::Persistent,
                this.persistent
                    .add_listener(identifier, Arc::clone(&this.on_change), mode),
            ),
        ];
        *this.registrations.lock() = registrations;
        this
    }

    /// Reference to this subject.
    #[must_use]
    pub fn subject(&self) -> &SubjectRef {
        &self.subject
    }

    /// Canonical identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.subject.identifier()
    }

    /// Subject type.
    #[must_use]
    pub fn kind(&self) -> &Arc<dyn SubjectKind> {
        &self.kind
    }

    /// Host object associated with this subject, if any.
    #[must_use]
    pub fn associated_object(&self) -> Option<AssociatedObject> {
        self.kind.associated_object(self.identifier())
    }

    /// Handle for the persistent tier.
    #[must_use]
    pub fn data(&self) -> SubjectDataHandle {
        SubjectDataHandle::new(Arc::clone(&self.persistent), self.subject.identifier().into())
    }

    /// Handle for the transient tier.
    #[must_use]
    pub fn transient_data(&self) -> SubjectDataHandle {
        SubjectDataHandle::new(Arc::clone(&self.transient), self.subject.identifier().into())
    }

    // === Listeners ===

    /// Registers `listener`, called after either tier changes.
    pub fn add_listener(&self, listener: Arc<SubjectListener>) -> ListenerId {
        let raw = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((raw, listener));
        ListenerId::from_raw(raw)
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(raw, _)| *raw != id.raw());
        listeners.len() != before
    }

    fn data_changed(self: Arc<Self>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.baked.lock().clear();
        debug!(subject = %self.subject, "subject data changed");

        let listeners: Vec<Arc<SubjectListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&self);
        }
    }

    // === Contexts ===

    /// Contexts currently applying to this subject.
    ///
    /// Computed by the engine's context calculators at most once per clock
    /// tick; see [`PermissionsEngine::tick`](crate::PermissionsEngine::tick).
    #[must_use]
    pub fn active_contexts(&self) -> ContextSet {
        let Some(engine) = self.engine.upgrade() else {
            return ContextSet::global();
        };
        let tick = engine.clock().current();
        if let Some((at, contexts)) = self.active.lock().as_ref() {
            if *at == tick {
                return contexts.clone();
            }
        }
        let contexts = engine.accumulate_contexts(&self.subject);
        *self.active.lock() = Some((tick, contexts.clone()));
        contexts
    }

    /// Every context key used by any stored segment of this subject, its
    /// ancestors (through any context) and its default subjects.
    pub async fn used_context_values(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        let (transient, persistent) = self.raw_tiers().await;
        keys.extend(transient.context_keys());
        keys.extend(persistent.context_keys());

        let Some(engine) = self.engine.upgrade() else {
            return keys;
        };
        let mut visited: HashSet<SubjectRef> = HashSet::from([self.subject.clone()]);
        let mut pending: Vec<SubjectRef> = transient.all_parents();
        pending.extend(persistent.all_parents());
        pending.extend(engine.defaults_for(&self.subject));

        while let Some(next) = pending.pop() {
            if !visited.insert(next.clone()) {
                continue;
            }
            let (transient, persistent) = engine.raw_tiers(&next).await;
            keys.extend(transient.context_keys());
            keys.extend(persistent.context_keys());
            pending.extend(transient.all_parents());
            pending.extend(persistent.all_parents());
        }
        keys
    }

    // === Queries ===

    /// Signed permission value under `contexts`; `0` means undefined.
    pub async fn permission(&self, contexts: &ContextSet, permission: &str) -> i32 {
        let value = self
            .walk(contexts, |baked| match baked.permission(permission) {
                0 => None,
                value => Some(value),
            })
            .await
            .unwrap_or(0);
        self.notifier
            .permission_checked(&self.subject, contexts, permission, value);
        value
    }

    /// Boolean view of [`permission`](Self::permission); undefined maps to
    /// the subject type's undefined permission value.
    pub async fn has_permission(&self, contexts: &ContextSet, permission: &str) -> bool {
        match self.permission(contexts, permission).await {
            0 => self.kind.undefined_permission_value(self.identifier()),
            value => value > 0,
        }
    }

    /// Option value under `contexts`, inherited if not set here.
    pub async fn option(&self, contexts: &ContextSet, key: &str) -> Option<String> {
        let value = self
            .walk(contexts, |baked| baked.option(key).map(str::to_string))
            .await;
        self.notifier
            .option_checked(&self.subject, contexts, key, value.as_deref());
        value
    }

    /// All options under `contexts`; inherited entries fill in beneath this
    /// subject's own, nearer ancestors first.
    pub async fn options(&self, contexts: &ContextSet) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        self.walk(contexts, |baked| {
            for (k, v) in baked.segment().options() {
                options.entry(k.clone()).or_insert_with(|| v.clone());
            }
            None::<()>
        })
        .await;
        self.notifier
            .options_checked(&self.subject, contexts, &options);
        options
    }

    /// This subject's own permission tree under `contexts` (both tiers,
    /// no inheritance).
    pub async fn permissions(&self, contexts: &ContextSet) -> NodeTree {
        let tree = self.baked(contexts).await.tree().clone();
        self.notifier
            .permissions_checked(&self.subject, contexts, &tree);
        tree
    }

    /// Direct parents under `contexts`, primary tier first.
    pub async fn parents(&self, contexts: &ContextSet) -> Vec<SubjectRef> {
        let parents = self.baked(contexts).await.parents().to_vec();
        self.notifier
            .parents_checked(&self.subject, contexts, &parents);
        parents
    }

    /// [`permission`](Self::permission) under the active contexts.
    pub async fn permission_active(&self, permission: &str) -> i32 {
        self.permission(&self.active_contexts(), permission).await
    }

    /// [`has_permission`](Self::has_permission) under the active contexts.
    pub async fn has_permission_active(&self, permission: &str) -> bool {
        self.has_permission(&self.active_contexts(), permission)
            .await
    }

    /// [`option`](Self::option) under the active contexts.
    pub async fn option_active(&self, key: &str) -> Option<String> {
        self.option(&self.active_contexts(), key).await
    }

    /// [`parents`](Self::parents) under the active contexts.
    pub async fn parents_active(&self) -> Vec<SubjectRef> {
        self.parents(&self.active_contexts()).await
    }

    // === Internals ===

    async fn load_tiers(&self) -> (ImmutableSubjectData, ImmutableSubjectData, bool) {
        load_tiers(&self.subject, &self.transient, &self.persistent).await
    }

    async fn raw_tiers(&self) -> (ImmutableSubjectData, ImmutableSubjectData) {
        let (transient, persistent, _) = self.load_tiers().await;
        (transient, persistent)
    }

    /// Effective view of this subject alone under `contexts`.
    pub(crate) async fn baked(&self, contexts: &ContextSet) -> Arc<Baked> {
        let hit = self.baked.lock().get(contexts).cloned();
        if let Some(baked) = hit {
            return baked;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let (transient, persistent, complete) = self.load_tiers().await;

        let baked = Arc::new(Baked::from_tiers(
            &transient,
            &persistent,
            contexts,
            self.kind.transient_has_priority(),
        ));
        if complete {
            let mut cache = self.baked.lock();
            if self.generation.load(Ordering::Acquire) == generation {
                if cache.len() >= BAKED_CAPACITY {
                    cache.clear();
                }
                cache.insert(contexts.clone(), Arc::clone(&baked));
            }
        }
        baked
    }

    /// Depth-first inheritance walk; returns the first `Some` from `probe`.
    async fn walk<T, P>(&self, contexts: &ContextSet, mut probe: P) -> Option<T>
    where
        P: FnMut(&Baked) -> Option<T> + Send,
        T: Send,
    {
        let own = self.baked(contexts).await;
        if let Some(found) = probe(&own) {
            return Some(found);
        }
        let engine = self.engine.upgrade()?;

        let mut path: Vec<SubjectRef> = vec![self.subject.clone()];
        let mut visited: HashSet<SubjectRef> = HashSet::from([self.subject.clone()]);
        let mut stack: Vec<(SubjectRef, usize)> = Vec::new();
        stack.extend(
            engine
                .defaults_for(&self.subject)
                .into_iter()
                .rev()
                .map(|d| (d, 1)),
        );
        stack.extend(own.parents().iter().rev().map(|p| (p.clone(), 1)));

        while let Some((next, depth)) = stack.pop() {
            path.truncate(depth);
            if path.contains(&next) {
                debug!(
                    subject = %self.subject,
                    %contexts,
                    repeated = %next,
                    "inheritance cycle skipped"
                );
                self.notifier
                    .inheritance_cycle(&self.subject, contexts, &next);
                continue;
            }
            if !visited.insert(next.clone()) {
                continue;
            }

            let baked = engine.baked(&next, contexts).await;
            if let Some(found) = probe(&baked) {
                return Some(found);
            }
            stack.extend(baked.parents().iter().rev().map(|p| (p.clone(), depth + 1)));
            path.push(next);
        }
        None
    }

    fn unregister(&self) {
        let identifier = self.subject.identifier();
        for (tier, id) in self.registrations.lock().drain(..) {
            match tier {
                Tier::Transient => self.transient.remove_listener(identifier, id),
                Tier::Persistent => self.persistent.remove_listener(identifier, id),
            };
        }
    }
}

impl Drop for CalculatedSubject {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl fmt::Debug for CalculatedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedSubject")
            .field("subject", &self.subject)
            .field("baked", &self.baked.lock().len())
            .field("listeners", &self.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PermissionsEngine;
    use warden_data::MemoryDataStore;
    use warden_types::ContextValue;

    #[tokio::test]
    async fn baked_views_stay_bounded() {
        let engine = PermissionsEngine::new(Arc::new(MemoryDataStore::new()));
        let alice = engine.calculated(&SubjectRef::new("user", "alice"));

        for i in 0..(BAKED_CAPACITY * 3) {
            let contexts = ContextSet::global().with(ContextValue::new("world", i.to_string()));
            assert_eq!(alice.permission(&contexts, "p").await, 0);
            assert!(alice.baked.lock().len() <= BAKED_CAPACITY);
        }
        assert!(!alice.baked.lock().is_empty());
    }

    #[tokio::test]
    async fn walk_does_not_create_ancestor_subjects() {
        let engine = PermissionsEngine::new(Arc::new(MemoryDataStore::new()));
        let group = SubjectRef::new("group", "g");
        let alice = engine.calculated(&SubjectRef::new("user", "alice"));
        alice
            .data()
            .update_segment(ContextSet::global(), |s| s.with_parents(vec![group.clone()]))
            .await
            .expect("write parent");
        engine
            .subjects("group")
            .persistent()
            .update("g", |d| {
                d.with_segment(ContextSet::global(), |s| s.with_permission("p", 1))
            })
            .await
            .expect("write group");

        assert_eq!(alice.permission(&ContextSet::global(), "p").await, 1);
        assert!(engine.subjects("group").active_subjects().is_empty());

        // a live ancestor's cached view is reused and stays current
        let live = engine.calculated(&group);
        assert_eq!(alice.permission(&ContextSet::global(), "p").await, 1);
        live.data()
            .update_segment(ContextSet::global(), |s| s.with_permission("p", -1))
            .await
            .expect("update group");
        assert_eq!(alice.permission(&ContextSet::global(), "p").await, -1);
    }
}
