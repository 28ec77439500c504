//! Per-identifier listener registry.
//!
//! Each cache owns one registry. Handles are either strong (the registry
//! keeps the callback alive) or weak (the registry only observes it).
//! A weak listener whose last strong reference is gone stops being
//! notified and is pruned on the next dispatch.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use warden_data::ImmutableSubjectData;

/// Callback invoked with `(identifier, new data)` after a change is applied.
pub type DataListener = dyn Fn(&str, &ImmutableSubjectData) + Send + Sync;

/// Handle returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

/// How the registry holds a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenerMode {
    /// Kept alive until removed.
    #[default]
    Strong,
    /// Notified only while someone else holds the callback.
    Weak,
}

enum Handle {
    Strong(Arc<DataListener>),
    Weak(Weak<DataListener>),
}

impl Handle {
    fn upgrade(&self) -> Option<Arc<DataListener>> {
        match self {
            Self::Strong(l) => Some(Arc::clone(l)),
            Self::Weak(l) => l.upgrade(),
        }
    }
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Handle)>>>,
}

impl ListenerRegistry {
    pub(crate) fn add(
        &self,
        identifier: &str,
        listener: Arc<DataListener>,
        mode: ListenerMode,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = match mode {
            ListenerMode::Strong => Handle::Strong(listener),
            ListenerMode::Weak => Handle::Weak(Arc::downgrade(&listener)),
        };
        self.listeners
            .lock()
            .entry(identifier.to_string())
            .or_default()
            .push((id, handle));
        id
    }

    pub(crate) fn remove(&self, identifier: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(identifier) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(identifier);
        }
        removed
    }

    /// Live listeners for `identifier`; dead weak handles are dropped.
    pub(crate) fn live(&self, identifier: &str) -> Vec<Arc<DataListener>> {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(identifier) else {
            return Vec::new();
        };
        let mut live = Vec::with_capacity(list.len());
        list.retain(|(_, handle)| match handle.upgrade() {
            Some(l) => {
                live.push(l);
                true
            }
            None => false,
        });
        if list.is_empty() {
            listeners.remove(identifier);
        }
        live
    }

    pub(crate) fn count(&self, identifier: &str) -> usize {
        self.live(identifier).len()
    }

    pub(crate) fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("identifiers", &self.listeners.lock().len())
            .finish()
    }
}
