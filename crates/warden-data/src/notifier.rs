//! Permission check notification.
//!
//! Every public query on a calculated subject reports its outcome to a
//! [`PermissionCheckNotifier`]. Notifiers are purely observational: nothing
//! they do feeds back into resolution.

use crate::NodeTree;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use warden_types::{ContextSet, SubjectRef};

/// Sink for query outcomes (audit and debug tooling).
pub trait PermissionCheckNotifier: Send + Sync {
    /// A permission was resolved to `value` (`0` = undefined).
    fn permission_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        permission: &str,
        value: i32,
    );

    /// An option was resolved.
    fn option_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        option: &str,
        value: Option<&str>,
    );

    /// Direct parents were listed.
    fn parents_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parents: &[SubjectRef],
    );

    /// Every option visible to `subject` was listed.
    fn options_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        options: &BTreeMap<String, String>,
    ) {
        let _ = (subject, contexts, options);
    }

    /// The subject's own permission tree was read.
    fn permissions_checked(&self, subject: &SubjectRef, contexts: &ContextSet, tree: &NodeTree) {
        let _ = (subject, contexts, tree);
    }

    /// An inheritance walk starting at `subject` reached `repeated` a second
    /// time and skipped it.
    fn inheritance_cycle(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        repeated: &SubjectRef,
    ) {
        let _ = (subject, contexts, repeated);
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl PermissionCheckNotifier for NoopNotifier {
    fn permission_checked(&self, _: &SubjectRef, _: &ContextSet, _: &str, _: i32) {}

    fn option_checked(&self, _: &SubjectRef, _: &ContextSet, _: &str, _: Option<&str>) {}

    fn parents_checked(&self, _: &SubjectRef, _: &ContextSet, _: &[SubjectRef]) {}
}

/// Emits a `trace` event per notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl PermissionCheckNotifier for TracingNotifier {
    fn permission_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        permission: &str,
        value: i32,
    ) {
        tracing::trace!(%subject, %contexts, permission, value, "permission checked");
    }

    fn option_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        option: &str,
        value: Option<&str>,
    ) {
        tracing::trace!(%subject, %contexts, option, ?value, "option checked");
    }

    fn parents_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parents: &[SubjectRef],
    ) {
        tracing::trace!(%subject, %contexts, count = parents.len(), "parents checked");
    }

    fn options_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        options: &BTreeMap<String, String>,
    ) {
        tracing::trace!(%subject, %contexts, count = options.len(), "options checked");
    }

    fn permissions_checked(&self, subject: &SubjectRef, contexts: &ContextSet, tree: &NodeTree) {
        tracing::trace!(%subject, %contexts, empty = tree.is_empty(), "permissions checked");
    }

    fn inheritance_cycle(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        repeated: &SubjectRef,
    ) {
        tracing::debug!(%subject, %contexts, %repeated, "inheritance cycle skipped");
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckRecord {
    /// See [`PermissionCheckNotifier::permission_checked`].
    Permission {
        subject: SubjectRef,
        contexts: ContextSet,
        permission: String,
        value: i32,
    },
    /// See [`PermissionCheckNotifier::option_checked`].
    Option {
        subject: SubjectRef,
        contexts: ContextSet,
        option: String,
        value: Option<String>,
    },
    /// See [`PermissionCheckNotifier::parents_checked`].
    Parents {
        subject: SubjectRef,
        contexts: ContextSet,
        parents: Vec<SubjectRef>,
    },
    /// See [`PermissionCheckNotifier::options_checked`].
    Options {
        subject: SubjectRef,
        contexts: ContextSet,
        options: BTreeMap<String, String>,
    },
    /// See [`PermissionCheckNotifier::permissions_checked`]; the tree is
    /// flattened with [`NodeTree::as_map`].
    Permissions {
        subject: SubjectRef,
        contexts: ContextSet,
        permissions: BTreeMap<String, i32>,
    },
    /// See [`PermissionCheckNotifier::inheritance_cycle`].
    Cycle {
        subject: SubjectRef,
        contexts: ContextSet,
        repeated: SubjectRef,
    },
}

/// Keeps the most recent notifications in a bounded buffer.
#[derive(Debug)]
pub struct RecordingNotifier {
    capacity: usize,
    records: Mutex<VecDeque<CheckRecord>>,
}

impl RecordingNotifier {
    /// Creates a recorder keeping at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of the buffered records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<CheckRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Drains the buffer.
    pub fn take(&self) -> Vec<CheckRecord> {
        self.records.lock().drain(..).collect()
    }

    fn push(&self, record: CheckRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}

impl PermissionCheckNotifier for RecordingNotifier {
    fn permission_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        permission: &str,
        value: i32,
    ) {
        self.push(CheckRecord::Permission {
            subject: subject.clone(),
            contexts: contexts.clone(),
            permission: permission.to_string(),
            value,
        });
    }

    fn option_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        option: &str,
        value: Option<&str>,
    ) {
        self.push(CheckRecord::Option {
            subject: subject.clone(),
            contexts: contexts.clone(),
            option: option.to_string(),
            value: value.map(str::to_string),
        });
    }

    fn parents_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parents: &[SubjectRef],
    ) {
        self.push(CheckRecord::Parents {
            subject: subject.clone(),
            contexts: contexts.clone(),
            parents: parents.to_vec(),
        });
    }

    fn options_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        options: &BTreeMap<String, String>,
    ) {
        self.push(CheckRecord::Options {
            subject: subject.clone(),
            contexts: contexts.clone(),
            options: options.clone(),
        });
    }

    fn permissions_checked(&self, subject: &SubjectRef, contexts: &ContextSet, tree: &NodeTree) {
        self.push(CheckRecord::Permissions {
            subject: subject.clone(),
            contexts: contexts.clone(),
            permissions: tree.as_map(),
        });
    }

    fn inheritance_cycle(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        repeated: &SubjectRef,
    ) {
        self.push(CheckRecord::Cycle {
            subject: subject.clone(),
            contexts: contexts.clone(),
            repeated: repeated.clone(),
        });
    }
}

/// Forwards every notification to each registered notifier in order.
#[derive(Default, Clone)]
pub struct MultiplexingNotifier {
    targets: Vec<Arc<dyn PermissionCheckNotifier>>,
}

impl MultiplexingNotifier {
    /// Creates a multiplexer over `targets`.
    #[must_use]
    pub fn new(targets: Vec<Arc<dyn PermissionCheckNotifier>>) -> Self {
        Self { targets }
    }

    /// Adds a target.
    pub fn push(&mut self, target: Arc<dyn PermissionCheckNotifier>) {
        self.targets.push(target);
    }
}

impl std::fmt::Debug for MultiplexingNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexingNotifier")
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl PermissionCheckNotifier for MultiplexingNotifier {
    fn permission_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        permission: &str,
        value: i32,
    ) {
        for t in &self.targets {
            t.permission_checked(subject, contexts, permission, value);
        }
    }

    fn option_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        option: &str,
        value: Option<&str>,
    ) {
        for t in &self.targets {
            t.option_checked(subject, contexts, option, value);
        }
    }

    fn parents_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parents: &[SubjectRef],
    ) {
        for t in &self.targets {
            t.parents_checked(subject, contexts, parents);
        }
    }

    fn options_checked(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        options: &BTreeMap<String, String>,
    ) {
        for t in &self.targets {
            t.options_checked(subject, contexts, options);
        }
    }

    fn permissions_checked(&self, subject: &SubjectRef, contexts: &ContextSet, tree: &NodeTree) {
        for t in &self.targets {
            t.permissions_checked(subject, contexts, tree);
        }
    }

    fn inheritance_cycle(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        repeated: &SubjectRef,
    ) {
        for t in &self.targets {
            t.inheritance_cycle(subject, contexts, repeated);
        }
    }
}
