//! Shared test fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_data::{DataStore, ImmutableSubjectData, MemoryDataStore, StoreError};
use warden_runtime::PermissionsEngine;
use warden_types::{ContextSet, SubjectRef};

/// [`MemoryDataStore`] wrapper counting backend calls, with switchable
/// write failures and an optional load delay.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryDataStore,
    loads: AtomicUsize,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
    load_delay_ms: AtomicU64,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::backend("injected write failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataStore for CountingStore {
    async fn load(
        &self,
        subject_type: &str,
        identifier: &str,
    ) -> Result<ImmutableSubjectData, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.load(subject_type, identifier).await
    }

    async fn save(
        &self,
        subject_type: &str,
        identifier: &str,
        data: &ImmutableSubjectData,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(subject_type, identifier, data).await
    }

    async fn remove(&self, subject_type: &str, identifier: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.remove(subject_type, identifier).await
    }

    async fn is_registered(
        &self,
        subject_type: &str,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        self.inner.is_registered(subject_type, identifier).await
    }

    fn all_identifiers(
        &self,
        subject_type: &str,
    ) -> BoxStream<'static, Result<String, StoreError>> {
        self.inner.all_identifiers(subject_type)
    }
}

pub fn global() -> ContextSet {
    ContextSet::global()
}

pub fn user(id: &str) -> SubjectRef {
    SubjectRef::new("user", id)
}

pub fn group(id: &str) -> SubjectRef {
    SubjectRef::new("group", id)
}

/// Writes the persistent global segment of `subject`.
pub async fn set_global(
    engine: &PermissionsEngine,
    subject: &SubjectRef,
    f: impl FnOnce(warden_data::Segment) -> warden_data::Segment + Send,
) {
    engine
        .calculated(subject)
        .data()
        .update_segment(ContextSet::global(), f)
        .await
        .expect("write subject data");
}
