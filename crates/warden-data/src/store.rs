//! Backing storage abstraction.
//!
//! The [`DataStore`] trait is the boundary to storage backends. Caches own
//! an `Arc<dyn DataStore>` and never assume a serialization format; they
//! only require read-your-writes consistency per identifier.
//!
//! [`MemoryDataStore`] keeps everything in process memory. It backs the
//! transient tier and doubles as a test backend.

use crate::ImmutableSubjectData;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use warden_types::ErrorCode;

/// Errors reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The backend is temporarily unreachable.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND",
            Self::Unavailable(_) => "STORE_UNAVAILABLE",
            Self::Serialization(_) => "STORE_SERIALIZATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Durable storage for subject data.
///
/// Implementations must be thread-safe; every method may be called
/// concurrently from any task.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Loads a subject's data. Unknown subjects yield empty data.
    async fn load(
        &self,
        subject_type: &str,
        identifier: &str,
    ) -> Result<ImmutableSubjectData, StoreError>;

    /// Replaces a subject's data.
    async fn save(
        &self,
        subject_type: &str,
        identifier: &str,
        data: &ImmutableSubjectData,
    ) -> Result<(), StoreError>;

    /// Deletes a subject's data. Removing an unknown subject is not an error.
    async fn remove(&self, subject_type: &str, identifier: &str) -> Result<(), StoreError>;

    /// `true` iff the store holds any data for the subject.
    async fn is_registered(&self, subject_type: &str, identifier: &str)
        -> Result<bool, StoreError>;

    /// Every identifier of `subject_type` with stored data.
    fn all_identifiers(&self, subject_type: &str) -> BoxStream<'static, Result<String, StoreError>>;
}

/// In-memory [`DataStore`].
///
/// Empty data is never kept: saving empty data removes the entry, so
/// `is_registered` means "has data".
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    entries: RwLock<HashMap<(String, String), ImmutableSubjectData>>,
}

impl MemoryDataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subjects with data, across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn key(subject_type: &str, identifier: &str) -> (String, String) {
        (subject_type.to_string(), identifier.to_string())
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn load(
        &self,
        subject_type: &str,
        identifier: &str,
    ) -> Result<ImmutableSubjectData, StoreError> {
        Ok(self
            .entries
            .read()
            .get(&Self::key(subject_type, identifier))
            .cloned()
            .unwrap_or_default())
    }

    async fn save(
        &self,
        subject_type: &str,
        identifier: &str,
        data: &ImmutableSubjectData,
    ) -> Result<(), StoreError> {
        let key = Self::key(subject_type, identifier);
        let mut entries = self.entries.write();
        if data.is_empty() {
            entries.remove(&key);
        } else {
            entries.insert(key, data.clone());
        }
        Ok(())
    }

    async fn remove(&self, subject_type: &str, identifier: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .remove(&Self::key(subject_type, identifier));
        Ok(())
    }

    async fn is_registered(
        &self,
        subject_type: &str,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .read()
            .contains_key(&Self::key(subject_type, identifier)))
    }

    fn all_identifiers(
        &self,
        subject_type: &str,
    ) -> BoxStream<'static, Result<String, StoreError>> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|(ty, _)| ty == subject_type)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        stream::iter(ids.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use warden_types::{assert_error_codes, ContextSet};

    fn sample() -> ImmutableSubjectData {
        ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_permission("a", 1))
    }

    #[tokio::test]
    async fn unknown_subject_loads_empty() {
        let store = MemoryDataStore::new();
        let data = store.load("user", "nobody").await.expect("load never fails");
        assert!(data.is_empty());
        assert!(!store.is_registered("user", "nobody").await.expect("query"));
    }

    #[tokio::test]
    async fn save_load_remove() {
        let store = MemoryDataStore::new();
        store.save("user", "a", &sample()).await.expect("save");
        assert_eq!(store.load("user", "a").await.expect("load"), sample());
        assert!(store.is_registered("user", "a").await.expect("query"));
        assert!(!store.is_registered("group", "a").await.expect("query"));

        store.remove("user", "a").await.expect("remove");
        assert!(store.is_empty());
        store.remove("user", "a").await.expect("second remove is a no-op");
    }

    #[tokio::test]
    async fn saving_empty_data_unregisters() {
        let store = MemoryDataStore::new();
        store.save("user", "a", &sample()).await.expect("save");
        store
            .save("user", "a", &ImmutableSubjectData::new())
            .await
            .expect("save empty");
        assert!(!store.is_registered("user", "a").await.expect("query"));
    }

    #[tokio::test]
    async fn all_identifiers_filters_by_type() {
        let store = MemoryDataStore::new();
        store.save("user", "b", &sample()).await.expect("save");
        store.save("user", "a", &sample()).await.expect("save");
        store.save("group", "g", &sample()).await.expect("save");

        let users: Vec<String> = store
            .all_identifiers("user")
            .try_collect()
            .await
            .expect("stream");
        assert_eq!(users, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn error_codes() {
        assert_error_codes(
            &[StoreError::backend("x"), StoreError::unavailable("y")],
            "STORE_",
        );
        assert!(StoreError::unavailable("y").is_recoverable());
        assert!(!StoreError::backend("x").is_recoverable());
    }
}
