//! Write access to one tier of one subject's data.

use crate::{CacheError, SubjectDataCache, Tier};
use std::sync::Arc;
use warden_data::{ImmutableSubjectData, Segment};
use warden_types::ContextSet;

/// Routes reads and writes for one subject through one tier's cache.
///
/// Cheap to clone. Writes go through [`SubjectDataCache`], so they are
/// serialized per subject and fire listeners.
#[derive(Debug, Clone)]
pub struct SubjectDataHandle {
    cache: Arc<SubjectDataCache>,
    identifier: Arc<str>,
}

impl SubjectDataHandle {
    pub(crate) fn new(cache: Arc<SubjectDataCache>, identifier: Arc<str>) -> Self {
        Self { cache, identifier }
    }

    /// Tier this handle writes to.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.cache.tier()
    }

    /// Subject identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Current data.
    ///
    /// # Errors
    ///
    /// See [`SubjectDataCache::data`].
    pub async fn get(&self) -> Result<ImmutableSubjectData, CacheError> {
        self.cache.data(&self.identifier).await
    }

    /// Applies `f` to the whole data object.
    ///
    /// # Errors
    ///
    /// See [`SubjectDataCache::update`].
    pub async fn update<F>(&self, f: F) -> Result<ImmutableSubjectData, CacheError>
    where
        F: FnOnce(ImmutableSubjectData) -> ImmutableSubjectData + Send,
    {
        self.cache.update(&self.identifier, f).await
    }

    /// Applies `f` to the segment stored under exactly `contexts`.
    ///
    /// # Errors
    ///
    /// See [`SubjectDataCache::update`].
    pub async fn update_segment<F>(
        &self,
        contexts: ContextSet,
        f: F,
    ) -> Result<ImmutableSubjectData, CacheError>
    where
        F: FnOnce(Segment) -> Segment + Send,
    {
        self.cache
            .update(&self.identifier, move |data| data.with_segment(contexts, f))
            .await
    }

    /// Replaces the data; `None` removes it.
    ///
    /// # Errors
    ///
    /// See [`SubjectDataCache::set`].
    pub async fn set(
        &self,
        data: Option<ImmutableSubjectData>,
    ) -> Result<ImmutableSubjectData, CacheError> {
        self.cache.set(&self.identifier, data).await
    }

    /// Deletes the data, returning what was there.
    ///
    /// # Errors
    ///
    /// See [`SubjectDataCache::remove`].
    pub async fn remove(&self) -> Result<ImmutableSubjectData, CacheError> {
        self.cache.remove(&self.identifier).await
    }

    /// `true` iff the tier's store holds data for this subject.
    ///
    /// # Errors
    ///
    /// See [`SubjectDataCache::is_registered`].
    pub async fn is_registered(&self) -> Result<bool, CacheError> {
        self.cache.is_registered(&self.identifier).await
    }
}
