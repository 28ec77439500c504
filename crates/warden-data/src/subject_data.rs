//! Immutable subject data: one data source's complete view of one subject.
//!
//! Data is keyed by *exact* context sets. Looking up a context set that has
//! no entry yields the empty segment; matching the stored keys against an
//! active context set is the calculated subject's job.
//!
//! # Empty segments
//!
//! Every write prunes segments that end up empty, including segments
//! produced by [`ImmutableSubjectData::with_segments`]. An absent key and an
//! empty segment are therefore indistinguishable, and
//! [`ImmutableSubjectData::active_contexts`] only reports context sets that
//! hold data.

use crate::Segment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use warden_types::{ContextSet, SubjectRef};

/// Immutable mapping from context set to [`Segment`].
///
/// Clones share storage. Every write returns a new instance with fresh
/// storage; the receiver is never modified.
///
/// # Example
///
/// ```
/// use warden_data::ImmutableSubjectData;
/// use warden_types::ContextSet;
///
/// let nether = ContextSet::of([("world", "nether")]);
/// let data = ImmutableSubjectData::new()
///     .with_segment(ContextSet::global(), |s| s.with_permission("build", 1))
///     .with_segment(nether.clone(), |s| s.with_permission("build", -1));
///
/// assert_eq!(data.segment(&ContextSet::global()).permission("build"), 1);
/// assert_eq!(data.segment(&nether).permission("build"), -1);
/// assert!(data.segment(&ContextSet::of([("world", "end")])).is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SegmentEntry>", into = "Vec<SegmentEntry>")]
pub struct ImmutableSubjectData {
    segments: Arc<BTreeMap<ContextSet, Segment>>,
}

/// Serialized form of one stored segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// Exact context set the segment is stored under.
    pub contexts: ContextSet,
    /// The stored data.
    pub segment: Segment,
}

impl ImmutableSubjectData {
    /// Data with no segments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds data from `(contexts, segment)` pairs; empty segments are
    /// dropped and later duplicates win.
    #[must_use]
    pub fn from_segments(segments: impl IntoIterator<Item = (ContextSet, Segment)>) -> Self {
        Self {
            segments: Arc::new(
                segments
                    .into_iter()
                    .filter(|(_, s)| !s.is_empty())
                    .collect(),
            ),
        }
    }

    /// `true` when no segment holds data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment stored under exactly `contexts`, or the empty segment.
    #[must_use]
    pub fn segment(&self, contexts: &ContextSet) -> Segment {
        self.segments.get(contexts).cloned().unwrap_or_default()
    }

    /// Borrowing variant of [`segment`](Self::segment).
    #[must_use]
    pub fn segment_ref(&self, contexts: &ContextSet) -> Option<&Segment> {
        self.segments.get(contexts)
    }

    /// All stored segments, ordered by context set.
    pub fn segments(&self) -> impl Iterator<Item = (&ContextSet, &Segment)> {
        self.segments.iter()
    }

    /// Context sets that hold data.
    pub fn active_contexts(&self) -> impl Iterator<Item = &ContextSet> {
        self.segments.keys()
    }

    /// Applies `f` to the segment at `contexts`.
    #[must_use]
    pub fn with_segment(&self, contexts: ContextSet, f: impl FnOnce(Segment) -> Segment) -> Self {
        let mut next = (*self.segments).clone();
        let updated = f(next.remove(&contexts).unwrap_or_default());
        if !updated.is_empty() {
            next.insert(contexts, updated);
        }
        Self {
            segments: Arc::new(next),
        }
    }

    /// Applies `f` to every stored segment.
    ///
    /// Never introduces keys; removes a key only when `f` returns an empty
    /// segment for it.
    #[must_use]
    pub fn with_segments(&self, mut f: impl FnMut(&ContextSet, Segment) -> Segment) -> Self {
        Self {
            segments: Arc::new(
                self.segments
                    .iter()
                    .map(|(ctx, seg)| (ctx.clone(), f(ctx, seg.clone())))
                    .filter(|(_, seg)| !seg.is_empty())
                    .collect(),
            ),
        }
    }

    /// Merges `other` into this data, segment by segment, with
    /// [`Segment::merge_from`] semantics.
    #[must_use]
    pub fn merge_from(&self, other: &ImmutableSubjectData) -> Self {
        let mut next = (*self.segments).clone();
        for (ctx, seg) in other.segments.iter() {
            let merged = match next.get(ctx) {
                Some(existing) => existing.merge_from(seg),
                None => seg.clone(),
            };
            if merged.is_empty() {
                next.remove(ctx);
            } else {
                next.insert(ctx.clone(), merged);
            }
        }
        Self {
            segments: Arc::new(next),
        }
    }

    /// Every parent named in any segment, first occurrence order.
    #[must_use]
    pub fn all_parents(&self) -> Vec<SubjectRef> {
        let mut seen = BTreeSet::new();
        self.segments
            .values()
            .flat_map(|s| s.parents().iter())
            .filter(|p| seen.insert((*p).clone()))
            .cloned()
            .collect()
    }

    /// Every context key used by any stored context set.
    #[must_use]
    pub fn context_keys(&self) -> BTreeSet<String> {
        self.segments
            .keys()
            .flat_map(|ctx| ctx.iter().map(|cv| cv.key().to_string()))
            .collect()
    }
}

impl From<Vec<SegmentEntry>> for ImmutableSubjectData {
    fn from(entries: Vec<SegmentEntry>) -> Self {
        Self::from_segments(entries.into_iter().map(|e| (e.contexts, e.segment)))
    }
}

impl From<ImmutableSubjectData> for Vec<SegmentEntry> {
    fn from(data: ImmutableSubjectData) -> Self {
        data.segments
            .iter()
            .map(|(contexts, segment)| SegmentEntry {
                contexts: contexts.clone(),
                segment: segment.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nether() -> ContextSet {
        ContextSet::of([("world", "nether")])
    }

    #[test]
    fn missing_segment_is_empty() {
        let data = ImmutableSubjectData::new();
        assert!(data.is_empty());
        assert!(data.segment(&nether()).is_empty());
        assert!(data.segment_ref(&nether()).is_none());
    }

    #[test]
    fn lookup_is_exact_not_subset() {
        let data =
            ImmutableSubjectData::new().with_segment(nether(), |s| s.with_permission("p", 1));
        let wider = nether().with(warden_types::ContextValue::new("difficulty", "hard"));
        assert_eq!(data.segment(&nether()).permission("p"), 1);
        assert!(data.segment(&wider).is_empty());
    }

    #[test]
    fn writes_do_not_touch_original() {
        let original =
            ImmutableSubjectData::new().with_segment(nether(), |s| s.with_option("k", "v"));
        let changed = original.with_segment(nether(), |s| s.with_option("k", "w"));
        assert_eq!(original.segment(&nether()).option("k"), Some("v"));
        assert_eq!(changed.segment(&nether()).option("k"), Some("w"));
        assert_ne!(original, changed);
    }

    #[test]
    fn emptied_segment_is_pruned() {
        let data = ImmutableSubjectData::new()
            .with_segment(nether(), |s| s.with_permission("p", 1))
            .with_segment(ContextSet::global(), |s| s.with_option("o", "1"));
        assert_eq!(data.active_contexts().count(), 2);

        let cleared = data.with_segment(nether(), |s| s.clear_permissions());
        assert_eq!(cleared.active_contexts().collect::<Vec<_>>(), vec![&ContextSet::global()]);

        let wiped = data.with_segments(|_, s| s.clear_permissions().clear_options());
        assert!(wiped.is_empty());
    }

    #[test]
    fn with_segments_keeps_keys() {
        let data = ImmutableSubjectData::new()
            .with_segment(nether(), |s| s.with_permission("p", 1))
            .with_segment(ContextSet::global(), |s| s.with_permission("p", 2));
        let flipped = data.with_segments(|_, s| {
            let value = -s.permission("p");
            s.with_permission("p", value)
        });
        assert_eq!(flipped.segment(&nether()).permission("p"), -1);
        assert_eq!(flipped.segment(&ContextSet::global()).permission("p"), -2);
        assert_eq!(flipped.active_contexts().count(), 2);
    }

    #[test]
    fn merge_from_combines_per_context() {
        let a = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_permission("x", 1))
            .with_segment(nether(), |s| s.with_option("o", "a"));
        let b = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_permission("x", -1))
            .with_segment(ContextSet::of([("world", "end")]), |s| s.with_option("o", "b"));

        let merged = a.merge_from(&b);
        assert_eq!(merged.segment(&ContextSet::global()).permission("x"), -1);
        assert_eq!(merged.segment(&nether()).option("o"), Some("a"));
        assert_eq!(
            merged
                .segment(&ContextSet::of([("world", "end")]))
                .option("o"),
            Some("b")
        );
    }

    #[test]
    fn all_parents_and_context_keys() {
        let g = SubjectRef::new("group", "g");
        let h = SubjectRef::new("group", "h");
        let data = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_parents(vec![g.clone()]))
            .with_segment(nether(), |s| s.with_parents(vec![h.clone(), g.clone()]));
        assert_eq!(data.all_parents(), vec![g, h]);
        assert_eq!(
            data.context_keys().into_iter().collect::<Vec<_>>(),
            vec!["world".to_string()]
        );
    }

    #[test]
    fn serde_roundtrip() {
        let data = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_permission("a", 1))
            .with_segment(nether(), |s| s.with_fallback_permission(-1));
        let json = serde_json::to_string(&data).expect("serialize subject data");
        let back: ImmutableSubjectData =
            serde_json::from_str(&json).expect("deserialize subject data");
        assert_eq!(data, back);
    }
}
