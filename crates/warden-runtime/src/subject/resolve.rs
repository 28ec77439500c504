//! Effective segment computation.
//!
//! # Context matching
//!
//! A segment stored under `K` applies to a query under `C` iff `K ⊆ C`.
//! Applicable segments of one tier are merged from least to most specific:
//!
//! ```text
//! stored: {}             build=1  chat=1
//!         {world=nether} build=-1
//!         {mode=pvp}     chat=-1
//! query : {world=nether, mode=pvp}
//!
//! order : {} ─► {mode=pvp} ─► {world=nether}      (len, then ContextSet order)
//! result: build=-1 chat=-1
//! ```
//!
//! Equally specific sets are ordered by [`ContextSet`]'s `Ord`, so the
//! outcome never depends on insertion order.
//!
//! # Tiers
//!
//! The primary tier (transient unless the subject type says otherwise)
//! overrides permissions and options; the secondary fills what it leaves
//! unset. Parent lists are always concatenated, primary first.

use warden_data::{ImmutableSubjectData, NodeTree, Segment};
use warden_types::{ContextSet, SubjectRef};

/// Merges every segment of `data` applicable to `contexts`.
pub(crate) fn effective_segment(data: &ImmutableSubjectData, contexts: &ContextSet) -> Segment {
    let mut applicable: Vec<(&ContextSet, &Segment)> = data
        .segments()
        .filter(|(key, _)| key.is_subset_of(contexts))
        .collect();
    applicable.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    applicable
        .into_iter()
        .fold(Segment::new(), |acc, (_, segment)| acc.merge_from(segment))
}

/// Combines two tiers' effective segments, `primary` authoritative.
pub(crate) fn combine_tiers(primary: &Segment, secondary: &Segment) -> Segment {
    let parents = primary
        .parents()
        .iter()
        .chain(secondary.parents())
        .cloned()
        .collect();
    secondary.merge_from(primary).with_parents(parents)
}

/// One subject's effective view at one context set, ready for lookups.
#[derive(Debug, Clone, Default)]
pub(crate) struct Baked {
    segment: Segment,
    tree: NodeTree,
}

impl Baked {
    pub(crate) fn new(segment: Segment) -> Self {
        Self {
            tree: NodeTree::from_map(segment.permissions()),
            segment,
        }
    }

    pub(crate) fn from_tiers(
        transient: &ImmutableSubjectData,
        persistent: &ImmutableSubjectData,
        contexts: &ContextSet,
        transient_has_priority: bool,
    ) -> Self {
        let transient = effective_segment(transient, contexts);
        let persistent = effective_segment(persistent, contexts);
        let merged = if transient_has_priority {
            combine_tiers(&transient, &persistent)
        } else {
            combine_tiers(&persistent, &transient)
        };
        Self::new(merged)
    }

    /// Tree match, then the fallback permission; `0` when neither applies.
    pub(crate) fn permission(&self, name: &str) -> i32 {
        match self.tree.get(name) {
            0 => self.segment.fallback_permission(),
            value => value,
        }
    }

    pub(crate) fn option(&self, key: &str) -> Option<&str> {
        self.segment.option(key)
    }

    pub(crate) fn parents(&self) -> &[SubjectRef] {
        self.segment.parents()
    }

    pub(crate) fn segment(&self) -> &Segment {
        &self.segment
    }

    pub(crate) fn tree(&self) -> &NodeTree {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use warden_types::ContextValue;

    fn nether() -> ContextSet {
        ContextSet::of([("world", "nether")])
    }

    fn group(name: &str) -> SubjectRef {
        SubjectRef::new("group", name)
    }

    #[test]
    fn subset_segments_merge_by_specificity() {
        let data = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| {
                s.with_permission("build", 1).with_permission("chat", 1)
            })
            .with_segment(nether(), |s| s.with_permission("build", -1));

        let hard_nether = nether().with(ContextValue::new("difficulty", "hard"));
        let merged = effective_segment(&data, &hard_nether);
        assert_eq!(merged.permission("build"), -1);
        assert_eq!(merged.permission("chat"), 1);

        let end = effective_segment(&data, &ContextSet::of([("world", "end")]));
        assert_eq!(end.permission("build"), 1);
    }

    #[test]
    fn equally_specific_sets_use_context_order() {
        let data = ImmutableSubjectData::new()
            .with_segment(ContextSet::of([("world", "nether")]), |s| s.with_option("o", "world"))
            .with_segment(ContextSet::of([("mode", "pvp")]), |s| s.with_option("o", "mode"));
        let query = ContextSet::of([("world", "nether"), ("mode", "pvp")]);

        // {mode=pvp} < {world=nether}, so the world segment is merged last
        assert_eq!(effective_segment(&data, &query).option("o"), Some("world"));
    }

    #[test]
    fn primary_tier_wins_and_parents_concatenate() {
        let transient = Segment::new()
            .with_permission("x", -1)
            .with_parents(vec![group("t")]);
        let persistent = Segment::new()
            .with_permission("x", 1)
            .with_permission("y", 1)
            .with_option("o", "p")
            .with_parents(vec![group("p")])
            .with_fallback_permission(2);

        let combined = combine_tiers(&transient, &persistent);
        assert_eq!(combined.permission("x"), -1);
        assert_eq!(combined.permission("y"), 1);
        assert_eq!(combined.option("o"), Some("p"));
        assert_eq!(combined.parents(), &[group("t"), group("p")]);
        assert_eq!(combined.fallback_permission(), 2);

        let reversed = combine_tiers(&persistent, &transient);
        assert_eq!(reversed.permission("x"), 1);
        assert_eq!(reversed.parents(), &[group("p"), group("t")]);
    }

    #[test]
    fn baked_permission_uses_fallback_after_tree() {
        let baked = Baked::new(
            Segment::new()
                .with_permission("world.edit", 1)
                .with_fallback_permission(-1),
        );
        assert_eq!(baked.permission("world.edit.blocks"), 1);
        assert_eq!(baked.permission("chat"), -1);
        assert!(Baked::default().permission("chat") == 0);
    }

    #[test]
    fn from_tiers_respects_priority_flag() {
        let transient = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_permission("x", 1));
        let persistent = ImmutableSubjectData::new()
            .with_segment(ContextSet::global(), |s| s.with_permission("x", -1));
        let global = ContextSet::global();

        assert_eq!(Baked::from_tiers(&transient, &persistent, &global, true).permission("x"), 1);
        assert_eq!(Baked::from_tiers(&transient, &persistent, &global, false).permission("x"), -1);
    }

    proptest! {
        #[test]
        fn most_specific_defined_entry_wins(
            global_value in -2_i32..=2,
            nether_value in -2_i32..=2
        ) {
            let data = ImmutableSubjectData::new()
                .with_segment(ContextSet::global(), |s| s.with_permission("p", global_value))
                .with_segment(nether(), |s| s.with_permission("p", nether_value));
            let query = nether().with(ContextValue::new("mode", "pvp"));

            let expected = if nether_value != 0 { nether_value } else { global_value };
            prop_assert_eq!(effective_segment(&data, &query).permission("p"), expected);
            let global = effective_segment(&data, &ContextSet::global());
            prop_assert_eq!(global.permission("p"), global_value);
        }
    }
}
