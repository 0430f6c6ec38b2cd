//! Capability tags: the matching contract between agents and tasks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A set of capability tags.
///
/// Agents advertise capabilities at registration; tasks declare the
/// capabilities they require. Matching is plain subset containment and is
/// the only place capabilities are interpreted — nothing enforces that an
/// agent can actually do what it advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// True when every tag in `self` is present in `other`.
    ///
    /// An empty set is a subset of everything: a task with no required
    /// capabilities is claimable by any agent.
    pub fn is_subset_of(&self, other: &CapabilitySet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(tags: &[&str]) -> CapabilitySet {
        tags.iter().copied().collect()
    }

    #[test]
    fn empty_set_matches_any_agent() {
        let required = CapabilitySet::new();
        assert!(required.is_subset_of(&caps(&["coding"])));
        assert!(required.is_subset_of(&CapabilitySet::new()));
    }

    #[test]
    fn subset_matching() {
        let required = caps(&["coding", "testing"]);
        assert!(required.is_subset_of(&caps(&["coding", "testing", "review"])));
        assert!(!required.is_subset_of(&caps(&["coding"])));
        assert!(!required.is_subset_of(&CapabilitySet::new()));
    }

    #[test]
    fn serde_round_trips_as_plain_array() {
        let set = caps(&["b", "a"]);
        let json = serde_json::to_string(&set).unwrap();
        // BTreeSet keeps the wire form sorted and deduplicated.
        assert_eq!(json, r#"["a","b"]"#);
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: subset containment is reflexive and monotone under
            /// union with extra tags.
            #[test]
            fn subset_is_reflexive_and_monotone(
                tags in proptest::collection::btree_set("[a-z]{1,8}", 0..6),
                extra in proptest::collection::btree_set("[a-z]{1,8}", 0..4),
            ) {
                let set: CapabilitySet = tags.iter().cloned().collect();
                let wider: CapabilitySet =
                    tags.iter().cloned().chain(extra.iter().cloned()).collect();

                prop_assert!(set.is_subset_of(&set));
                prop_assert!(set.is_subset_of(&wider));
            }
        }
    }
}
