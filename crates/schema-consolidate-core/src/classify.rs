//! Equivalence Classifier: partitions definitions into duplicate groups.
//!
//! Every tier is computed from scratch over the full definition set. Report
//! callers get [`DuplicateGroup`]s for any [`Tier`]; the planner only accepts
//! [`MergeGroup`]s, which can only be built here and only from a
//! [`ConsolidationTier`]. Attribute groups therefore cannot reach the rewriter.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::config::{ConsolidationTier, Tier};
use crate::error::ConsolidateError;
use crate::normalize::{NormalizedForm, Normalizer, DEFAULT_MAX_DEPTH};

/// Two or more definitions sharing one key at one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    tier: Tier,
    members: Vec<String>,
    key: NormalizedForm,
}

impl DuplicateGroup {
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Member names, sorted.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn key(&self) -> &NormalizedForm {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(name)).is_ok()
    }
}

/// A duplicate group that is safe to merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup {
    tier: ConsolidationTier,
    group: DuplicateGroup,
}

impl MergeGroup {
    pub fn tier(&self) -> ConsolidationTier {
        self.tier
    }

    pub fn members(&self) -> &[String] {
        self.group.members()
    }

    pub fn key(&self) -> &NormalizedForm {
        self.group.key()
    }

    pub fn as_group(&self) -> &DuplicateGroup {
        &self.group
    }
}

/// Partition at `tier` with the default depth guard.
pub fn classify(
    definitions: &Map<String, Value>,
    tier: Tier,
) -> Result<Vec<DuplicateGroup>, ConsolidateError> {
    Classifier::new(DEFAULT_MAX_DEPTH).classify(definitions, tier)
}

/// Classifier with a configurable depth guard.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    normalizer: Normalizer,
}

impl Classifier {
    pub fn new(max_depth: usize) -> Self {
        Self {
            normalizer: Normalizer::new(max_depth),
        }
    }

    /// Group definitions whose keys are equal at `tier`. Singletons and
    /// aliases are dropped. Groups come out ordered by their smallest member.
    pub fn classify(
        &self,
        definitions: &Map<String, Value>,
        tier: Tier,
    ) -> Result<Vec<DuplicateGroup>, ConsolidateError> {
        let mut names: Vec<&String> = definitions.keys().collect();
        names.sort();

        let mut index: HashMap<NormalizedForm, usize> = HashMap::new();
        let mut buckets: Vec<(NormalizedForm, Vec<String>)> = Vec::new();

        for name in names {
            let key = self.normalizer.normalize(name, &definitions[name.as_str()], tier)?;
            if key.is_alias() {
                continue;
            }
            match index.get(&key) {
                Some(&i) => buckets[i].1.push(name.clone()),
                None => {
                    index.insert(key.clone(), buckets.len());
                    buckets.push((key, vec![name.clone()]));
                }
            }
        }

        let groups: Vec<DuplicateGroup> = buckets
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(key, members)| DuplicateGroup { tier, members, key })
            .collect();

        tracing::debug!(
            tier = %tier,
            groups = groups.len(),
            schemas = groups.iter().map(DuplicateGroup::len).sum::<usize>(),
            "classified definitions"
        );
        Ok(groups)
    }

    /// Groups that the planner may merge.
    ///
    /// `keep_separate` lists name sets that must never be merged together: a
    /// group containing a whole set loses all of that set's members, and is
    /// dropped if fewer than two remain.
    pub fn classify_for_merge(
        &self,
        definitions: &Map<String, Value>,
        tier: ConsolidationTier,
        keep_separate: &[Vec<String>],
    ) -> Result<Vec<MergeGroup>, ConsolidateError> {
        let groups = self.classify(definitions, tier.into())?;
        let mut merge_groups = Vec::with_capacity(groups.len());

        for mut group in groups {
            for exclusion in keep_separate {
                if exclusion.len() > 1 && exclusion.iter().all(|n| group.contains(n)) {
                    tracing::debug!(names = ?exclusion, "keeping protected schemas separate");
                    group.members.retain(|m| !exclusion.contains(m));
                }
            }
            if group.members.len() > 1 {
                merge_groups.push(MergeGroup { tier, group });
            }
        }

        Ok(merge_groups)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
