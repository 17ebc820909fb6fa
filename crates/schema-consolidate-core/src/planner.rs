//! Rename/Consolidation Planner.
//!
//! Turns merge groups into one global [`RenameMap`]. Collisions between
//! canonical names are resolved deterministically by group index, and every
//! collision is recorded as a [`NameConflict`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::MergeGroup;
use crate::config::{ConflictPolicy, ConsolidationTier};
use crate::document::{compact_size, SchemaDocument};
use crate::error::ConsolidateError;
use crate::naming::CanonicalNamer;
use crate::normalize::NormalizedForm;

// ---------------------------------------------------------------------------
// RenameMap
// ---------------------------------------------------------------------------

/// Alias name to canonical name, plus the canonical names that must be
/// created before rewriting.
///
/// Chains are always resolved: no value is also a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameMap {
    aliases: BTreeMap<String, String>,
    /// Synthesized canonical name to the definition whose body it copies.
    materialized: BTreeMap<String, String>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw entries, resolving chains. Identity entries are
    /// dropped.
    pub fn from_aliases(
        aliases: BTreeMap<String, String>,
        materialized: BTreeMap<String, String>,
    ) -> Result<Self, ConsolidateError> {
        Ok(Self {
            aliases: resolve_chains(&aliases)?,
            materialized,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.materialized.is_empty()
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Canonical name for `alias`, if it is renamed.
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn materialized(&self) -> &BTreeMap<String, String> {
        &self.materialized
    }

    /// Every name that aliases point at.
    pub fn canonical_names(&self) -> BTreeSet<&str> {
        self.aliases.values().map(String::as_str).collect()
    }

    /// One record per final canonical name, listing the definitions of
    /// `before` that now resolve to it. Names that only existed between
    /// passes are left out.
    pub fn merge_records(
        &self,
        before: &SchemaDocument,
        tier: ConsolidationTier,
    ) -> Vec<MergeRecord> {
        let mut by_canonical: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (alias, canonical) in &self.aliases {
            if before.definition(alias).is_some() {
                by_canonical
                    .entry(canonical.as_str())
                    .or_default()
                    .push(alias.clone());
            }
        }
        by_canonical
            .into_iter()
            .map(|(canonical, merged_aliases)| MergeRecord {
                canonical_name: canonical.to_string(),
                merged_aliases,
                materialized: before.definition(canonical).is_none(),
                tier,
            })
            .collect()
    }

    /// Compose with a map computed on the document this map produced, so the
    /// result sends every original alias to its final name.
    pub fn then(&mut self, next: RenameMap) {
        for target in self.aliases.values_mut() {
            if let Some(final_name) = next.aliases.get(target.as_str()) {
                *target = final_name.clone();
            }
        }
        self.aliases.extend(next.aliases);
        self.materialized.extend(next.materialized);
        let aliases = &self.aliases;
        self.materialized.retain(|name, _| !aliases.contains_key(name));
    }
}

/// Follow every chain to its end. A loop is a [`ConsolidateError::CyclicRename`]
/// listing the names in the order they were visited.
pub fn resolve_chains(
    raw: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, ConsolidateError> {
    let mut resolved = BTreeMap::new();
    for (alias, target) in raw {
        if alias == target {
            continue;
        }
        let mut seen = vec![alias.clone()];
        let mut current = target;
        while let Some(next) = raw.get(current.as_str()) {
            if next == current {
                break;
            }
            if seen.iter().any(|s| s == current) {
                seen.push(current.clone());
                return Err(ConsolidateError::CyclicRename { names: seen });
            }
            seen.push(current.clone());
            current = next;
        }
        if current == alias {
            seen.push(current.clone());
            return Err(ConsolidateError::CyclicRename { names: seen });
        }
        resolved.insert(alias.clone(), current.clone());
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Plan output
// ---------------------------------------------------------------------------

/// Summary counts of one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStats {
    pub groups_merged: usize,
    pub schemas_removed: usize,
    pub schemas_added: usize,
    /// Compact JSON bytes of removed definitions minus added ones.
    pub estimated_byte_delta: i64,
}

impl PlanStats {
    pub fn accumulate(&mut self, other: PlanStats) {
        self.groups_merged += other.groups_merged;
        self.schemas_removed += other.schemas_removed;
        self.schemas_added += other.schemas_added;
        self.estimated_byte_delta += other.estimated_byte_delta;
    }
}

/// One merged group, as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecord {
    pub canonical_name: String,
    pub merged_aliases: Vec<String>,
    /// The canonical name did not exist before and was created.
    pub materialized: bool,
    pub tier: ConsolidationTier,
}

/// A canonical name that had to be changed because it was already taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameConflict {
    /// Name the namer chose.
    pub requested: String,
    /// Name actually assigned.
    pub assigned: String,
    /// Members of the group that was renamed.
    pub members: Vec<String>,
    /// Who already held the requested name: an earlier group's members, or
    /// the single existing definition.
    pub held_by: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub rename_map: RenameMap,
    pub stats: PlanStats,
    pub conflicts: Vec<NameConflict>,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

struct Claim<'a> {
    key: &'a NormalizedForm,
    members: &'a [String],
}

/// Plan the renames for `groups`, in group order.
pub fn plan(
    groups: &[MergeGroup],
    document: &SchemaDocument,
    namer: &CanonicalNamer,
    policy: ConflictPolicy,
) -> Result<Plan, ConsolidateError> {
    let definitions = document.definitions();
    let mut claims: BTreeMap<String, Claim<'_>> = BTreeMap::new();
    let mut aliases = BTreeMap::new();
    let mut materialized = BTreeMap::new();
    let mut result = Plan::default();

    for group in groups {
        let members = group.members();
        let requested = namer.choose_name(members);

        // Same canonical with an identical key: the groups are one shape.
        let shared = claims
            .get(&requested)
            .is_some_and(|claim| claim.key == group.key());

        let canonical = if shared {
            requested.clone()
        } else {
            let taken = |name: &str| {
                claims.contains_key(name)
                    || (definitions.contains_key(name) && !members.iter().any(|m| m == name))
            };
            if taken(&requested) {
                let held_by = match claims.get(&requested) {
                    Some(claim) => claim.members.to_vec(),
                    None => vec![requested.clone()],
                };
                if policy == ConflictPolicy::Fail {
                    return Err(ConsolidateError::NamingConflict {
                        canonical: requested,
                        groups: vec![held_by, members.to_vec()],
                    });
                }
                let assigned = (2..)
                    .map(|n| format!("{requested}{n}"))
                    .find(|candidate| !taken(candidate))
                    .unwrap_or_else(|| requested.clone());
                tracing::warn!(
                    requested = %requested,
                    assigned = %assigned,
                    "canonical name already taken, suffixing"
                );
                result.conflicts.push(NameConflict {
                    requested: requested.clone(),
                    assigned: assigned.clone(),
                    members: members.to_vec(),
                    held_by,
                });
                assigned
            } else {
                requested.clone()
            }
        };

        let is_member = members.iter().any(|m| *m == canonical);
        let newly_created = !is_member && !materialized.contains_key(&canonical);
        if newly_created {
            materialized.insert(canonical.clone(), members[0].clone());
            if let Some(body) = definitions.get(&members[0]) {
                result.stats.estimated_byte_delta -= compact_size(body) as i64;
            }
            result.stats.schemas_added += 1;
        }

        let merged: Vec<String> = members
            .iter()
            .filter(|m| **m != canonical)
            .cloned()
            .collect();
        for alias in &merged {
            if let Some(body) = definitions.get(alias) {
                result.stats.estimated_byte_delta += compact_size(body) as i64;
            }
            aliases.insert(alias.clone(), canonical.clone());
        }
        result.stats.schemas_removed += merged.len();
        result.stats.groups_merged += 1;

        tracing::debug!(
            canonical = %canonical,
            aliases = merged.len(),
            materialized = !is_member,
            "planned merge"
        );
        claims.entry(canonical).or_insert(Claim {
            key: group.key(),
            members,
        });
    }

    result.rename_map = RenameMap::from_aliases(aliases, materialized)?;
    Ok(result)
}

/// Turn an explicit rename table into a [`RenameMap`].
///
/// Several names may share one target; the target must not be a definition
/// that survives the rename. A target that does not exist yet is created
/// from the alphabetically first name pointing at it directly.
pub fn plan_manual(
    renames: &BTreeMap<String, String>,
    document: &SchemaDocument,
) -> Result<RenameMap, ConsolidateError> {
    let definitions = document.definitions();

    for alias in renames.keys() {
        if !definitions.contains_key(alias) {
            return Err(ConsolidateError::SchemaError {
                path: crate::document::schema_ref(alias),
                message: format!("no definition named {alias} to rename"),
            });
        }
    }

    let mut materialized = BTreeMap::new();
    for (alias, target) in renames {
        if alias == target {
            continue;
        }
        let survives = definitions.contains_key(target)
            && renames.get(target).map_or(true, |t| t == target);
        if survives {
            return Err(ConsolidateError::RenameTargetExists {
                alias: alias.clone(),
                target: target.clone(),
            });
        }
        if !definitions.contains_key(target) {
            materialized
                .entry(target.clone())
                .or_insert_with(|| alias.clone());
        }
    }

    RenameMap::from_aliases(renames.clone(), materialized)
}

// ===========================================================================
// Tests
// ===========================================================================
