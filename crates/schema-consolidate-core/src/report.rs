//! Report Builder: pure aggregation of classifier and planner output.
//!
//! The report is the machine-readable contract for CI, so every field
//! serializes in `camelCase` and tiers are keyed by their stable names.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::DuplicateGroup;
use crate::config::Tier;
use crate::document::SchemaDocument;
use crate::inline::ExtractedShape;
use crate::planner::{MergeRecord, NameConflict, PlanStats};

/// Group and schema counts for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSummary {
    pub group_count: usize,
    /// Schemas that belong to some group at this tier.
    pub schema_count: usize,
    /// Largest groups first.
    pub top_groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub size: usize,
    pub members: Vec<String>,
}

/// Definition count and compact size of one document state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSize {
    pub definitions: usize,
    pub bytes: usize,
}

impl DocumentSize {
    pub fn of(document: &SchemaDocument) -> Self {
        Self {
            definitions: document.definition_count(),
            bytes: document.byte_size(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub tiers: BTreeMap<Tier, TierSummary>,
    /// Structural groups that are not also Exact groups.
    pub near_duplicates: Vec<Vec<String>>,
    /// Structural-Loose groups that are not also Structural groups.
    pub constraint_only: Vec<Vec<String>>,
    pub before: DocumentSize,
    pub after: DocumentSize,
    /// `before.bytes - after.bytes`.
    pub size_delta: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<MergeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<NameConflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted: Vec<ExtractedShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanStats>,
}

/// Aggregate per-tier groups of `document` into a report with no changes
/// recorded yet (`after == before`).
pub fn build_report(
    groups: &BTreeMap<Tier, Vec<DuplicateGroup>>,
    document: &SchemaDocument,
    top_n: usize,
) -> DuplicateReport {
    let tiers = groups
        .iter()
        .map(|(tier, groups)| (*tier, summarize(groups, top_n)))
        .collect();

    let size = DocumentSize::of(document);
    DuplicateReport {
        tiers,
        near_duplicates: difference(groups, Tier::Structural, Tier::Exact),
        constraint_only: difference(groups, Tier::StructuralLoose, Tier::Structural),
        before: size,
        after: size,
        ..DuplicateReport::default()
    }
}

impl DuplicateReport {
    /// Record the outcome of consolidation.
    pub fn record_consolidation(
        &mut self,
        after: &SchemaDocument,
        merges: Vec<MergeRecord>,
        conflicts: Vec<NameConflict>,
        stats: PlanStats,
    ) {
        self.after = DocumentSize::of(after);
        self.size_delta = self.before.bytes as i64 - self.after.bytes as i64;
        self.merges = merges;
        self.conflicts = conflicts;
        self.plan = Some(stats);
    }

    pub fn summary(&self, tier: Tier) -> Option<&TierSummary> {
        self.tiers.get(&tier)
    }
}

fn summarize(groups: &[DuplicateGroup], top_n: usize) -> TierSummary {
    let mut ranked: Vec<&DuplicateGroup> = groups.iter().collect();
    ranked.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.members().cmp(b.members())));

    TierSummary {
        group_count: groups.len(),
        schema_count: groups.iter().map(DuplicateGroup::len).sum(),
        top_groups: ranked
            .into_iter()
            .take(top_n)
            .map(|g| GroupSummary {
                size: g.len(),
                members: g.members().to_vec(),
            })
            .collect(),
    }
}

/// Member lists of `looser` groups that do not appear verbatim at `stricter`.
fn difference(
    groups: &BTreeMap<Tier, Vec<DuplicateGroup>>,
    looser: Tier,
    stricter: Tier,
) -> Vec<Vec<String>> {
    let strict: BTreeSet<&[String]> = groups
        .get(&stricter)
        .into_iter()
        .flatten()
        .map(DuplicateGroup::members)
        .collect();
    groups
        .get(&looser)
        .into_iter()
        .flatten()
        .filter(|g| !strict.contains(g.members()))
        .map(|g| g.members().to_vec())
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn analyzed(doc: &SchemaDocument) -> BTreeMap<Tier, Vec<DuplicateGroup>> {
        Tier::ALL
            .iter()
            .map(|t| (*t, classify(doc.definitions(), *t).unwrap()))
            .collect()
    }

    fn sample() -> SchemaDocument {
        SchemaDocument::from_value(json!({ "components": { "schemas": {
            "A": { "type": "string" },
            "B": { "type": "string" },
            "C": { "type": "string", "description": "c" },
            "D": { "type": "string", "maxLength": 4 },
            "E": { "type": "integer" }
        } } }))
        .unwrap()
    }

    #[test]
    fn test_per_tier_counts() {
        let doc = sample();
        let report = build_report(&analyzed(&doc), &doc, 10);

        let exact = report.summary(Tier::Exact).unwrap();
        assert_eq!((exact.group_count, exact.schema_count), (1, 2));
        let structural = report.summary(Tier::Structural).unwrap();
        assert_eq!((structural.group_count, structural.schema_count), (1, 3));
        let loose = report.summary(Tier::StructuralLoose).unwrap();
        assert_eq!((loose.group_count, loose.schema_count), (1, 4));

        assert_eq!(report.near_duplicates, vec![vec!["A", "B", "C"]]);
        assert_eq!(report.constraint_only, vec![vec!["A", "B", "C", "D"]]);
        assert_eq!(report.before, report.after);
        assert_eq!(report.size_delta, 0);
    }

    #[test]
    fn test_top_n_largest_first() {
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "X1": { "type": "integer" }, "X2": { "type": "integer" },
            "Y1": { "type": "string" }, "Y2": { "type": "string" }, "Y3": { "type": "string" }
        } } }))
        .unwrap();
        let report = build_report(&analyzed(&doc), &doc, 1);
        let exact = report.summary(Tier::Exact).unwrap();
        assert_eq!(exact.group_count, 2);
        assert_eq!(exact.top_groups.len(), 1);
        assert_eq!(exact.top_groups[0].members, vec!["Y1", "Y2", "Y3"]);
    }

    #[test]
    fn test_serializes_camel_case_with_tier_keys() {
        let doc = sample();
        let report = build_report(&analyzed(&doc), &doc, 10);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["tiers"]["structural-loose"]["groupCount"], json!(1));
        assert!(value.get("nearDuplicates").is_some());
        assert!(value.get("constraintOnly").is_some());
        assert!(value.get("merges").is_none());

        let back: DuplicateReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }
}
