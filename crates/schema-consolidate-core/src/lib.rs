//! # schema-consolidate-core
//!
//! Find duplicate schema definitions in an OpenAPI document and merge them
//! without breaking a single `$ref`.
//!
//! The engine runs in stages, each a separate module:
//!
//! 1. **Normalize** ([`normalize`]): one comparison key per definition and tier.
//! 2. **Classify** ([`classify`]): definitions with equal keys form groups.
//! 3. **Name** ([`naming`]): an ordered rule table picks each group's name.
//! 4. **Plan** ([`planner`]): a conflict-free alias → canonical map.
//! 5. **Rewrite** ([`rewrite`]): every reference repointed, aliases removed,
//!    and every reference checked to resolve.
//! 6. **Report** ([`report`]): per-tier counts and what was merged.
//!
//! ## Example
//!
//! ```
//! use schema_consolidate_core::{consolidate, ConsolidateOptions, SchemaDocument};
//! use serde_json::json;
//!
//! let body = json!({ "type": "object", "properties": { "isDeleted": { "type": "boolean" } } });
//! let document = SchemaDocument::from_value(json!({
//!     "openapi": "3.0.0",
//!     "components": { "schemas": {
//!         "DeleteHostResponseDto": body.clone(),
//!         "DeleteNodeResponseDto": body
//!     } }
//! })).unwrap();
//!
//! let result = consolidate(&document, &ConsolidateOptions::default()).unwrap();
//! assert!(result.document.definition("DeleteResponse").is_some());
//! assert_eq!(result.document.definition_count(), 1);
//! assert_eq!(result.rename_map.get("DeleteNodeResponseDto"), Some("DeleteResponse"));
//! ```

pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod inline;
pub mod naming;
pub mod normalize;
pub mod planner;
pub mod report;
pub mod rewrite;
pub mod schema_utils;
pub mod schema_walker;

use std::collections::BTreeMap;

pub use classify::{classify, Classifier, DuplicateGroup, MergeGroup};
pub use config::{ConflictPolicy, ConsolidateOptions, ConsolidationTier, NamingRuleConfig, Tier};
pub use document::{
    schema_ref, schema_ref_name, split_schema_ref, SchemaDocument, SCHEMA_REF_PREFIX,
};
pub use error::{ConsolidateError, DanglingRef, ErrorCode};
pub use inline::{extract_inline, ExtractedShape};
pub use naming::{choose_name, CanonicalNamer};
pub use normalize::{normalize, NormalizedForm, Normalizer};
pub use planner::{plan, plan_manual, MergeRecord, NameConflict, Plan, PlanStats, RenameMap};
pub use report::{build_report, DuplicateReport, TierSummary};
pub use rewrite::rewrite;
pub use schema_utils::{build_path, split_path};

/// Output of [`consolidate`].
#[derive(Debug, Clone)]
pub struct ConsolidationResult {
    /// The rewritten document.
    pub document: SchemaDocument,
    /// Every original alias mapped to its final canonical name.
    pub rename_map: RenameMap,
    /// Analysis of the input plus what was merged.
    pub report: DuplicateReport,
}

/// Classify `document` at every tier and aggregate the result. Nothing is
/// changed.
pub fn analyze(
    document: &SchemaDocument,
    options: &ConsolidateOptions,
) -> Result<DuplicateReport, ConsolidateError> {
    let classifier = Classifier::new(options.max_depth);
    let mut groups = BTreeMap::new();
    for tier in Tier::ALL {
        groups.insert(tier, classifier.classify(document.definitions(), tier)?);
    }
    tracing::debug!(definitions = document.definition_count(), "analyzed document");
    Ok(build_report(&groups, document, options.top_n))
}

/// Merge every duplicate group at `options.tier`.
///
/// Merging can make former near-duplicates identical (two schemas that
/// pointed at different, now merged, definitions), so passes repeat until no
/// group is left. Running `consolidate` on its own output changes nothing.
pub fn consolidate(
    document: &SchemaDocument,
    options: &ConsolidateOptions,
) -> Result<ConsolidationResult, ConsolidateError> {
    let namer = CanonicalNamer::with_rules(&options.naming_rules)?;
    let classifier = Classifier::new(options.max_depth);
    let mut report = analyze(document, options)?;

    let start = if options.extract_inline {
        let (extracted_doc, extracted) = extract_inline(document, options.max_depth)?;
        report.extracted = extracted;
        extracted_doc
    } else {
        document.clone()
    };
    let mut working = start.clone();

    let mut rename_map = RenameMap::new();
    let mut conflicts = Vec::new();
    let mut stats = PlanStats::default();
    let mut passes = 0usize;

    loop {
        let groups = classifier.classify_for_merge(
            working.definitions(),
            options.tier,
            &options.keep_separate,
        )?;
        if groups.is_empty() {
            break;
        }
        let pass = plan(&groups, &working, &namer, options.conflict_policy)?;
        working = rewrite(&working, &pass.rename_map)?;

        rename_map.then(pass.rename_map);
        conflicts.extend(pass.conflicts);
        stats.accumulate(pass.stats);
        passes += 1;
    }

    // Later passes can fold an earlier canonical into another group, so the
    // records come from the composed map rather than from each pass.
    let merges = rename_map.merge_records(&start, options.tier);
    stats.groups_merged = merges.len();
    stats.schemas_removed = merges.iter().map(|m| m.merged_aliases.len()).sum();
    stats.schemas_added = merges.iter().filter(|m| m.materialized).count();

    tracing::debug!(
        passes,
        groups = stats.groups_merged,
        removed = stats.schemas_removed,
        added = stats.schemas_added,
        "consolidation complete"
    );
    report.record_consolidation(&working, merges, conflicts, stats);

    Ok(ConsolidationResult {
        document: working,
        rename_map,
        report,
    })
}

/// Apply an explicit `old name → new name` table.
///
/// Several names may map to one target. A target that is an existing
/// definition not itself renamed is rejected with
/// [`ConsolidateError::RenameTargetExists`].
pub fn apply_renames(
    document: &SchemaDocument,
    renames: &BTreeMap<String, String>,
) -> Result<(SchemaDocument, RenameMap), ConsolidateError> {
    let map = plan_manual(renames, document)?;
    let renamed = rewrite(document, &map)?;
    Ok((renamed, map))
}
