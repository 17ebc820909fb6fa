//! Configuration for schema consolidation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::DEFAULT_MAX_DEPTH;

/// Equivalence tier, from strictest to loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Canonical serialization, nothing stripped.
    Exact,
    /// Metadata stripped, validation constraints kept.
    Structural,
    /// Metadata and validation constraints stripped.
    StructuralLoose,
    /// Flat (property, type) signature. Report only.
    Attribute,
}

impl Tier {
    /// All tiers, strictest first.
    pub const ALL: [Tier; 4] = [
        Tier::Exact,
        Tier::Structural,
        Tier::StructuralLoose,
        Tier::Attribute,
    ];

    /// Stable name used as the report key.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Exact => "exact",
            Tier::Structural => "structural",
            Tier::StructuralLoose => "structural-loose",
            Tier::Attribute => "attribute",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tiers whose groups are safe to merge.
///
/// There is no `Attribute` variant: attribute groups discard
/// nested structure and can never reach the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsolidationTier {
    Exact,
    Structural,
    /// Opt-in: merges schemas whose validation constraints differ.
    StructuralLoose,
}

impl From<ConsolidationTier> for Tier {
    fn from(tier: ConsolidationTier) -> Self {
        match tier {
            ConsolidationTier::Exact => Tier::Exact,
            ConsolidationTier::Structural => Tier::Structural,
            ConsolidationTier::StructuralLoose => Tier::StructuralLoose,
        }
    }
}

/// What the planner does when two groups want the same canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Append a numeric suffix to the later group and record the conflict.
    Suffix,
    /// Abort with [`crate::ConsolidateError::NamingConflict`].
    Fail,
}

/// A user-defined naming rule: when every name in a group matches `pattern`,
/// the group is named `canonical`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NamingRuleConfig {
    /// Regular expression matched against each name (trailing `Dto` removed).
    pub pattern: String,
    /// Canonical name produced on match.
    pub canonical: String,
}

/// Options for schema consolidation.
///
/// ## Serialization Format
///
/// Fields are serialized in `kebab-case` (e.g., `conflict-policy`,
/// `keep-separate`). This is the format of the CLI `--config` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsolidateOptions {
    /// Tier whose groups are merged. Default: structural.
    pub tier: ConsolidationTier,
    /// Collision handling. Default: suffix.
    pub conflict_policy: ConflictPolicy,
    /// Sets of definition names that must never be merged together.
    pub keep_separate: Vec<Vec<String>>,
    /// Naming rules evaluated before the built-in table.
    pub naming_rules: Vec<NamingRuleConfig>,
    /// Hoist repeated inline object shapes into shared definitions first.
    pub extract_inline: bool,
    /// Number of largest groups listed per tier in the report.
    pub top_n: usize,
    /// Maximum schema nesting depth (stack overflow guard).
    pub max_depth: usize,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            tier: ConsolidationTier::Structural,
            conflict_policy: ConflictPolicy::Suffix,
            keep_separate: Vec::new(),
            naming_rules: Vec::new(),
            extract_inline: false,
            top_n: 10,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
