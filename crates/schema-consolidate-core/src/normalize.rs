//! Schema Normalizer: one definition → one tier-specific comparison key.
//!
//! Exact, Structural and Structural-Loose keys are produced by the same
//! [`SchemaFolder`] with different stripping switches, so each looser key is a
//! pure function of the stricter one. That is what makes the tiers refine
//! each other monotonically.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::config::Tier;
use crate::document::{schema_ref, schema_ref_name};
use crate::error::ConsolidateError;
use crate::schema_utils::canonical_string;
use crate::schema_walker::{fold, FoldAction, NodeKind, SchemaFolder, COMBINATOR_KEYWORDS};

/// Non-semantic annotation keywords, stripped from Structural tier upward.
pub const METADATA_KEYWORDS: &[&str] = &[
    "description",
    "title",
    "summary",
    "example",
    "examples",
    "externalDocs",
    "$comment",
];

/// Validation constraints, stripped at Structural-Loose.
pub const CONSTRAINT_KEYWORDS: &[&str] = &[
    "minLength",
    "maxLength",
    "pattern",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minProperties",
    "maxProperties",
    "enum",
    "const",
    "format",
];

/// Replaces a reference from a definition back to itself.
///
/// Carries no name, so two differently-named schemas with the same cycle
/// shape produce the same key.
pub const CYCLE_SENTINEL: &str = "cycle-back:self";

/// Default nesting guard.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A tier-specific comparison key. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NormalizedForm {
    /// Canonical serialization of the (stripped) schema.
    Content(String),
    /// The definition is a pure pointer to `target`; compared by nothing.
    Alias { target: String },
}

impl NormalizedForm {
    pub fn is_alias(&self) -> bool {
        matches!(self, NormalizedForm::Alias { .. })
    }
}

/// Normalize with the default depth guard.
pub fn normalize(name: &str, schema: &Value, tier: Tier) -> Result<NormalizedForm, ConsolidateError> {
    Normalizer::new(DEFAULT_MAX_DEPTH).normalize(name, schema, tier)
}

/// Normalizer with a configurable depth guard.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_depth: usize,
}

impl Normalizer {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Compute the key of definition `name` at `tier`.
    pub fn normalize(
        &self,
        name: &str,
        schema: &Value,
        tier: Tier,
    ) -> Result<NormalizedForm, ConsolidateError> {
        if let Some(target) = alias_target(schema) {
            return Ok(NormalizedForm::Alias { target });
        }

        if tier == Tier::Attribute {
            return Ok(NormalizedForm::Content(attribute_signature(schema)));
        }

        let mut folder = TierFolder {
            strip_metadata: tier != Tier::Exact,
            strip_constraints: tier == Tier::StructuralLoose,
            self_ref: schema_ref(name),
            max_depth: self.max_depth,
        };
        let path = schema_ref(name);
        let folded = fold(schema.clone(), &mut folder, &path, 0)?;
        Ok(NormalizedForm::Content(canonical_string(&folded)))
    }
}

/// If the whole body is one pointer (metadata siblings allowed), return the
/// target definition name, or the raw pointer for non-schema targets.
pub fn alias_target(schema: &Value) -> Option<String> {
    let NodeKind::Reference(target) = NodeKind::of(schema) else {
        return None;
    };
    let obj = schema.as_object()?;
    let only_metadata = obj
        .keys()
        .all(|k| k == "$ref" || METADATA_KEYWORDS.contains(&k.as_str()));
    if !only_metadata {
        return None;
    }
    Some(schema_ref_name(target).unwrap_or_else(|| target.to_string()))
}

// ---------------------------------------------------------------------------
// Exact / Structural / Structural-Loose
// ---------------------------------------------------------------------------

struct TierFolder {
    strip_metadata: bool,
    strip_constraints: bool,
    self_ref: String,
    max_depth: usize,
}

impl SchemaFolder for TierFolder {
    type Error = ConsolidateError;

    fn fold_schema(
        &mut self,
        schema: Value,
        path: &str,
        depth: usize,
    ) -> Result<FoldAction, Self::Error> {
        if depth > self.max_depth {
            return Err(ConsolidateError::RecursionDepthExceeded {
                path: path.to_string(),
                max_depth: self.max_depth,
            });
        }

        let mut obj = match schema {
            Value::Object(obj) => obj,
            other => return Ok(FoldAction::Replace(other)),
        };

        if obj.get("$ref").and_then(Value::as_str) == Some(self.self_ref.as_str()) {
            obj.insert("$ref".to_string(), Value::String(CYCLE_SENTINEL.to_string()));
        }

        if self.strip_metadata {
            for keyword in METADATA_KEYWORDS {
                obj.remove(*keyword);
            }
            sort_required(&mut obj);
        }
        if self.strip_constraints {
            for keyword in CONSTRAINT_KEYWORDS {
                obj.remove(*keyword);
            }
        }

        Ok(FoldAction::Continue(Value::Object(obj)))
    }

    fn finish_schema(
        &mut self,
        mut schema: Value,
        _path: &str,
        _depth: usize,
    ) -> Result<Value, Self::Error> {
        // Branch order of a combinator carries no meaning once metadata is gone.
        if self.strip_metadata {
            if let Some(obj) = schema.as_object_mut() {
                for keyword in COMBINATOR_KEYWORDS {
                    if let Some(Value::Array(branches)) = obj.get_mut(*keyword) {
                        branches.sort_by_cached_key(canonical_string);
                    }
                }
            }
        }
        Ok(schema)
    }
}

fn sort_required(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(required)) = obj.get_mut("required") {
        required.sort_by_cached_key(canonical_string);
    }
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// Flat `(property, type)` signature one level deep, prefixed by the
/// top-level type. Discards nesting and constraints: report only.
fn attribute_signature(schema: &Value) -> String {
    let mut pairs = BTreeSet::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (prop_name, prop_schema) in props {
            pairs.insert(format!("{prop_name}:{}", type_label(prop_schema)));
        }
    }
    let pairs: Vec<String> = pairs.into_iter().collect();
    format!("type={}|{}", type_label(schema), pairs.join(";"))
}

/// The declared type of a node: `type` as written, `ref` for pointers,
/// `unknown` otherwise.
fn type_label(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(types)) => {
            let mut names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            names.sort_unstable();
            names.join(",")
        }
        _ if schema.get("$ref").is_some() => "ref".to_string(),
        _ => "unknown".to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str, schema: &Value, tier: Tier) -> NormalizedForm {
        normalize(name, schema, tier).unwrap()
    }

    fn delete_response(description: &str) -> Value {
        json!({
            "type": "object",
            "description": description,
            "properties": {
                "response": {
                    "type": "object",
                    "properties": { "isDeleted": { "type": "boolean" } },
                    "required": ["isDeleted"]
                }
            },
            "required": ["response"]
        })
    }

    #[test]
    fn test_exact_keeps_metadata() {
        let a = delete_response("Deletes a user");
        let b = delete_response("Deletes a node");
        assert_ne!(key("A", &a, Tier::Exact), key("B", &b, Tier::Exact));
        assert_eq!(key("A", &a, Tier::Exact), key("B", &a, Tier::Exact));
    }

    #[test]
    fn test_structural_strips_metadata_recursively() {
        let a = json!({
            "type": "object",
            "title": "A",
            "properties": { "id": { "type": "string", "example": "abc", "description": "id" } }
        });
        let b = json!({
            "type": "object",
            "properties": { "id": { "type": "string", "summary": "other" } }
        });
        assert_eq!(key("A", &a, Tier::Structural), key("B", &b, Tier::Structural));
    }

    #[test]
    fn test_property_named_like_metadata_survives() {
        let with_prop = json!({
            "type": "object",
            "properties": { "description": { "type": "string" } }
        });
        let without = json!({ "type": "object", "properties": {} });
        assert_ne!(
            key("A", &with_prop, Tier::Structural),
            key("B", &without, Tier::Structural)
        );
    }

    #[test]
    fn test_structural_keeps_constraints() {
        let a = json!({ "type": "string", "maxLength": 10 });
        let b = json!({ "type": "string", "maxLength": 20 });
        assert_ne!(key("A", &a, Tier::Structural), key("B", &b, Tier::Structural));
        assert_eq!(
            key("A", &a, Tier::StructuralLoose),
            key("B", &b, Tier::StructuralLoose)
        );
    }

    #[test]
    fn test_required_is_structural() {
        let props = json!({ "a": { "type": "string" }, "b": { "type": "string" } });
        let a = json!({ "type": "object", "properties": props.clone(), "required": ["a"] });
        let b = json!({ "type": "object", "properties": props, "required": ["a", "b"] });
        assert_ne!(key("A", &a, Tier::Structural), key("B", &b, Tier::Structural));
        assert_ne!(
            key("A", &a, Tier::StructuralLoose),
            key("B", &b, Tier::StructuralLoose)
        );
    }

    #[test]
    fn test_required_order_ignored_above_exact() {
        let a = json!({ "type": "object", "required": ["a", "b"] });
        let b = json!({ "type": "object", "required": ["b", "a"] });
        assert_ne!(key("A", &a, Tier::Exact), key("B", &b, Tier::Exact));
        assert_eq!(key("A", &a, Tier::Structural), key("B", &b, Tier::Structural));
    }

    #[test]
    fn test_combinator_branch_order_ignored_above_exact() {
        let a = json!({ "oneOf": [{ "type": "string" }, { "$ref": "#/components/schemas/X" }] });
        let b = json!({ "oneOf": [{ "$ref": "#/components/schemas/X" }, { "type": "string" }] });
        assert_ne!(key("A", &a, Tier::Exact), key("B", &b, Tier::Exact));
        assert_eq!(key("A", &a, Tier::Structural), key("B", &b, Tier::Structural));
    }

    #[test]
    fn test_pure_reference_is_alias() {
        let alias = json!({ "$ref": "#/components/schemas/Target", "description": "see Target" });
        for tier in Tier::ALL {
            assert_eq!(
                key("A", &alias, tier),
                NormalizedForm::Alias {
                    target: "Target".to_string()
                }
            );
        }
        let not_alias = json!({ "$ref": "#/components/schemas/Target", "nullable": true });
        assert!(!key("A", &not_alias, Tier::Exact).is_alias());
    }

    #[test]
    fn test_self_reference_uses_sentinel() {
        let tree = |name: &str| {
            json!({
                "type": "object",
                "properties": {
                    "children": { "type": "array", "items": { "$ref": format!("#/components/schemas/{name}") } }
                }
            })
        };
        let node = tree("Node");
        let branch = tree("Branch");
        for tier in [Tier::Exact, Tier::Structural, Tier::StructuralLoose] {
            let node_key = key("Node", &node, tier);
            assert_eq!(node_key, key("Branch", &branch, tier));
            match &node_key {
                NormalizedForm::Content(s) => assert!(s.contains(CYCLE_SENTINEL)),
                other => panic!("unexpected key: {other:?}"),
            }
        }
        // The same body seen from another name is a plain reference, not a cycle.
        assert_ne!(key("Node", &node, Tier::Structural), key("Other", &node, Tier::Structural));
    }

    #[test]
    fn test_attribute_signature_flat() {
        let nested_a = json!({
            "type": "object",
            "properties": {
                "response": { "type": "object", "properties": { "x": { "type": "string" } } },
                "id": { "type": "string", "format": "uuid" }
            }
        });
        let nested_b = json!({
            "type": "object",
            "properties": {
                "response": { "type": "object", "properties": { "y": { "type": "integer" } } },
                "id": { "type": "string" }
            }
        });
        assert_eq!(
            key("A", &nested_a, Tier::Attribute),
            NormalizedForm::Content("type=object|id:string;response:object".to_string())
        );
        assert_eq!(key("A", &nested_a, Tier::Attribute), key("B", &nested_b, Tier::Attribute));
        assert_ne!(
            key("A", &nested_a, Tier::StructuralLoose),
            key("B", &nested_b, Tier::StructuralLoose)
        );
    }

    #[test]
    fn test_depth_guard() {
        let mut schema = json!({ "type": "string" });
        for _ in 0..5 {
            schema = json!({ "type": "array", "items": schema });
        }
        let err = Normalizer::new(3)
            .normalize("Deep", &schema, Tier::Structural)
            .unwrap_err();
        assert!(matches!(
            err,
            ConsolidateError::RecursionDepthExceeded { max_depth: 3, .. }
        ));
    }
}
