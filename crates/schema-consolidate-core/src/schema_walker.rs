//! Unified schema AST traversal via the fold pattern.
//!
//! Provides [`NodeKind`], a tagged view of one schema node, plus
//! [`SchemaFolder`] and [`fold`], the driver that walks the AST and delegates
//! to the folder at each node. The normalizer and the rewriter both run on
//! this driver, so every keyword that can hold a sub-schema (including
//! combinator branches in uncommon positions) is listed exactly once, here.

use serde_json::{Map, Value};

use crate::document::schema_ref;
use crate::error::ConsolidateError;
use crate::schema_utils::build_path;

// ---------------------------------------------------------------------------
// Keyword lists (single source of truth)
// ---------------------------------------------------------------------------

/// Keywords whose values are maps of schemas (each map entry is a sub-schema).
pub(crate) const MAP_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
];

/// Keywords whose values are single sub-schemas (when the value is an object).
pub(crate) const SINGLE_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "unevaluatedProperties",
    "propertyNames",
    "unevaluatedItems",
    "contains",
    "not",
    "if",
    "then",
    "else",
    "additionalItems",
];

/// Combinator keywords: arrays of sub-schemas whose order carries no meaning.
pub(crate) const COMBINATOR_KEYWORDS: &[&str] = &["allOf", "oneOf", "anyOf"];

/// Positional array-of-schemas keywords.
pub(crate) const TUPLE_KEYWORDS: &[&str] = &["prefixItems"];

// ---------------------------------------------------------------------------
// Tagged node view
// ---------------------------------------------------------------------------

/// What a schema node is, decided once so callers match instead of probing
/// keys ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind<'a> {
    /// `{"$ref": "..."}`, possibly with sibling keywords.
    Reference(&'a str),
    /// Has at least one of `allOf` / `oneOf` / `anyOf`.
    Combinator,
    /// `type: object` or a `properties` map.
    Object,
    /// `type: array` or an `items` keyword.
    Array,
    /// Any other declared type (`string`, `integer`, `["string", "null"]`, …).
    Scalar,
    /// Boolean schema (`true` / `false`).
    Boolean(bool),
    /// No type information (`{}`, `{nullable: true}`, non-schema values).
    Untyped,
}

impl<'a> NodeKind<'a> {
    pub fn of(schema: &'a Value) -> Self {
        let obj = match schema {
            Value::Object(obj) => obj,
            Value::Bool(b) => return NodeKind::Boolean(*b),
            _ => return NodeKind::Untyped,
        };

        if let Some(target) = obj.get("$ref").and_then(Value::as_str) {
            return NodeKind::Reference(target);
        }
        if COMBINATOR_KEYWORDS
            .iter()
            .any(|k| obj.get(*k).is_some_and(Value::is_array))
        {
            return NodeKind::Combinator;
        }
        match obj.get("type").and_then(Value::as_str) {
            Some("object") => return NodeKind::Object,
            Some("array") => return NodeKind::Array,
            Some(_) => return NodeKind::Scalar,
            None => {}
        }
        if obj.contains_key("properties") {
            NodeKind::Object
        } else if obj.contains_key("items") {
            NodeKind::Array
        } else if obj.get("type").is_some_and(Value::is_array) {
            NodeKind::Scalar
        } else {
            NodeKind::Untyped
        }
    }
}

// ---------------------------------------------------------------------------
// Fold action
// ---------------------------------------------------------------------------

/// Instruction returned by [`SchemaFolder::fold_schema`] to control traversal.
#[derive(Debug)]
pub enum FoldAction {
    /// Continue folding into children of this node.
    Continue(Value),
    /// Replace this node entirely and skip child traversal.
    Replace(Value),
}

// ---------------------------------------------------------------------------
// SchemaFolder trait
// ---------------------------------------------------------------------------

/// A fold-based schema transformer.
///
/// The [`fold`] driver handles all keyword enumeration; implementations never
/// need to know which JSON keys contain sub-schemas.
pub trait SchemaFolder {
    type Error: From<ConsolidateError>;

    /// Called for each schema node BEFORE recursing into children.
    ///
    /// - `schema`: the current node (owned).
    /// - `path`  : JSON Pointer to this node.
    /// - `depth` : recursion depth (incremented per child level).
    fn fold_schema(
        &mut self,
        schema: Value,
        path: &str,
        depth: usize,
    ) -> Result<FoldAction, Self::Error>;

    /// Called for each node AFTER its children were folded. Not called for
    /// nodes that returned [`FoldAction::Replace`].
    fn finish_schema(
        &mut self,
        schema: Value,
        _path: &str,
        _depth: usize,
    ) -> Result<Value, Self::Error> {
        Ok(schema)
    }
}

// ---------------------------------------------------------------------------
// Fold driver
// ---------------------------------------------------------------------------

/// Drive a [`SchemaFolder`] over a schema AST.
///
/// 1. Calls `folder.fold_schema()` on the current node.
/// 2. If [`FoldAction::Replace`], returns the replacement immediately.
/// 3. Otherwise recurses into all schema-bearing keywords and hands the
///    rebuilt node to `folder.finish_schema()`.
pub fn fold<F: SchemaFolder>(
    schema: Value,
    folder: &mut F,
    path: &str,
    depth: usize,
) -> Result<Value, F::Error> {
    match folder.fold_schema(schema, path, depth)? {
        FoldAction::Replace(v) => Ok(v),
        FoldAction::Continue(v) => {
            let rebuilt = fold_children(v, folder, path, depth)?;
            folder.finish_schema(rebuilt, path, depth)
        }
    }
}

/// Recurse into the schema-bearing children of a value.
///
/// Non-object values pass through unchanged.
fn fold_children<F: SchemaFolder>(
    value: Value,
    folder: &mut F,
    path: &str,
    depth: usize,
) -> Result<Value, F::Error> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return Ok(other),
    };

    // --- Map-of-schemas keywords ---
    for keyword in MAP_KEYWORDS {
        if let Some(val) = obj.remove(*keyword) {
            match val {
                Value::Object(map) => {
                    let mut new_map = Map::new();
                    for (key, val) in map {
                        let child_path = build_path(path, &[keyword, &key]);
                        new_map.insert(key, fold(val, folder, &child_path, depth + 1)?);
                    }
                    obj.insert(keyword.to_string(), Value::Object(new_map));
                }
                other => {
                    obj.insert(keyword.to_string(), other);
                }
            }
        }
    }

    // --- Single-schema keywords ---
    for keyword in SINGLE_KEYWORDS {
        if let Some(val) = obj.remove(*keyword) {
            if val.is_object() {
                let child_path = build_path(path, &[keyword]);
                let walked = fold(val, folder, &child_path, depth + 1)?;
                obj.insert(keyword.to_string(), walked);
            } else {
                // Not a schema (e.g. `additionalProperties: false`): preserve
                obj.insert(keyword.to_string(), val);
            }
        }
    }

    // --- Array-of-schemas keywords ---
    for keyword in COMBINATOR_KEYWORDS.iter().chain(TUPLE_KEYWORDS) {
        if let Some(val) = obj.remove(*keyword) {
            match val {
                Value::Array(variants) => {
                    let mut walked = Vec::with_capacity(variants.len());
                    for (i, variant) in variants.into_iter().enumerate() {
                        let child_path = build_path(path, &[keyword, &i.to_string()]);
                        walked.push(fold(variant, folder, &child_path, depth + 1)?);
                    }
                    obj.insert(keyword.to_string(), Value::Array(walked));
                }
                other => {
                    obj.insert(keyword.to_string(), other);
                }
            }
        }
    }

    // --- `items` (object or array form) ---
    if let Some(items) = obj.remove("items") {
        match items {
            Value::Object(_) => {
                let child_path = build_path(path, &["items"]);
                let walked = fold(items, folder, &child_path, depth + 1)?;
                obj.insert("items".to_string(), walked);
            }
            Value::Array(arr) => {
                let mut walked = Vec::with_capacity(arr.len());
                for (i, item) in arr.into_iter().enumerate() {
                    let child_path = build_path(path, &["items", &i.to_string()]);
                    walked.push(fold(item, folder, &child_path, depth + 1)?);
                }
                obj.insert("items".to_string(), Value::Array(walked));
            }
            other => {
                obj.insert("items".to_string(), other);
            }
        }
    }

    Ok(Value::Object(obj))
}

// ---------------------------------------------------------------------------
// Read-only reference scan
// ---------------------------------------------------------------------------

/// Call `f(path, reference)` for every `$ref` string and every
/// `discriminator.mapping` value anywhere in `value`.
///
/// Unlike [`fold`] this does not know the document shape: it inspects every
/// object, which is what the post-rewrite audit needs. A mapping value that is
/// a bare definition name is reported in its pointer form.
pub fn for_each_reference<F>(value: &Value, path: &str, f: &mut F)
where
    F: FnMut(&str, &str),
{
    match value {
        Value::Object(obj) => {
            if let Some(target) = obj.get("$ref").and_then(Value::as_str) {
                f(path, target);
            }
            if let Some(mapping) = discriminator_mapping(obj) {
                for (key, target) in mapping {
                    let Some(target) = target.as_str() else {
                        continue;
                    };
                    let entry_path = build_path(path, &["discriminator", "mapping", key]);
                    if is_bare_definition_name(target) {
                        f(&entry_path, &schema_ref(target));
                    } else {
                        f(&entry_path, target);
                    }
                }
            }
            for (key, child) in obj {
                if child.is_object() || child.is_array() {
                    for_each_reference(child, &build_path(path, &[key]), f);
                }
            }
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                for_each_reference(child, &build_path(path, &[&i.to_string()]), f);
            }
        }
        _ => {}
    }
}

/// `discriminator.mapping` of a schema object, if present.
pub(crate) fn discriminator_mapping(obj: &Map<String, Value>) -> Option<&Map<String, Value>> {
    obj.get("discriminator")?.get("mapping")?.as_object()
}

/// A mapping value may name a definition directly instead of pointing at it.
/// Anything with a `#`, `/` or `.` is a pointer or a URL.
pub(crate) fn is_bare_definition_name(target: &str) -> bool {
    !target.is_empty() && !target.contains(['#', '/', '.'])
}

// ---------------------------------------------------------------------------
// Convenience: identity folder (passthrough)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub struct IdentityFolder;

#[cfg(test)]
impl SchemaFolder for IdentityFolder {
    type Error = ConsolidateError;

    fn fold_schema(
        &mut self,
        schema: Value,
        _path: &str,
        _depth: usize,
    ) -> Result<FoldAction, Self::Error> {
        Ok(FoldAction::Continue(schema))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
