//! The API-description document and its schema container.
//!
//! [`SchemaDocument`] validates once, at construction, that the document has a
//! `components.schemas` object; every other component can then read the
//! definitions without re-checking.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::error::{ConsolidateError, DanglingRef};
use crate::schema_utils::{escape_pointer_segment, resolve_pointer, unescape_pointer_segment};
use crate::schema_walker::for_each_reference;

/// Pointer prefix of every schema definition reference.
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Path of the schema container, for error messages.
const CONTAINER_PATH: &str = "#/components/schemas";

/// An immutable, validated API-description document.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    root: Value,
}

impl SchemaDocument {
    /// Wrap a parsed document, failing fast if the schema container is missing
    /// or is not an object.
    pub fn from_value(root: Value) -> Result<Self, ConsolidateError> {
        if !root.is_object() {
            return Err(ConsolidateError::SchemaError {
                path: "#".to_string(),
                message: "document root must be an object".to_string(),
            });
        }
        match root.get("components").and_then(|c| c.get("schemas")) {
            Some(Value::Object(_)) => Ok(Self { root }),
            Some(other) => Err(ConsolidateError::SchemaError {
                path: CONTAINER_PATH.to_string(),
                message: format!("expected an object, found {}", json_type_name(other)),
            }),
            None => Err(ConsolidateError::MissingSchemaContainer {
                path: CONTAINER_PATH.to_string(),
            }),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, ConsolidateError> {
        Self::from_value(serde_json::from_str(input)?)
    }

    /// The whole document.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Consume the wrapper and return the document.
    pub fn into_value(self) -> Value {
        self.root
    }

    /// All named schema definitions.
    pub fn definitions(&self) -> &Map<String, Value> {
        self.root
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(Value::as_object)
            .unwrap_or_else(|| empty_map())
    }

    /// Look up one definition by name.
    pub fn definition(&self, name: &str) -> Option<&Value> {
        self.definitions().get(name)
    }

    /// Number of named definitions.
    pub fn definition_count(&self) -> usize {
        self.definitions().len()
    }

    /// Compact JSON size in bytes, used for the report's size delta.
    pub fn byte_size(&self) -> usize {
        compact_size(&self.root)
    }

    /// Every schema reference that does not resolve, in document order.
    ///
    /// A reference to a definition must name one that exists; a deeper
    /// pointer (`#/components/schemas/Pet/properties/id`) must resolve in
    /// full.
    pub fn dangling_references(&self) -> Vec<DanglingRef> {
        let names: BTreeSet<&str> = self.definitions().keys().map(String::as_str).collect();
        let mut dangling = Vec::new();
        for_each_reference(&self.root, "#", &mut |path, reference| {
            let Some((name, rest)) = split_schema_ref(reference) else {
                return;
            };
            let resolves = if rest.is_empty() {
                names.contains(name.as_str())
            } else {
                resolve_pointer(&self.root, reference).is_some()
            };
            if !resolves {
                dangling.push(DanglingRef {
                    path: path.to_string(),
                    reference: reference.to_string(),
                });
            }
        });
        dangling
    }

    /// How many reference sites point at or into each definition.
    pub fn reference_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for_each_reference(&self.root, "#", &mut |_, reference| {
            if let Some((name, _)) = split_schema_ref(reference) {
                *counts.entry(name).or_insert(0) += 1;
            }
        });
        counts
    }

    /// Build a new document from a root that is already known to contain the
    /// schema container.
    pub(crate) fn from_trusted(root: Value) -> Self {
        Self { root }
    }
}

/// Build the reference pointer for a definition name.
///
/// # Example
/// ```
/// use schema_consolidate_core::schema_ref;
/// assert_eq!(schema_ref("Pet"), "#/components/schemas/Pet");
/// ```
pub fn schema_ref(name: &str) -> String {
    format!("{SCHEMA_REF_PREFIX}{}", escape_pointer_segment(name))
}

/// Extract the definition name from a schema reference, or `None` if the
/// pointer does not name one definition of the schema container.
pub fn schema_ref_name(reference: &str) -> Option<String> {
    match split_schema_ref(reference)? {
        (name, "") => Some(name),
        _ => None,
    }
}

/// Split a schema reference into the definition it enters and the pointer
/// below that definition (empty when the reference names the definition
/// itself, otherwise starting with `/`).
///
/// # Example
/// ```
/// use schema_consolidate_core::split_schema_ref;
/// assert_eq!(
///     split_schema_ref("#/components/schemas/Pet/properties/id"),
///     Some(("Pet".to_string(), "/properties/id"))
/// );
/// ```
pub fn split_schema_ref(reference: &str) -> Option<(String, &str)> {
    let rest = reference.strip_prefix(SCHEMA_REF_PREFIX)?;
    let (head, tail) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
    if head.is_empty() {
        return None;
    }
    Some((unescape_pointer_segment(head).into_owned(), tail))
}

pub(crate) fn compact_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

// ===========================================================================
// Tests
// ===========================================================================
