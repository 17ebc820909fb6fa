//! Inline Extractor: hoists repeated inline object shapes into named
//! definitions so they can take part in consolidation.
//!
//! Only object schemas nested under a definition's `properties` or array
//! `items` are candidates. Shapes are compared with the Structural key, and a
//! shape is extracted once it occurs at least twice. Inner shapes go before
//! the shapes that contain them; the scan repeats until nothing qualifies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Tier;
use crate::document::{schema_ref, split_schema_ref, SchemaDocument};
use crate::error::ConsolidateError;
use crate::normalize::{NormalizedForm, Normalizer};
use crate::schema_utils::build_path;
use crate::schema_walker::for_each_reference;

/// A shape that was moved into its own definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedShape {
    pub name: String,
    /// Pointers of the replaced inline schemas.
    pub occurrences: Vec<String>,
}

/// One inline object found during a scan.
#[derive(Debug, Clone)]
struct Occurrence {
    definition: String,
    segments: Vec<String>,
}

impl Occurrence {
    fn pointer(&self) -> String {
        let segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        build_path(&schema_ref(&self.definition), &segments)
    }

    /// Candidate name: last property name, capitalized, plus `Item` when the
    /// shape is an array's item schema.
    fn name_hint(&self) -> String {
        let is_item = self.segments.last().is_some_and(|s| s == "items");
        let property = self
            .segments
            .iter()
            .rev()
            .zip(self.segments.iter().rev().skip(1))
            .find(|(_, parent)| *parent == "properties")
            .map(|(name, _)| name.as_str())
            .unwrap_or("");
        let mut hint = capitalize(property);
        if hint.is_empty() {
            hint.push_str("Inline");
        }
        if is_item {
            hint.push_str("Item");
        }
        hint
    }

    /// Some pointer reaches into this schema or below it.
    fn is_pinned(&self, pinned: &[String]) -> bool {
        let pointer = self.pointer();
        pinned.iter().any(|reference| {
            reference
                .strip_prefix(pointer.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    fn is_ancestor_of(&self, other: &Occurrence) -> bool {
        self.definition == other.definition
            && self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_inline_object(schema: &Value) -> bool {
    schema.get("$ref").is_none()
        && schema.get("type").and_then(Value::as_str) == Some("object")
        && schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|p| !p.is_empty())
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Hoist every repeated inline object shape of `document`.
pub fn extract_inline(
    document: &SchemaDocument,
    max_depth: usize,
) -> Result<(SchemaDocument, Vec<ExtractedShape>), ConsolidateError> {
    let normalizer = Normalizer::new(max_depth);
    let mut schemas = document.definitions().clone();
    let mut extracted: Vec<ExtractedShape> = Vec::new();

    // Pointers reaching below a definition pin the inline schemas they pass
    // through: replacing one of those with a `$ref` would break the pointer.
    let mut pinned = Vec::new();
    for_each_reference(document.as_value(), "#", &mut |_, reference| {
        if split_schema_ref(reference).is_some_and(|(_, rest)| !rest.is_empty()) {
            pinned.push(reference.to_string());
        }
    });

    loop {
        let groups = repeated_shapes(&schemas, &normalizer, &pinned, max_depth)?;
        if groups.is_empty() {
            break;
        }

        let before = extracted.len();
        for occurrences in innermost(&groups) {
            let name = unique_name(&occurrences[0].name_hint(), &schemas);
            let Some(body) = node(&schemas, &occurrences[0]).cloned() else {
                continue;
            };
            for occurrence in occurrences {
                if let Some(slot) = node_mut(&mut schemas, occurrence) {
                    *slot = serde_json::json!({ "$ref": schema_ref(&name) });
                }
            }
            tracing::debug!(name = %name, occurrences = occurrences.len(), "extracted inline shape");
            extracted.push(ExtractedShape {
                name: name.clone(),
                occurrences: occurrences.iter().map(Occurrence::pointer).collect(),
            });
            schemas.insert(name, body);
        }
        if extracted.len() == before {
            break;
        }
    }

    let mut root = document.as_value().clone();
    if let Some(components) = root.get_mut("components").and_then(Value::as_object_mut) {
        components.insert("schemas".to_string(), Value::Object(schemas));
    }
    Ok((SchemaDocument::from_trusted(root), extracted))
}

/// Shapes occurring at least twice, each list in document order, the lists
/// ordered by their first occurrence.
fn repeated_shapes(
    schemas: &Map<String, Value>,
    normalizer: &Normalizer,
    pinned: &[String],
    max_depth: usize,
) -> Result<Vec<Vec<Occurrence>>, ConsolidateError> {
    let mut names: Vec<&String> = schemas.keys().collect();
    names.sort();

    let mut found = Vec::new();
    for name in names {
        collect(name, &schemas[name.as_str()], &mut Vec::new(), &mut found, max_depth)?;
    }

    let mut by_key: BTreeMap<NormalizedForm, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<Occurrence>> = Vec::new();
    for occurrence in found {
        if occurrence.is_pinned(pinned) {
            continue;
        }
        let Some(schema) = node(schemas, &occurrence) else {
            continue;
        };
        // An empty self name: no inline reference may collapse to the
        // self-reference sentinel.
        let key = normalizer.normalize("", schema, Tier::Structural)?;
        match by_key.get(&key) {
            Some(&i) => groups[i].push(occurrence),
            None => {
                by_key.insert(key, groups.len());
                groups.push(vec![occurrence]);
            }
        }
    }
    groups.retain(|g| g.len() > 1);
    Ok(groups)
}

/// Walk `properties` and object `items` below `segments`.
fn collect(
    definition: &str,
    schema: &Value,
    segments: &mut Vec<String>,
    found: &mut Vec<Occurrence>,
    max_depth: usize,
) -> Result<(), ConsolidateError> {
    if segments.len() > max_depth * 2 {
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
        return Err(ConsolidateError::RecursionDepthExceeded {
            path: build_path(&schema_ref(definition), &parts),
            max_depth,
        });
    }
    if !segments.is_empty() && is_inline_object(schema) {
        found.push(Occurrence {
            definition: definition.to_string(),
            segments: segments.clone(),
        });
    }
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (prop, child) in props {
            segments.push("properties".to_string());
            segments.push(prop.clone());
            collect(definition, child, segments, found, max_depth)?;
            segments.truncate(segments.len() - 2);
        }
    }
    if let Some(items) = schema.get("items").filter(|i| i.is_object()) {
        segments.push("items".to_string());
        collect(definition, items, segments, found, max_depth)?;
        segments.pop();
    }
    Ok(())
}

/// Groups none of whose occurrences contains an occurrence of another group.
fn innermost(groups: &[Vec<Occurrence>]) -> Vec<&[Occurrence]> {
    groups
        .iter()
        .enumerate()
        .filter(|(i, group)| {
            !group.iter().any(|outer| {
                groups
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| j != i)
                    .flat_map(|(_, other)| other.iter())
                    .any(|inner| outer.is_ancestor_of(inner))
            })
        })
        .map(|(_, group)| group.as_slice())
        .collect()
}

fn unique_name(hint: &str, schemas: &Map<String, Value>) -> String {
    if !schemas.contains_key(hint) {
        return hint.to_string();
    }
    (2..)
        .map(|n| format!("{hint}{n}"))
        .find(|candidate| !schemas.contains_key(candidate))
        .unwrap_or_else(|| hint.to_string())
}

fn node<'a>(schemas: &'a Map<String, Value>, occurrence: &Occurrence) -> Option<&'a Value> {
    occurrence
        .segments
        .iter()
        .try_fold(schemas.get(&occurrence.definition)?, |value, segment| {
            value.get(segment.as_str())
        })
}

fn node_mut<'a>(
    schemas: &'a mut Map<String, Value>,
    occurrence: &Occurrence,
) -> Option<&'a mut Value> {
    occurrence
        .segments
        .iter()
        .try_fold(schemas.get_mut(&occurrence.definition)?, |value, segment| {
            value.get_mut(segment.as_str())
        })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DEFAULT_MAX_DEPTH;
    use crate::schema_utils::resolve_pointer;
    use serde_json::json;

    fn address() -> Value {
        json!({
            "type": "object",
            "properties": {
                "street": { "type": "string" },
                "city": { "type": "string" }
            }
        })
    }

    #[test]
    fn test_repeated_shape_is_hoisted() {
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "Person": { "type": "object", "properties": { "address": address() } },
            "Shop": { "type": "object", "properties": { "address": address(), "name": { "type": "string" } } }
        } } }))
        .unwrap();

        let (out, extracted) = extract_inline(&doc, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].name, "Address");
        assert_eq!(
            extracted[0].occurrences,
            vec![
                "#/components/schemas/Person/properties/address",
                "#/components/schemas/Shop/properties/address"
            ]
        );
        assert_eq!(out.definition("Address"), Some(&address()));
        for pointer in &extracted[0].occurrences {
            assert_eq!(
                resolve_pointer(out.as_value(), pointer),
                Some(&json!({ "$ref": "#/components/schemas/Address" }))
            );
        }
        assert_eq!(
            out.definition("Person").unwrap()["properties"]["address"],
            json!({ "$ref": "#/components/schemas/Address" })
        );
        assert!(out.dangling_references().is_empty());
    }

    #[test]
    fn test_single_occurrence_left_inline() {
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "Person": { "type": "object", "properties": { "address": address() } }
        } } }))
        .unwrap();
        let (out, extracted) = extract_inline(&doc, DEFAULT_MAX_DEPTH).unwrap();
        assert!(extracted.is_empty());
        assert_eq!(out, doc);
    }

    #[test]
    fn test_array_items_and_name_collision() {
        let tag = json!({ "type": "object", "properties": { "label": { "type": "string" } } });
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "TagsItem": { "type": "string" },
            "Post": { "type": "object", "properties": { "tags": { "type": "array", "items": tag.clone() } } },
            "Page": { "type": "object", "properties": { "tags": { "type": "array", "items": tag } } }
        } } }))
        .unwrap();
        let (_, extracted) = extract_inline(&doc, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].name, "TagsItem2");
    }

    #[test]
    fn test_nested_shapes_extracted_inner_first() {
        let outer = json!({
            "type": "object",
            "properties": { "geo": { "type": "object", "properties": { "lat": { "type": "number" } } } }
        });
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "A": { "type": "object", "properties": { "location": outer.clone() } },
            "B": { "type": "object", "properties": { "location": outer } }
        } } }))
        .unwrap();
        let (out, extracted) = extract_inline(&doc, DEFAULT_MAX_DEPTH).unwrap();
        let names: Vec<&str> = extracted.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Geo", "Location"]);
        assert_eq!(
            out.definition("Location").unwrap()["properties"]["geo"],
            json!({ "$ref": "#/components/schemas/Geo" })
        );
    }

    #[test]
    fn test_metadata_differences_still_match() {
        let mut described = address();
        described["description"] = json!("where they live");
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "Person": { "type": "object", "properties": { "home": described } },
            "Shop": { "type": "object", "properties": { "home": address() } }
        } } }))
        .unwrap();
        let (_, extracted) = extract_inline(&doc, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].name, "Home");
    }

    #[test]
    fn test_shape_reached_by_pointer_stays_inline() {
        let doc = SchemaDocument::from_value(json!({ "components": { "schemas": {
            "Person": { "type": "object", "properties": { "address": address() } },
            "Shop": { "type": "object", "properties": { "address": address() } },
            "Town": { "type": "object", "properties": {
                "name": { "$ref": "#/components/schemas/Person/properties/address/properties/city" }
            } }
        } } }))
        .unwrap();
        let (out, extracted) = extract_inline(&doc, DEFAULT_MAX_DEPTH).unwrap();
        // Only Shop's copy is left as a candidate, so nothing repeats.
        assert!(extracted.is_empty());
        assert_eq!(out, doc);
        assert!(out.dangling_references().is_empty());
    }
}
