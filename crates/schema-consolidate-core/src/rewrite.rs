//! Graph Rewriter: repoints every schema reference through a [`RenameMap`].
//!
//! The document is visited in a fixed order that follows its known shape:
//! definitions, the other component sections, paths, then webhooks. Inside
//! each schema the shared fold driver reaches every sub-schema keyword. The
//! result is audited afterwards: every schema reference must resolve.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::document::{schema_ref, split_schema_ref, SchemaDocument};
use crate::error::ConsolidateError;
use crate::planner::RenameMap;
use crate::schema_utils::build_path;
use crate::schema_walker::{fold, is_bare_definition_name, FoldAction, NodeKind, SchemaFolder};

/// HTTP methods that can appear as operation keys in a path item.
const OPERATION_KEYS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Component sections visited after `schemas`, in order.
const COMPONENT_SECTIONS: &[&str] = &[
    "parameters",
    "requestBodies",
    "responses",
    "headers",
    "callbacks",
    "pathItems",
];

// ---------------------------------------------------------------------------
// Reference folder
// ---------------------------------------------------------------------------

struct RefRewriter<'a> {
    map: &'a RenameMap,
    rewritten: usize,
}

impl SchemaFolder for RefRewriter<'_> {
    type Error = ConsolidateError;

    fn fold_schema(
        &mut self,
        mut schema: Value,
        _path: &str,
        _depth: usize,
    ) -> Result<FoldAction, Self::Error> {
        let renamed = match NodeKind::of(&schema) {
            NodeKind::Reference(reference) => self.rename_reference(reference),
            _ => None,
        };
        if let (Some(renamed), Some(slot)) = (renamed, schema.get_mut("$ref")) {
            *slot = Value::String(renamed);
            self.rewritten += 1;
        }

        if let Some(mapping) = schema
            .get_mut("discriminator")
            .and_then(|d| d.get_mut("mapping"))
            .and_then(Value::as_object_mut)
        {
            for target in mapping.values_mut() {
                let Some(current) = target.as_str() else {
                    continue;
                };
                let renamed = if is_bare_definition_name(current) {
                    self.map.get(current).map(str::to_string)
                } else {
                    self.rename_reference(current)
                };
                if let Some(renamed) = renamed {
                    *target = Value::String(renamed);
                    self.rewritten += 1;
                }
            }
        }
        Ok(FoldAction::Continue(schema))
    }
}

impl RefRewriter<'_> {
    /// New pointer for `reference` if it points at or into a renamed
    /// definition. The part below the definition is kept.
    fn rename_reference(&self, reference: &str) -> Option<String> {
        let (name, rest) = split_schema_ref(reference)?;
        let canonical = self.map.get(&name)?;
        Some(format!("{}{rest}", schema_ref(canonical)))
    }

    /// Fold the schema stored in `slot`, in place.
    fn schema(&mut self, slot: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        let taken = std::mem::take(slot);
        *slot = fold(taken, self, path, 0)?;
        Ok(())
    }

    /// `content: { <media type>: { schema, encoding } }`
    fn content(&mut self, owner: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        let Some(content) = owner.get_mut("content").and_then(Value::as_object_mut) else {
            return Ok(());
        };
        for (media_type, media) in content.iter_mut() {
            let media_path = build_path(path, &["content", media_type]);
            if let Some(schema) = media.get_mut("schema") {
                self.schema(schema, &build_path(&media_path, &["schema"]))?;
            }
            if let Some(encoding) = media.get_mut("encoding").and_then(Value::as_object_mut) {
                for (field, entry) in encoding.iter_mut() {
                    let entry_path = build_path(&media_path, &["encoding", field]);
                    self.header_map(entry, &entry_path)?;
                }
            }
        }
        Ok(())
    }

    /// Parameters and headers share a shape: `schema` or `content`.
    fn parameter(&mut self, param: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        if let Some(schema) = param.get_mut("schema") {
            self.schema(schema, &build_path(path, &["schema"]))?;
        }
        self.content(param, path)
    }

    fn parameter_list(&mut self, owner: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        if let Some(params) = owner.get_mut("parameters").and_then(Value::as_array_mut) {
            for (i, param) in params.iter_mut().enumerate() {
                self.parameter(param, &build_path(path, &["parameters", &i.to_string()]))?;
            }
        }
        Ok(())
    }

    /// `headers: { <name>: header }`
    fn header_map(&mut self, owner: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        if let Some(headers) = owner.get_mut("headers").and_then(Value::as_object_mut) {
            for (name, header) in headers.iter_mut() {
                self.parameter(header, &build_path(path, &["headers", name]))?;
            }
        }
        Ok(())
    }

    fn response(&mut self, response: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        self.content(response, path)?;
        self.header_map(response, path)
    }

    fn operation(&mut self, op: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        self.parameter_list(op, path)?;
        if let Some(body) = op.get_mut("requestBody") {
            self.content(body, &build_path(path, &["requestBody"]))?;
        }
        if let Some(responses) = op.get_mut("responses").and_then(Value::as_object_mut) {
            for (status, response) in responses.iter_mut() {
                self.response(response, &build_path(path, &["responses", status]))?;
            }
        }
        if let Some(callbacks) = op.get_mut("callbacks").and_then(Value::as_object_mut) {
            for (name, callback) in callbacks.iter_mut() {
                self.callback(callback, &build_path(path, &["callbacks", name]))?;
            }
        }
        Ok(())
    }

    /// `{ <expression>: path item }`
    fn callback(&mut self, callback: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        if let Some(items) = callback.as_object_mut() {
            for (expression, item) in items.iter_mut() {
                self.path_item(item, &build_path(path, &[expression]))?;
            }
        }
        Ok(())
    }

    fn path_item(&mut self, item: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        self.parameter_list(item, path)?;
        for method in OPERATION_KEYS {
            if let Some(op) = item.get_mut(*method) {
                self.operation(op, &build_path(path, &[method]))?;
            }
        }
        Ok(())
    }

    /// Each `<key>: path item` of `paths` or `webhooks`.
    fn path_items(&mut self, section: &mut Value, path: &str) -> Result<(), ConsolidateError> {
        if let Some(items) = section.as_object_mut() {
            for (key, item) in items.iter_mut() {
                self.path_item(item, &build_path(path, &[key]))?;
            }
        }
        Ok(())
    }

    fn component_section(
        &mut self,
        section: &str,
        entries: &mut Value,
        path: &str,
    ) -> Result<(), ConsolidateError> {
        let Some(entries) = entries.as_object_mut() else {
            return Ok(());
        };
        for (name, entry) in entries.iter_mut() {
            let entry_path = build_path(path, &[name]);
            match section {
                "parameters" | "headers" => self.parameter(entry, &entry_path)?,
                "requestBodies" => self.content(entry, &entry_path)?,
                "responses" => self.response(entry, &entry_path)?,
                "callbacks" => self.callback(entry, &entry_path)?,
                "pathItems" => self.path_item(entry, &entry_path)?,
                _ => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rewrite
// ---------------------------------------------------------------------------

/// Apply `map` to `document`, returning a new document.
///
/// Materialized canonicals are created first, references are rewritten, and
/// alias definitions are deleted last. An empty map returns an identical
/// copy. Fails with [`ConsolidateError::DanglingReferences`] if the result
/// holds a schema reference that does not resolve and did resolve (or did
/// not exist) in the input.
pub fn rewrite(
    document: &SchemaDocument,
    map: &RenameMap,
) -> Result<SchemaDocument, ConsolidateError> {
    if map.is_empty() {
        return Ok(document.clone());
    }

    let already_dangling: BTreeSet<String> = document
        .dangling_references()
        .into_iter()
        .map(|d| {
            tracing::warn!(path = %d.path, reference = %d.reference, "reference already dangling in input");
            d.reference
        })
        .collect();

    let mut root = document.as_value().clone();
    let mut rewriter = RefRewriter { map, rewritten: 0 };

    let mut schemas = take_schemas(&mut root);
    for (canonical, source) in map.materialized() {
        let body = schemas
            .get(source)
            .cloned()
            .ok_or_else(|| ConsolidateError::SchemaError {
                path: schema_ref(source),
                message: format!("cannot create {canonical}: source definition is missing"),
            })?;
        schemas.insert(canonical.clone(), body);
    }

    // 1. definitions
    for (name, schema) in schemas.iter_mut() {
        rewriter.schema(schema, &schema_ref(name))?;
    }
    for alias in map.aliases().keys() {
        schemas.remove(alias);
    }
    let removed = document.definition_count() + map.materialized().len() - schemas.len();

    // 2. other component sections
    if let Some(components) = root.get_mut("components").and_then(Value::as_object_mut) {
        for section in COMPONENT_SECTIONS {
            if let Some(entries) = components.get_mut(*section) {
                let path = build_path("#/components", &[section]);
                rewriter.component_section(section, entries, &path)?;
            }
        }
        components.insert("schemas".to_string(), Value::Object(schemas));
    }

    // 3. paths, 4. webhooks
    for section in ["paths", "webhooks"] {
        if let Some(items) = root.get_mut(section) {
            rewriter.path_items(items, &build_path("#", &[section]))?;
        }
    }

    let rewritten = SchemaDocument::from_trusted(root);
    let dangling: Vec<_> = rewritten
        .dangling_references()
        .into_iter()
        .filter(|d| !already_dangling.contains(&d.reference))
        .collect();
    if !dangling.is_empty() {
        return Err(ConsolidateError::DanglingReferences {
            references: dangling,
        });
    }

    tracing::debug!(
        references = rewriter.rewritten,
        added = map.materialized().len(),
        removed,
        "rewrote document"
    );
    Ok(rewritten)
}

fn take_schemas(root: &mut Value) -> Map<String, Value> {
    match root
        .get_mut("components")
        .and_then(|c| c.get_mut("schemas"))
        .map(std::mem::take)
    {
        Some(Value::Object(schemas)) => schemas,
        _ => Map::new(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
