//! Error types for schema consolidation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes.
///
/// These codes are part of the report contract consumed by CI tooling. Variant
/// names and their serialized `snake_case` strings must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// JSON (de)serialization error (malformed input or encoding failure).
    JsonParseError,
    /// The document has no `components.schemas` object.
    MissingSchemaContainer,
    /// Structurally invalid container or definition.
    SchemaError,
    /// Nesting deeper than the configured limit.
    RecursionDepthExceeded,
    /// A user-supplied naming rule does not compile.
    InvalidNamingRule,
    /// Two groups chose the same canonical name and the policy forbids suffixing.
    NamingConflict,
    /// A rename chain loops back on itself.
    CyclicRename,
    /// A manual rename targets a definition that still exists.
    RenameTargetExists,
    /// References left unresolved after rewriting.
    DanglingReferences,
}

/// One unresolved pointer found by the post-rewrite audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingRef {
    /// JSON Pointer of the `$ref` site.
    pub path: String,
    /// The pointer value that failed to resolve.
    pub reference: String,
}

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error("JSON (de)serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Document has no schema container at {path}")]
    MissingSchemaContainer { path: String },

    #[error("Schema error at {path}: {message}")]
    SchemaError { path: String, message: String },

    #[error("Recursion depth exceeded at {path} (max: {max_depth})")]
    RecursionDepthExceeded { path: String, max_depth: usize },

    #[error("Invalid naming rule pattern {pattern:?}: {message}")]
    InvalidNamingRule { pattern: String, message: String },

    #[error("Canonical name {canonical} chosen by more than one group: {groups:?}")]
    NamingConflict {
        canonical: String,
        groups: Vec<Vec<String>>,
    },

    #[error("Rename chain is cyclic: {}", names.join(" -> "))]
    CyclicRename { names: Vec<String> },

    #[error("Cannot rename {alias} to {target}: a definition named {target} already exists")]
    RenameTargetExists { alias: String, target: String },

    #[error("{} dangling reference(s) after rewrite", references.len())]
    DanglingReferences { references: Vec<DanglingRef> },
}

impl ConsolidateError {
    /// Returns the stable error code for this error variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ConsolidateError::JsonError(_) => ErrorCode::JsonParseError,
            ConsolidateError::MissingSchemaContainer { .. } => ErrorCode::MissingSchemaContainer,
            ConsolidateError::SchemaError { .. } => ErrorCode::SchemaError,
            ConsolidateError::RecursionDepthExceeded { .. } => ErrorCode::RecursionDepthExceeded,
            ConsolidateError::InvalidNamingRule { .. } => ErrorCode::InvalidNamingRule,
            ConsolidateError::NamingConflict { .. } => ErrorCode::NamingConflict,
            ConsolidateError::CyclicRename { .. } => ErrorCode::CyclicRename,
            ConsolidateError::RenameTargetExists { .. } => ErrorCode::RenameTargetExists,
            ConsolidateError::DanglingReferences { .. } => ErrorCode::DanglingReferences,
        }
    }

    /// Returns the document path context, if available.
    pub fn path(&self) -> Option<&str> {
        match self {
            ConsolidateError::MissingSchemaContainer { path } => Some(path),
            ConsolidateError::SchemaError { path, .. } => Some(path),
            ConsolidateError::RecursionDepthExceeded { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Produces a structured JSON error.
    ///
    /// Format: `{"code": "...", "message": "...", "path": "..." | null, "details": ...}`
    /// where `details` carries the offending names or pointers.
    pub fn to_json(&self) -> serde_json::Value {
        let details = match self {
            ConsolidateError::NamingConflict { canonical, groups } => serde_json::json!({
                "canonical": canonical,
                "groups": groups,
            }),
            ConsolidateError::CyclicRename { names } => serde_json::json!({ "names": names }),
            ConsolidateError::RenameTargetExists { alias, target } => serde_json::json!({
                "alias": alias,
                "target": target,
            }),
            ConsolidateError::DanglingReferences { references } => {
                serde_json::json!({ "references": references })
            }
            ConsolidateError::InvalidNamingRule { pattern, .. } => {
                serde_json::json!({ "pattern": pattern })
            }
            _ => serde_json::Value::Null,
        };
        serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "path": self.path(),
            "details": details,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_value(ErrorCode::DanglingReferences).unwrap();
        assert_eq!(json, json!("dangling_references"));
    }

    #[test]
    fn test_error_code_round_trips() {
        let code = ErrorCode::NamingConflict;
        let json_str = serde_json::to_string(&code).unwrap();
        let deserialized: ErrorCode = serde_json::from_str(&json_str).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_dangling_to_json_carries_pointers() {
        let err = ConsolidateError::DanglingReferences {
            references: vec![DanglingRef {
                path: "#/paths/~1users/get".to_string(),
                reference: "#/components/schemas/Gone".to_string(),
            }],
        };

        let json = err.to_json();
        assert_eq!(json["code"], json!("dangling_references"));
        assert_eq!(json["path"], json!(null));
        assert_eq!(
            json["details"]["references"][0]["reference"],
            json!("#/components/schemas/Gone")
        );
        assert!(json["message"].as_str().unwrap().starts_with("1 dangling"));
    }

    #[test]
    fn test_conflict_display_names_groups() {
        let err = ConsolidateError::NamingConflict {
            canonical: "DeleteResponse".to_string(),
            groups: vec![
                vec!["DeleteHostResponseDto".to_string()],
                vec!["DeleteNodeResponseDto".to_string()],
            ],
        };
        let display = err.to_string();
        assert!(display.contains("DeleteResponse"));
        assert!(display.contains("DeleteNodeResponseDto"));
        assert_eq!(err.error_code(), ErrorCode::NamingConflict);
    }

    #[test]
    fn test_cyclic_rename_display() {
        let err = ConsolidateError::CyclicRename {
            names: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(err.to_string(), "Rename chain is cyclic: A -> B -> A");
    }

    #[test]
    fn test_path_context() {
        let err = ConsolidateError::MissingSchemaContainer {
            path: "#/components/schemas".to_string(),
        };
        assert_eq!(err.path(), Some("#/components/schemas"));
        assert_eq!(err.to_json()["code"], json!("missing_schema_container"));
    }
}
