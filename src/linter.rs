//! Registry linting - static analysis of collection schemas.
//!
//! Checks every collection schema for:
//! - Schemas the structural validator cannot compile
//! - Invalid `patternProperties` regexes
//! - Malformed `validators` keywords
//! - Validator names nobody registered
//! - Object-shaped nodes without a `type`, which path resolution treats as leaves

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::loader::SchemaMap;
use crate::schema::{declared_type, VALIDATORS_KEYWORD};
use crate::validator::JsonSchemaBackend;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub collection: String,
    /// JSON path to the issue within the schema (e.g. "/properties/id/validators")
    pub path: String,
    pub message: String,
}

/// Result of linting one collection schema.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub collection: String,
    pub status: CollectionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a whole registry.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub collections_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<CollectionResult>,
}

impl LintResult {
    /// Returns true if all collections passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint every collection in `schemas`.
///
/// Validator names outside `known_validators` are reported as warnings,
/// or as errors when `strict` is true.
pub fn lint_registry(
    schemas: &SchemaMap,
    known_validators: &[String],
    strict: bool,
) -> LintResult {
    let results: Vec<CollectionResult> = schemas
        .iter()
        .map(|(collection, schema)| {
            lint_collection(collection, schema, known_validators, strict)
        })
        .collect();

    let count = |severity: Severity| {
        results
            .iter()
            .flat_map(|r| &r.diagnostics)
            .filter(|d| d.severity == severity)
            .count()
    };
    let errors = count(Severity::Error);
    let warnings = count(Severity::Warning);
    let failed = results
        .iter()
        .filter(|r| r.status == CollectionStatus::Error)
        .count();

    LintResult {
        collections_checked: results.len(),
        passed: results.len() - failed,
        failed,
        errors,
        warnings,
        results,
    }
}

/// Lint a single collection schema.
pub fn lint_collection(
    collection: &str,
    schema: &Value,
    known_validators: &[String],
    strict: bool,
) -> CollectionResult {
    let mut diagnostics = Vec::new();

    // Compile with the structural backend (syntax and meta-schema)
    let mut single = BTreeMap::new();
    single.insert(collection.to_string(), schema.clone());
    if let Err(e) = JsonSchemaBackend::compile(&single, &[]) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: "E001".to_string(),
            collection: collection.to_string(),
            path: "/".to_string(),
            message: e.to_string(),
        });
    }

    let mut walker = Walker {
        collection,
        known_validators,
        strict,
        diagnostics: &mut diagnostics,
    };
    walker.check_node(schema, "");

    let status = if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        CollectionStatus::Error
    } else if diagnostics.is_empty() {
        CollectionStatus::Ok
    } else {
        CollectionStatus::Warning
    };

    CollectionResult {
        collection: collection.to_string(),
        status,
        diagnostics,
    }
}

struct Walker<'a> {
    collection: &'a str,
    known_validators: &'a [String],
    strict: bool,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Walker<'_> {
    fn report(&mut self, severity: Severity, code: &str, path: String, message: String) {
        self.diagnostics.push(Diagnostic {
            severity,
            code: code.to_string(),
            collection: self.collection.to_string(),
            path: if path.is_empty() { "/".to_string() } else { path },
            message,
        });
    }

    fn check_node(&mut self, node: &Value, path: &str) {
        let Some(map) = node.as_object() else {
            return;
        };

        if let Some(validators) = map.get(VALIDATORS_KEYWORD) {
            self.check_validators(validators, &format!("{}/{}", path, VALIDATORS_KEYWORD));
        }

        if declared_type(node).is_none() && map.contains_key("properties") {
            self.report(
                Severity::Warning,
                "W002",
                path.to_string(),
                "node has properties but no type; paths below it cannot be resolved".to_string(),
            );
        }

        if let Some(Value::Object(props)) = map.get("properties") {
            for (name, prop) in props {
                self.check_node(prop, &format!("{}/properties/{}", path, name));
            }
        }

        if let Some(Value::Object(patterns)) = map.get("patternProperties") {
            for (pattern, prop) in patterns {
                let prop_path = format!("{}/patternProperties/{}", path, pattern);
                if let Err(e) = Regex::new(pattern) {
                    self.report(
                        Severity::Error,
                        "E002",
                        prop_path.clone(),
                        format!("invalid pattern \"{}\": {}", pattern, e),
                    );
                }
                self.check_node(prop, &prop_path);
            }
        }

        for key in ["items", "additionalProperties"] {
            if let Some(child) = map.get(key) {
                self.check_node(child, &format!("{}/{}", path, key));
            }
        }
    }

    fn check_validators(&mut self, validators: &Value, path: &str) {
        let Some(names) = validators.as_array() else {
            self.report(
                Severity::Error,
                "E003",
                path.to_string(),
                "validators must be an array of strings".to_string(),
            );
            return;
        };

        for (i, name) in names.iter().enumerate() {
            let item_path = format!("{}/{}", path, i);
            match name.as_str() {
                None => self.report(
                    Severity::Error,
                    "E003",
                    item_path,
                    "validator name must be a string".to_string(),
                ),
                Some(name) if !self.known_validators.iter().any(|k| k == name) => {
                    let severity = if self.strict {
                        Severity::Error
                    } else {
                        Severity::Warning
                    };
                    self.report(
                        severity,
                        "W001",
                        item_path,
                        format!("validator \"{}\" is not registered", name),
                    );
                }
                Some(_) => {}
            }
        }
    }
}
