//! Document validation: structural schema checks plus synchronous custom validators.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

use crate::context::ValidationContext;
use crate::error::{RegistryError, ValidationFailure, ValidationIssue};
use crate::types::{is_falsy, Path, PathSegment};

/// One built-in constraint failure, as reported by a structural validator.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralViolation {
    /// Pointer to the failing instance, `#/a/b/[3]` style: array positions
    /// are bracketed, the root is `#/`.
    pub path: String,
    pub message: String,
    /// Property the violation is about, when it is not part of `path`
    /// (e.g. the missing name of a `required` failure).
    pub property: Option<String>,
}

/// Outcome of validating a whole document against its collection schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralReport {
    pub valid: bool,
    pub errors: Vec<StructuralViolation>,
}

/// Checks built-in schema constraints (type, required, bounds, pattern, enum).
///
/// Always invoked with the complete document: paths are only fully
/// qualified when validation starts at the root.
pub trait StructuralValidator: Send + Sync {
    fn validate(&self, collection: &str, document: &Value) -> StructuralReport;
}

/// Predicate for a custom string `format`.
pub type FormatCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// [`StructuralValidator`] backed by the `jsonschema` crate, with one
/// compiled validator per collection.
pub struct JsonSchemaBackend {
    validators: HashMap<String, jsonschema::Validator>,
}

impl JsonSchemaBackend {
    /// Compile every collection schema.
    ///
    /// Registering any format turns format assertion on.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidSchema` if a schema does not compile
    /// (including failing the meta-schema).
    pub fn compile(
        schemas: &BTreeMap<String, Value>,
        formats: &[(String, FormatCheck)],
    ) -> Result<Self, RegistryError> {
        let mut validators = HashMap::new();
        for (collection, schema) in schemas {
            let mut options = jsonschema::options();
            for (name, check) in formats {
                let check = Arc::clone(check);
                options.with_format(name.clone(), move |s: &str| check(s));
            }
            if !formats.is_empty() {
                options.should_validate_formats(true);
            }
            let validator = options
                .build(schema)
                .map_err(|e| RegistryError::InvalidSchema {
                    collection: collection.clone(),
                    message: e.to_string(),
                })?;
            validators.insert(collection.clone(), validator);
        }
        Ok(Self { validators })
    }
}

impl std::fmt::Debug for JsonSchemaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut collections: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        collections.sort();
        f.debug_struct("JsonSchemaBackend")
            .field("collections", &collections)
            .finish()
    }
}

impl StructuralValidator for JsonSchemaBackend {
    fn validate(&self, collection: &str, document: &Value) -> StructuralReport {
        let Some(validator) = self.validators.get(collection) else {
            return StructuralReport {
                valid: false,
                errors: vec![StructuralViolation {
                    path: "#/".to_string(),
                    message: format!("no compiled schema for collection {}", collection),
                    property: None,
                }],
            };
        };

        let errors: Vec<StructuralViolation> = validator
            .iter_errors(document)
            .map(|e| {
                let property = match &e.kind {
                    ValidationErrorKind::Required { property } => {
                        property.as_str().map(String::from)
                    }
                    _ => None,
                };
                StructuralViolation {
                    path: bracketed_pointer(&e.instance_path.to_string(), document),
                    message: e.to_string(),
                    property,
                }
            })
            .collect();

        StructuralReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate `document` structurally and with every synchronous custom check.
///
/// Custom checks read the value stored at their context's path in
/// `document`; a context whose value is absent or falsy (see [`is_falsy`])
/// is skipped.
/// Structural issues come first, then custom issues in context order.
/// Returns `None` when nothing failed.
pub fn execute(
    structural: &dyn StructuralValidator,
    collection: &str,
    document: &Value,
    contexts: &[ValidationContext],
) -> Option<ValidationFailure> {
    let report = structural.validate(collection, document);
    let mut issues: Vec<ValidationIssue> = if report.valid {
        Vec::new()
    } else {
        report
            .errors
            .into_iter()
            .map(|violation| {
                let paths = parse_violation_path(&violation.path, violation.property.as_deref());
                ValidationIssue::structural(violation.message, paths)
            })
            .collect()
    };

    for ctx in contexts {
        let Some(check) = ctx.validator.sync_check() else {
            continue;
        };
        let Some(value) = ctx.paths.lookup(document).filter(|v| !is_falsy(v)) else {
            continue;
        };
        if let Err(violation) = check(value, ctx) {
            issues.push(ValidationIssue::custom(
                ctx.validator_name.clone(),
                violation.message,
                ctx.paths.clone(),
            ));
        }
    }

    ValidationFailure::from_issues(issues)
}

/// Convert a structural violation pointer into a document path.
///
/// `#/a/b/[3]` becomes `["a", "b", 3]`; `property`, when given, is appended.
pub fn parse_violation_path(pointer: &str, property: Option<&str>) -> Path {
    let mut parts = pointer.split('/');
    let mut path = Path::root();

    if let Some(first) = parts.next() {
        if !first.is_empty() && first != "#" {
            path.push(parse_pointer_segment(first));
        }
    }
    for part in parts.filter(|p| !p.is_empty()) {
        path.push(parse_pointer_segment(part));
    }

    if let Some(property) = property {
        path.push(property);
    }
    path
}

fn parse_pointer_segment(part: &str) -> PathSegment {
    if let Some(inner) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
        if let Ok(index) = inner.parse::<usize>() {
            return PathSegment::Index(index);
        }
    }
    PathSegment::Key(part.replace("~1", "/").replace("~0", "~"))
}

/// Rewrite an RFC 6901 instance pointer into the bracketed form, walking
/// `document` to tell array positions from numeric object keys.
fn bracketed_pointer(pointer: &str, document: &Value) -> String {
    let mut out = String::from("#");
    let mut current = Some(document);

    for raw in pointer.split('/').skip(1) {
        let key = raw.replace("~1", "/").replace("~0", "~");
        match (current, key.parse::<usize>()) {
            (Some(Value::Array(items)), Ok(index)) => {
                out.push_str(&format!("/[{}]", index));
                current = items.get(index);
            }
            (node, _) => {
                out.push('/');
                out.push_str(raw);
                current = node.and_then(|v| v.get(&key));
            }
        }
    }

    if out.len() == 1 {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::{CustomValidator, CustomViolation};
    use crate::schema::SchemaNode;
    use serde_json::json;

    fn backend(schema: Value) -> JsonSchemaBackend {
        let mut schemas = BTreeMap::new();
        schemas.insert("docs".to_string(), schema);
        JsonSchemaBackend::compile(&schemas, &[]).unwrap()
    }

    fn sync_context(name: &str, path: &str, validator: CustomValidator) -> ValidationContext {
        ValidationContext {
            validator_name: name.to_string(),
            validator,
            paths: Path::parse(path),
            schema: Arc::new(SchemaNode::permissive()),
            value: Value::Null,
            data: None,
        }
    }

    #[test]
    fn parses_bracketed_pointer() {
        assert_eq!(
            parse_violation_path("#/a/b/[3]", None),
            Path::new(vec!["a".into(), "b".into(), 3.into()])
        );
        assert_eq!(
            parse_violation_path("#/a/b/[3]", Some("c")),
            Path::new(vec!["a".into(), "b".into(), 3.into(), "c".into()])
        );
        assert_eq!(parse_violation_path("#/", None), Path::root());
        assert_eq!(parse_violation_path("#/", Some("name")), Path::parse("name"));
    }

    #[test]
    fn pointer_segments_unescape() {
        assert_eq!(
            parse_violation_path("#/a~1b/c~0d", None),
            Path::new(vec!["a/b".into(), "c~d".into()])
        );
        // Brackets without a number stay a key.
        assert_eq!(
            parse_violation_path("#/[x]", None),
            Path::new(vec!["[x]".into()])
        );
    }

    #[test]
    fn bracketed_pointer_distinguishes_arrays() {
        let doc = json!({ "list": [{ "7": 1 }], "map": { "0": true } });
        assert_eq!(bracketed_pointer("/list/0/7", &doc), "#/list/[0]/7");
        assert_eq!(bracketed_pointer("/map/0", &doc), "#/map/0");
        assert_eq!(bracketed_pointer("", &doc), "#/");
    }

    #[test]
    fn valid_document_has_no_failure() {
        let backend = backend(json!({
            "type": "object",
            "properties": { "age": { "type": "number", "minimum": 0 } }
        }));
        assert!(execute(&backend, "docs", &json!({ "age": 5 }), &[]).is_none());
    }

    #[test]
    fn minimum_violation_is_path_qualified() {
        let backend = backend(json!({
            "type": "object",
            "properties": { "age": { "type": "number", "minimum": 0 } }
        }));
        let failure = execute(&backend, "docs", &json!({ "age": -1 }), &[]).unwrap();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].paths, Path::parse("age"));
    }

    #[test]
    fn required_violation_appends_property() {
        let backend = backend(json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "object",
                    "required": ["name"],
                    "properties": { "name": { "type": "string" } }
                }
            }
        }));
        let failure = execute(&backend, "docs", &json!({ "owner": {} }), &[]).unwrap();
        assert_eq!(failure.errors[0].paths, Path::parse("owner/name"));
    }

    #[test]
    fn array_violation_uses_index_segment() {
        let backend = backend(json!({
            "type": "object",
            "properties": {
                "scores": { "type": "array", "items": { "type": "number", "maximum": 10 } }
            }
        }));
        let failure = execute(&backend, "docs", &json!({ "scores": [1, 11] }), &[]).unwrap();
        assert_eq!(
            failure.errors[0].paths,
            Path::new(vec!["scores".into(), 1.into()])
        );
    }

    #[test]
    fn sync_checks_run_against_stored_value() {
        let backend = backend(json!({ "type": "object" }));
        let at_most_ten = CustomValidator::new().with_sync(|value, _| {
            if value.as_i64().unwrap_or(0) > 10 {
                Err(CustomViolation::new("must be at most 10"))
            } else {
                Ok(())
            }
        });
        let contexts = vec![sync_context("max", "count", at_most_ten)];

        assert!(execute(&backend, "docs", &json!({ "count": 10 }), &contexts).is_none());
        let failure = execute(&backend, "docs", &json!({ "count": 11 }), &contexts).unwrap();
        assert_eq!(failure.errors[0].paths, Path::parse("count"));
        assert_eq!(failure.errors[0].validator.as_deref(), Some("max"));
    }

    #[test]
    fn absent_values_skip_sync_checks() {
        let backend = backend(json!({ "type": "object" }));
        let always_fails =
            CustomValidator::new().with_sync(|_, _| Err(CustomViolation::new("never valid")));
        let contexts = vec![sync_context("strict", "missing", always_fails.clone())];
        assert!(execute(&backend, "docs", &json!({}), &contexts).is_none());

        let contexts = vec![sync_context("strict", "gone", always_fails)];
        assert!(execute(&backend, "docs", &json!({ "gone": null }), &contexts).is_none());
    }

    #[test]
    fn falsy_values_skip_sync_checks() {
        let backend = backend(json!({ "type": "object" }));
        let always_fails =
            CustomValidator::new().with_sync(|_, _| Err(CustomViolation::new("never valid")));
        let contexts = vec![sync_context("strict", "v", always_fails)];

        for stored in [json!(0), json!(0.0), json!(""), json!(false)] {
            let document = json!({ "v": stored });
            assert!(execute(&backend, "docs", &document, &contexts).is_none());
        }
        for stored in [json!(1), json!("x"), json!(true), json!([]), json!({})] {
            let document = json!({ "v": stored });
            assert!(execute(&backend, "docs", &document, &contexts).is_some());
        }
    }

    #[test]
    fn structural_and_custom_issues_concatenate() {
        let backend = backend(json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        }));
        let always_fails =
            CustomValidator::new().with_sync(|_, _| Err(CustomViolation::new("rejected")));
        let contexts = vec![sync_context("strict", "", always_fails)];

        let failure = execute(&backend, "docs", &json!({ "name": 3 }), &contexts).unwrap();
        assert_eq!(failure.errors.len(), 2);
        assert_eq!(failure.errors[0].paths, Path::parse("name"));
        assert_eq!(failure.errors[1].paths, Path::root());
        assert_eq!(failure.errors[1].message, "rejected");
    }

    #[test]
    fn invalid_schema_fails_to_compile() {
        let mut schemas = BTreeMap::new();
        schemas.insert("bad".to_string(), json!({ "type": 12 }));
        let result = JsonSchemaBackend::compile(&schemas, &[]);
        assert!(matches!(
            result,
            Err(RegistryError::InvalidSchema { collection, .. }) if collection == "bad"
        ));
    }

    #[test]
    fn registered_formats_are_asserted() {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "docs".to_string(),
            json!({
                "type": "object",
                "properties": { "sku": { "type": "string", "format": "sku" } }
            }),
        );
        let sku: FormatCheck = Arc::new(|s: &str| s.starts_with("SKU-"));
        let backend = JsonSchemaBackend::compile(&schemas, &[("sku".to_string(), sku)]).unwrap();

        assert!(execute(&backend, "docs", &json!({ "sku": "SKU-1" }), &[]).is_none());
        let failure = execute(&backend, "docs", &json!({ "sku": "nope" }), &[]).unwrap();
        assert_eq!(failure.errors[0].paths, Path::parse("sku"));
    }
}
