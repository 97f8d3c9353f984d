//! Context collection - pairs each populated schema node with its custom validators.

use std::sync::Arc;

use serde_json::Value;

use crate::custom::{CustomValidator, ValidatorRegistry};
use crate::error::{CollectError, ResolveError};
use crate::resolver::property_schema;
use crate::schema::{SchemaKind, SchemaNode};
use crate::types::Path;

/// Everything needed to run one custom validator at one document location.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub validator_name: String,
    pub validator: CustomValidator,
    /// Absolute path of the node within the document.
    pub paths: Path,
    pub schema: Arc<SchemaNode>,
    /// Value found at the node when the context was collected.
    pub value: Value,
    /// Set by the validator's asynchronous check once it completes.
    pub data: Option<Value>,
}

impl ValidationContext {
    pub fn is_async(&self) -> bool {
        self.validator.is_async()
    }
}

/// Collect a context for every (node, validator) pair the value populates.
///
/// `base_path` is where `value` sits within the whole document; emitted
/// contexts carry `base_path` joined with the path walked below it. Nodes the
/// value does not populate (absent or `null`) produce no contexts.
///
/// # Errors
///
/// Returns `CollectError::UnknownValidator` when a populated node names a
/// validator missing from `registry`, or `CollectError::InvalidPath` when the
/// value holds an object key the schema forbids.
pub fn collect(
    registry: &ValidatorRegistry,
    schema: &Arc<SchemaNode>,
    value: Option<&Value>,
    base_path: &Path,
) -> Result<Vec<ValidationContext>, CollectError> {
    let mut contexts = Vec::new();
    collect_into(registry, schema, value, base_path, &mut contexts)?;
    Ok(contexts)
}

fn collect_into(
    registry: &ValidatorRegistry,
    schema: &Arc<SchemaNode>,
    value: Option<&Value>,
    path: &Path,
    out: &mut Vec<ValidationContext>,
) -> Result<(), CollectError> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(());
    };

    for name in &schema.validators {
        let validator = registry
            .get(name)
            .ok_or_else(|| CollectError::UnknownValidator {
                name: name.clone(),
                path: path.clone(),
            })?;
        out.push(ValidationContext {
            validator_name: name.clone(),
            validator: validator.clone(),
            paths: path.clone(),
            schema: Arc::clone(schema),
            value: value.clone(),
            data: None,
        });
    }

    match (&schema.kind, value) {
        (SchemaKind::Object { .. }, Value::Object(map)) => {
            for (key, child) in map {
                let child_path = path.child(key.as_str());
                let child_schema =
                    property_schema(schema, key).ok_or_else(|| ResolveError::UnknownProperty {
                        path: child_path.clone(),
                        property: key.clone(),
                    })?;
                collect_into(registry, &child_schema, Some(child), &child_path, out)?;
            }
        }
        (SchemaKind::Array { items }, Value::Array(elements)) => {
            for (index, element) in elements.iter().enumerate() {
                collect_into(registry, items, Some(element), &path.child(index), out)?;
            }
        }
        _ => {}
    }

    Ok(())
}
