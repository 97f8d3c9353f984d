//! Typed view of a JSON Schema document.
//!
//! Only the keywords needed to walk a schema alongside a document are
//! interpreted: `type`, `properties`, `patternProperties`,
//! `additionalProperties`, `items`, and the custom `validators` list.
//! Everything else stays in [`SchemaNode::raw`] for the structural
//! validator and for custom validators that read their own keywords.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::RegistryError;

/// Keyword listing custom validator names on a schema node.
pub const VALIDATORS_KEYWORD: &str = "validators";

/// What may appear under keys not matched by `properties` or `patternProperties`.
#[derive(Debug, Clone)]
pub enum AdditionalProperties {
    /// Absent or `true`: anything goes.
    Permissive,
    /// `false`: unknown keys are rejected.
    Forbidden,
    /// A schema every unknown key must satisfy.
    Schema(Arc<SchemaNode>),
}

/// Kind-specific structure of a schema node.
#[derive(Debug, Clone)]
pub enum SchemaKind {
    Object {
        properties: HashMap<String, Arc<SchemaNode>>,
        /// Declaration order is preserved; the first matching pattern wins.
        pattern_properties: Vec<(Regex, Arc<SchemaNode>)>,
        additional: AdditionalProperties,
    },
    Array {
        items: Arc<SchemaNode>,
    },
    String,
    /// Numbers, booleans, null, and untyped nodes.
    Other,
}

/// One node of a parsed schema tree.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    /// Custom validator names, in declaration order.
    pub validators: Vec<String>,
    /// The node's keywords as written.
    pub raw: Value,
}

impl SchemaNode {
    /// The empty schema: accepts any value and carries no validators.
    pub fn permissive() -> Self {
        Self {
            kind: SchemaKind::Other,
            validators: Vec::new(),
            raw: Value::Object(Map::new()),
        }
    }

    /// Parse a schema document into a typed tree.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidPattern` for a `patternProperties` key
    /// that is not a valid regex, or `RegistryError::InvalidValidators` when
    /// `validators` is not an array of strings.
    pub fn from_value(value: &Value) -> Result<Self, RegistryError> {
        parse_node(value, "")
    }

    /// Short name of the node's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            SchemaKind::Object { .. } => "object",
            SchemaKind::Array { .. } => "array",
            SchemaKind::String => "string",
            SchemaKind::Other => match self.declared_type() {
                Some("number") => "number",
                Some("integer") => "integer",
                Some("boolean") => "boolean",
                Some("null") => "null",
                _ => "untyped",
            },
        }
    }

    fn declared_type(&self) -> Option<&str> {
        declared_type(&self.raw)
    }

    /// Look up the raw value of a keyword on this node.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }
}

/// The `type` keyword as a single name.
///
/// For a list of types the first entry other than `"null"` decides.
pub fn declared_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

fn parse_node(value: &Value, path: &str) -> Result<SchemaNode, RegistryError> {
    // Boolean schemas and other non-objects behave like the empty schema.
    let Some(map) = value.as_object() else {
        return Ok(SchemaNode {
            raw: value.clone(),
            ..SchemaNode::permissive()
        });
    };

    let validators = parse_validators(map.get(VALIDATORS_KEYWORD), path)?;

    let kind = match declared_type(value) {
        Some("object") => parse_object(map, path)?,
        Some("array") => {
            let items = match map.get("items") {
                Some(items) => parse_node(items, &format!("{}/items", path))?,
                None => SchemaNode::permissive(),
            };
            SchemaKind::Array {
                items: Arc::new(items),
            }
        }
        Some("string") => SchemaKind::String,
        _ => SchemaKind::Other,
    };

    Ok(SchemaNode {
        kind,
        validators,
        raw: value.clone(),
    })
}

fn parse_object(map: &Map<String, Value>, path: &str) -> Result<SchemaKind, RegistryError> {
    let mut properties = HashMap::new();
    if let Some(Value::Object(props)) = map.get("properties") {
        for (name, prop) in props {
            let prop_path = format!("{}/properties/{}", path, name);
            properties.insert(name.clone(), Arc::new(parse_node(prop, &prop_path)?));
        }
    }

    let mut pattern_properties = Vec::new();
    if let Some(Value::Object(patterns)) = map.get("patternProperties") {
        for (pattern, prop) in patterns {
            let prop_path = format!("{}/patternProperties/{}", path, pattern);
            let regex = Regex::new(pattern).map_err(|e| RegistryError::InvalidPattern {
                path: prop_path.clone(),
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            pattern_properties.push((regex, Arc::new(parse_node(prop, &prop_path)?)));
        }
    }

    let additional = match map.get("additionalProperties") {
        None | Some(Value::Bool(true)) => AdditionalProperties::Permissive,
        Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
        Some(schema) => AdditionalProperties::Schema(Arc::new(parse_node(
            schema,
            &format!("{}/additionalProperties", path),
        )?)),
    };

    Ok(SchemaKind::Object {
        properties,
        pattern_properties,
        additional,
    })
}

fn parse_validators(value: Option<&Value>, path: &str) -> Result<Vec<String>, RegistryError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let invalid = || RegistryError::InvalidValidators {
        path: format!("{}/{}", path, VALIDATORS_KEYWORD),
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|name| name.as_str().map(String::from).ok_or_else(invalid))
        .collect()
}
