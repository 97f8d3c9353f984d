//! Path resolution - finds the sub-schema that governs a document location.

use std::sync::Arc;

use crate::error::ResolveError;
use crate::schema::{AdditionalProperties, SchemaKind, SchemaNode};
use crate::types::{Path, PathSegment};

/// Resolve the schema that applies at `path` within a document described by `schema`.
///
/// Arrays resolve every position to `items`. A string node ends the walk: any
/// remaining segments address characters for string edits, so the string's
/// own schema is returned.
///
/// # Errors
///
/// Returns `ResolveError` carrying the path up to and including the segment
/// that could not be mapped.
pub fn resolve(schema: &Arc<SchemaNode>, path: &Path) -> Result<Arc<SchemaNode>, ResolveError> {
    resolve_segments(schema, path.segments(), &mut Path::root())
}

/// Look up the schema for one object key: `properties`, then the first
/// matching `patternProperties` entry, then `additionalProperties`.
///
/// Returns `None` when the key is not allowed (`additionalProperties: false`).
/// Non-object schemas never match.
pub fn property_schema(schema: &SchemaNode, key: &str) -> Option<Arc<SchemaNode>> {
    let SchemaKind::Object {
        properties,
        pattern_properties,
        additional,
    } = &schema.kind
    else {
        return None;
    };

    if let Some(prop) = properties.get(key) {
        return Some(Arc::clone(prop));
    }

    if let Some((_, prop)) = pattern_properties
        .iter()
        .find(|(pattern, _)| pattern.is_match(key))
    {
        return Some(Arc::clone(prop));
    }

    match additional {
        AdditionalProperties::Permissive => Some(Arc::new(SchemaNode::permissive())),
        AdditionalProperties::Schema(node) => Some(Arc::clone(node)),
        AdditionalProperties::Forbidden => None,
    }
}

// --- Internal implementation ---

fn resolve_segments(
    schema: &Arc<SchemaNode>,
    segments: &[PathSegment],
    walked: &mut Path,
) -> Result<Arc<SchemaNode>, ResolveError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(Arc::clone(schema));
    };

    match &schema.kind {
        SchemaKind::Object { .. } => {
            walked.push(segment.clone());
            let key = segment.as_key();
            let child =
                property_schema(schema, &key).ok_or_else(|| ResolveError::UnknownProperty {
                    path: walked.clone(),
                    property: key.into_owned(),
                })?;
            resolve_segments(&child, rest, walked)
        }
        SchemaKind::Array { items } => {
            walked.push(segment.clone());
            resolve_segments(items, rest, walked)
        }
        SchemaKind::String => Ok(Arc::clone(schema)),
        SchemaKind::Other => {
            walked.push(segment.clone());
            Err(ResolveError::NotAContainer {
                path: walked.clone(),
                kind: schema.kind_name(),
            })
        }
    }
}
