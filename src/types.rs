//! Core types: document paths, edits, and write requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// True for values that do not count as set: `null`, `false`, zero, and
/// the empty string. Arrays and objects are always set, even when empty.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0 || f.is_nan()),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// One step into a document: a property name or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    /// The segment as an object key. Indices render as their decimal form.
    pub fn as_key(&self) -> std::borrow::Cow<'_, str> {
        match self {
            PathSegment::Key(k) => std::borrow::Cow::Borrowed(k),
            PathSegment::Index(i) => std::borrow::Cow::Owned(i.to_string()),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Key(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        PathSegment::Key(s)
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::Index(i)
    }
}

/// Location inside a document. The empty path is the document root.
///
/// Serializes as a plain JSON array, e.g. `["items", 3, "name"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    /// Returns `self ++ other`.
    pub fn join(&self, other: &Path) -> Self {
        let mut next = self.clone();
        next.0.extend(other.0.iter().cloned());
        next
    }

    /// Look up the value stored at this path.
    ///
    /// Index segments also address object keys by their decimal form, and
    /// key segments that parse as integers address array positions, so a path
    /// read from loosely typed input still finds its target.
    pub fn lookup<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for segment in &self.0 {
            current = match (current, segment) {
                (Value::Object(map), seg) => map.get(seg.as_key().as_ref())?,
                (Value::Array(arr), PathSegment::Index(i)) => arr.get(*i)?,
                (Value::Array(arr), PathSegment::Key(k)) => arr.get(k.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Parse a slash-separated path such as `items/0/name`.
    ///
    /// Purely numeric segments become indices.
    pub fn parse(s: &str) -> Self {
        let segments = s
            .trim_start_matches('/')
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<usize>() {
                Ok(i) => PathSegment::Index(i),
                Err(_) => PathSegment::Key(part.to_string()),
            })
            .collect();
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The payload of one elementary edit.
///
/// Field names follow the op components emitted by path-addressed JSON
/// stores: `oi`/`od` for object insert/delete, `li`/`ld` for list
/// insert/delete, `lm` for list move, `na` for numeric add, `si`/`sd` for
/// string insert/delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub od: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub li: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ld: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub na: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub si: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
}

impl Edit {
    pub fn object_set(value: Value) -> Self {
        Self {
            oi: Some(value),
            ..Self::default()
        }
    }

    pub fn list_insert(value: Value) -> Self {
        Self {
            li: Some(value),
            ..Self::default()
        }
    }

    pub fn number_add(amount: impl Into<Value>) -> Self {
        Self {
            na: Some(amount.into()),
            ..Self::default()
        }
    }

    pub fn string_insert(text: impl Into<String>) -> Self {
        Self {
            si: Some(text.into()),
            ..Self::default()
        }
    }

    /// The value this edit proposes, used to collect custom validators
    /// before the edit is applied.
    ///
    /// Object sets win over list inserts, which win over numeric adds.
    /// Deletes, moves and string edits carry no new value. Precedence goes
    /// by presence, not truthiness: an edit carrying both `oi: 0` and `li`
    /// proposes `0`.
    pub fn new_value(&self) -> Option<&Value> {
        self.oi
            .as_ref()
            .or(self.li.as_ref())
            .or(self.na.as_ref())
    }
}

/// One edit addressed at a path within the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOp {
    #[serde(rename = "p")]
    pub path: Path,
    #[serde(flatten)]
    pub edit: Edit,
}

impl SubOp {
    pub fn new(path: Path, edit: Edit) -> Self {
        Self { path, edit }
    }
}

/// What a write attempts to do to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(Value),
    Delete,
    Mutate(Vec<SubOp>),
}

/// A write attempt against one document in one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub collection: String,
    pub doc_id: String,
    pub operation: Operation,
}

impl WriteRequest {
    pub fn create(collection: impl Into<String>, doc_id: impl Into<String>, data: Value) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            operation: Operation::Create(data),
        }
    }

    pub fn delete(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            operation: Operation::Delete,
        }
    }

    pub fn mutate(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        ops: Vec<SubOp>,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            operation: Operation::Mutate(ops),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_values() {
        for value in [json!(null), json!(false), json!(0), json!(-0.0), json!("")] {
            assert!(is_falsy(&value), "{} should be falsy", value);
        }
        for value in [json!(true), json!(1), json!(" "), json!([]), json!({})] {
            assert!(!is_falsy(&value), "{} should be set", value);
        }
    }

    #[test]
    fn new_value_precedence_is_by_presence() {
        let edit = Edit {
            oi: Some(json!(0)),
            li: Some(json!("x")),
            ..Edit::default()
        };
        assert_eq!(edit.new_value(), Some(&json!(0)));
    }

    #[test]
    fn path_serializes_as_mixed_array() {
        let path = Path::new(vec!["items".into(), 3.into(), "name".into()]);
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["items", 3, "name"]));

        let parsed: Path = serde_json::from_value(json!(["a", 0])).unwrap();
        assert_eq!(parsed, Path::new(vec!["a".into(), 0.into()]));
    }

    #[test]
    fn path_display() {
        assert_eq!(Path::root().to_string(), "/");
        assert_eq!(Path::parse("a/0/b").to_string(), "/a/0/b");
    }

    #[test]
    fn path_lookup() {
        let doc = json!({ "a": { "b": [10, 20, { "c": true }] } });
        assert_eq!(Path::parse("a/b/1").lookup(&doc), Some(&json!(20)));
        assert_eq!(Path::parse("a/b/2/c").lookup(&doc), Some(&json!(true)));
        assert_eq!(Path::root().lookup(&doc), Some(&doc));
        assert_eq!(Path::parse("a/missing").lookup(&doc), None);
        assert_eq!(Path::parse("a/b/9").lookup(&doc), None);
    }

    #[test]
    fn index_segment_addresses_numeric_object_key() {
        let doc = json!({ "scores": { "7": 1 } });
        let path = Path::new(vec!["scores".into(), 7.into()]);
        assert_eq!(path.lookup(&doc), Some(&json!(1)));
    }

    #[test]
    fn edit_new_value_precedence() {
        let edit = Edit {
            oi: Some(json!("x")),
            li: Some(json!("y")),
            ..Edit::default()
        };
        assert_eq!(edit.new_value(), Some(&json!("x")));
        assert_eq!(Edit::number_add(5).new_value(), Some(&json!(5)));
        assert_eq!(Edit::string_insert("hi").new_value(), None);
    }

    #[test]
    fn sub_op_wire_form() {
        let op: SubOp = serde_json::from_value(json!({ "p": ["count"], "na": 2 })).unwrap();
        assert_eq!(op.path, Path::new(vec!["count".into()]));
        assert_eq!(op.edit.na, Some(json!(2)));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "p": ["count"], "na": 2 })
        );
    }
}
