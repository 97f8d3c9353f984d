//! Error types for registry construction, path resolution, and write validation.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::Path;

/// Errors while loading or compiling the schema registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Schema errors (exit code 2)
    #[error("schemas are required: registry is empty")]
    NoSchemas,

    #[error("registry must be a JSON object mapping collection names to schemas")]
    NotAnObject,

    #[error("invalid schema for collection '{collection}': {message}")]
    InvalidSchema { collection: String, message: String },

    #[error("invalid pattern \"{pattern}\" at {path}: {message}")]
    InvalidPattern {
        path: String,
        pattern: String,
        message: String,
    },

    #[error("invalid validators keyword at {path}: expected array of strings")]
    InvalidValidators { path: String },
}

impl RegistryError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RegistryError::FileNotFound { .. } | RegistryError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            RegistryError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// A path that the schema cannot address.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("property \"{property}\" is invalid at {path}")]
    UnknownProperty { path: Path, property: String },

    #[error("cannot descend into {kind} value at {path}")]
    NotAContainer { path: Path, kind: &'static str },
}

impl ResolveError {
    /// Path to the segment where resolution failed.
    pub fn path(&self) -> &Path {
        match self {
            ResolveError::UnknownProperty { path, .. } | ResolveError::NotAContainer { path, .. } => {
                path
            }
        }
    }
}

/// Errors while collecting custom validator contexts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectError {
    #[error("unknown validator: {name} (at {path})")]
    UnknownValidator { name: String, path: Path },

    #[error(transparent)]
    InvalidPath(#[from] ResolveError),
}

/// Which check produced a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    /// Built-in schema constraint (type, required, bounds, pattern, enum).
    Structural,
    /// Named custom validator attached to a schema node.
    Custom,
}

/// Single validation failure with the path it applies to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub message: String,
    pub paths: Path,
    pub kind: IssueKind,
    /// Custom validator name, for `IssueKind::Custom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

impl ValidationIssue {
    pub fn structural(message: impl Into<String>, paths: Path) -> Self {
        Self {
            message: message.into(),
            paths,
            kind: IssueKind::Structural,
            validator: None,
        }
    }

    pub fn custom(validator: impl Into<String>, message: impl Into<String>, paths: Path) -> Self {
        Self {
            message: message.into(),
            paths,
            kind: IssueKind::Custom,
            validator: Some(validator.into()),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.paths, self.message)
    }
}

/// Every violation found in one validation pass.
///
/// Never empty: a pass with no issues reports success instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub message: String,
    pub errors: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

impl ValidationFailure {
    /// Wrap collected issues, returning `None` when there are none.
    pub fn from_issues(errors: Vec<ValidationIssue>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(Self {
            message: "Not valid".to_string(),
            errors,
            collection: None,
            doc_id: None,
        })
    }

    /// A failure holding exactly one issue.
    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            message: "Not valid".to_string(),
            errors: vec![issue],
            collection: None,
            doc_id: None,
        }
    }

    /// Tag the failure with the document it was raised for.
    pub fn for_document(mut self, collection: &str, doc_id: &str) -> Self {
        self.collection = Some(collection.to_string());
        self.doc_id = Some(doc_id.to_string());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} error(s))", self.message, self.errors.len())
    }
}

impl std::error::Error for ValidationFailure {}

/// Why a write was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("no schema for collection: {collection}")]
    NoSchemaForCollection { collection: String },

    #[error(transparent)]
    InvalidPath(#[from] ResolveError),

    #[error(transparent)]
    Collect(CollectError),

    #[error("{failure}")]
    Invalid { failure: ValidationFailure },
}

impl From<CollectError> for Rejection {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::InvalidPath(err) => Rejection::InvalidPath(err),
            other => Rejection::Collect(other),
        }
    }
}

impl From<ValidationFailure> for Rejection {
    fn from(failure: ValidationFailure) -> Self {
        Rejection::Invalid { failure }
    }
}

impl Rejection {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Rejection::Invalid { .. } => 1,
            _ => 2,
        }
    }
}

/// A rejected write, tagged with the document it targeted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{collection}/{doc_id}: {reason}")]
pub struct WriteError {
    pub collection: String,
    pub doc_id: String,
    #[source]
    pub reason: Rejection,
}

impl WriteError {
    pub fn new(collection: &str, doc_id: &str, reason: impl Into<Rejection>) -> Self {
        let reason = match reason.into() {
            Rejection::Invalid { failure } => Rejection::Invalid {
                failure: failure.for_document(collection, doc_id),
            },
            other => other,
        };
        Self {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            reason,
        }
    }

    /// The composite failure, when the write was rejected for violations.
    pub fn failure(&self) -> Option<&ValidationFailure> {
        match &self.reason {
            Rejection::Invalid { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.reason.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_exit_codes() {
        let err = RegistryError::FileNotFound {
            path: PathBuf::from("schemas.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = RegistryError::NoSchemas;
        assert_eq!(err.exit_code(), 2);

        let err = RegistryError::InvalidSchema {
            collection: "users".into(),
            message: "bad".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn rejection_exit_codes() {
        let err = Rejection::NoSchemaForCollection {
            collection: "users".into(),
        };
        assert_eq!(err.exit_code(), 2);

        let failure =
            ValidationFailure::from_issues(vec![ValidationIssue::structural("bad", Path::root())])
                .unwrap();
        assert_eq!(Rejection::from(failure).exit_code(), 1);
    }

    #[test]
    fn forbidden_key_during_collection_is_an_invalid_path() {
        let err = ResolveError::UnknownProperty {
            path: Path::parse("tags/x"),
            property: "x".into(),
        };
        let rejection = Rejection::from(CollectError::from(err.clone()));
        assert_eq!(rejection, Rejection::InvalidPath(err));
        assert_eq!(rejection.exit_code(), 2);
    }

    #[test]
    fn empty_issue_list_is_not_a_failure() {
        assert!(ValidationFailure::from_issues(Vec::new()).is_none());
    }

    #[test]
    fn write_error_tags_failure_with_document() {
        let failure = ValidationFailure::from_issues(vec![ValidationIssue::structural(
            "too small",
            Path::parse("age"),
        )])
        .unwrap();
        let err = WriteError::new("users", "u1", failure);

        let failure = err.failure().unwrap();
        assert_eq!(failure.collection.as_deref(), Some("users"));
        assert_eq!(failure.doc_id.as_deref(), Some("u1"));
        assert_eq!(err.to_string(), "users/u1: Not valid (1 error(s))");
    }

    #[test]
    fn failure_serializes_camel_case() {
        let failure = ValidationFailure::from_issues(vec![ValidationIssue::custom(
            "unique",
            "taken",
            Path::parse("email"),
        )])
        .unwrap()
        .for_document("users", "u1");

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["docId"], "u1");
        assert_eq!(json["errors"][0]["paths"], serde_json::json!(["email"]));
        assert_eq!(json["errors"][0]["kind"], "custom");
        assert_eq!(json["errors"][0]["validator"], "unique");
    }

    #[test]
    fn issue_display() {
        let issue = ValidationIssue::structural("expected number", Path::parse("a/0"));
        assert_eq!(issue.to_string(), "/a/0: expected number");
    }
}
