//! Path-aware schema validation for document writes.
//!
//! Every collection has a JSON Schema. Creates are validated as whole
//! documents; mutations are validated per sub-op, with the sub-op's path
//! resolved against the collection schema so only the addressed sub-tree
//! needs custom checks. Schema nodes can name custom validators through the
//! `validators` keyword; asynchronous checks run before the store applies a
//! mutation, synchronous ones against the document it produced.
//!
//! # Example
//!
//! ```
//! use opguard::{CustomValidator, CustomViolation, SchemaGuard, WriteRequest};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! let mut schemas = BTreeMap::new();
//! schemas.insert(
//!     "users".to_string(),
//!     json!({
//!         "type": "object",
//!         "properties": {
//!             "age": { "type": "integer", "minimum": 0 },
//!             "handle": { "type": "string", "validators": ["lowercase"] }
//!         }
//!     }),
//! );
//!
//! let lowercase = CustomValidator::new().with_sync(|value, _ctx| {
//!     match value.as_str() {
//!         Some(s) if s.chars().any(char::is_uppercase) => {
//!             Err(CustomViolation::new("must be lowercase"))
//!         }
//!         _ => Ok(()),
//!     }
//! });
//!
//! let guard = SchemaGuard::builder(schemas)
//!     .validator("lowercase", lowercase)
//!     .build()
//!     .unwrap();
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let err = rt
//!     .block_on(guard.submit(WriteRequest::create("users", "u1", json!({ "handle": "Ann" }))))
//!     .unwrap_err();
//! let failure = err.failure().unwrap();
//! assert_eq!(failure.errors[0].paths.to_string(), "/handle");
//! ```
//!
//! # Mutations
//!
//! | Edit | New value checked before apply |
//! |------|--------------------------------|
//! | `oi` (object insert/replace) | yes |
//! | `li` (list insert/replace) | yes |
//! | `na` (number add) | the increment |
//! | `od`, `ld`, `lm`, `si`, `sd` | none |
//!
//! Every sub-op gets a [`PostApplyHook`]; the store runs it against the
//! document it produced before committing.

mod context;
mod coordinator;
mod custom;
mod error;
mod guard;
mod linter;
mod loader;
mod resolver;
mod schema;
mod types;
mod validator;

pub use context::{collect, ValidationContext};
pub use coordinator::{run_async, settle, Arrival, Barrier, Scheduled};
pub use custom::{
    AsyncCheck, AsyncVerdict, CustomValidator, CustomViolation, SyncCheck, ValidatorRegistry,
};
pub use error::{
    CollectError, IssueKind, RegistryError, Rejection, ResolveError, ValidationFailure,
    ValidationIssue, WriteError,
};
pub use guard::{
    GuardOptions, PostApplyHook, PreparedMutation, PreparedOp, SchemaGuard, SchemaGuardBuilder,
    Submission,
};
pub use linter::{
    lint_collection, lint_registry, CollectionResult, CollectionStatus, Diagnostic, LintResult,
    Severity,
};
pub use loader::{
    is_url, load_registry, load_registry_dir, load_schema, load_schema_auto, load_schema_str,
    registry_from_value, SchemaMap,
};
pub use resolver::{property_schema, resolve};
pub use schema::{declared_type, AdditionalProperties, SchemaKind, SchemaNode, VALIDATORS_KEYWORD};
pub use types::{
    is_falsy, json_type_name, Edit, Operation, Path, PathSegment, SubOp, WriteRequest,
};
pub use validator::{
    execute, parse_violation_path, FormatCheck, JsonSchemaBackend, StructuralReport,
    StructuralValidator, StructuralViolation,
};

#[cfg(feature = "remote")]
pub use loader::load_schema_url;
