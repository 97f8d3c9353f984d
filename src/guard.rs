//! Write mediation: wires resolution, context collection, asynchronous
//! checks, and document validation into the supported write shapes.
//!
//! Creates are validated in one step. Mutations are validated in two: the
//! asynchronous checks of every sub-op run before the store applies
//! anything, and each sub-op gets a [`PostApplyHook`] that the store must
//! run against the resulting document before it commits.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{collect, ValidationContext};
use crate::coordinator::settle;
use crate::custom::{CustomValidator, ValidatorRegistry};
use crate::error::{RegistryError, Rejection, WriteError};
use crate::resolver::resolve;
use crate::schema::SchemaNode;
use crate::types::{Operation, Path, SubOp, WriteRequest};
use crate::validator::{execute, FormatCheck, JsonSchemaBackend, StructuralValidator};

/// Behaviour switches for a [`SchemaGuard`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardOptions {
    /// Accept writes to collections without a registered schema instead of
    /// rejecting them with `NoSchemaForCollection`.
    pub skip_non_existing: bool,
}

impl GuardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_non_existing(mut self, skip: bool) -> Self {
        self.skip_non_existing = skip;
        self
    }
}

/// Collects registries and options, then freezes them into a [`SchemaGuard`].
pub struct SchemaGuardBuilder {
    schemas: BTreeMap<String, Value>,
    validators: ValidatorRegistry,
    formats: Vec<(String, FormatCheck)>,
    structural: Option<Box<dyn StructuralValidator>>,
    options: GuardOptions,
}

impl SchemaGuardBuilder {
    /// Register a named custom validator.
    pub fn validator(mut self, name: impl Into<String>, validator: CustomValidator) -> Self {
        self.validators.register(name, validator);
        self
    }

    /// Register a custom string `format` for structural validation.
    pub fn format<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.formats.push((name.into(), Arc::new(check)));
        self
    }

    /// Replace the `jsonschema` backend with another structural validator.
    ///
    /// Registered formats are ignored when a custom backend is supplied.
    pub fn structural(mut self, validator: impl StructuralValidator + 'static) -> Self {
        self.structural = Some(Box::new(validator));
        self
    }

    pub fn options(mut self, options: GuardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn skip_non_existing(mut self, skip: bool) -> Self {
        self.options.skip_non_existing = skip;
        self
    }

    /// Parse and compile every schema.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NoSchemas` for an empty registry, or the
    /// first schema that fails to parse or compile.
    pub fn build(self) -> Result<SchemaGuard, RegistryError> {
        if self.schemas.is_empty() {
            return Err(RegistryError::NoSchemas);
        }

        let mut parsed = HashMap::with_capacity(self.schemas.len());
        for (collection, schema) in &self.schemas {
            parsed.insert(collection.clone(), Arc::new(SchemaNode::from_value(schema)?));
        }

        let structural = match self.structural {
            Some(structural) => structural,
            None => Box::new(JsonSchemaBackend::compile(&self.schemas, &self.formats)?),
        };

        tracing::debug!(
            collections = parsed.len(),
            validators = self.validators.len(),
            "schema guard ready"
        );

        Ok(SchemaGuard {
            inner: Arc::new(Inner {
                schemas: parsed,
                validators: self.validators,
                structural,
                options: self.options,
            }),
        })
    }
}

struct Inner {
    schemas: HashMap<String, Arc<SchemaNode>>,
    validators: ValidatorRegistry,
    structural: Box<dyn StructuralValidator>,
    options: GuardOptions,
}

/// Validates attempted writes against per-collection schemas.
///
/// Cheap to clone; all clones share the same frozen registries.
#[derive(Clone)]
pub struct SchemaGuard {
    inner: Arc<Inner>,
}

impl fmt::Debug for SchemaGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaGuard")
            .field("collections", &self.collections())
            .field("validators", &self.inner.validators.names())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Outcome of a write that was not rejected.
#[derive(Debug)]
pub enum Submission {
    /// Nothing further to check.
    Accepted,
    /// Pre-apply checks passed; run the hooks against the post-apply document.
    Pending(PreparedMutation),
}

impl SchemaGuard {
    pub fn builder(schemas: BTreeMap<String, Value>) -> SchemaGuardBuilder {
        SchemaGuardBuilder {
            schemas,
            validators: ValidatorRegistry::new(),
            formats: Vec::new(),
            structural: None,
            options: GuardOptions::default(),
        }
    }

    pub fn options(&self) -> GuardOptions {
        self.inner.options
    }

    /// Registered collection names, sorted alphabetically.
    pub fn collections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.schemas.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn schema(&self, collection: &str) -> Option<&Arc<SchemaNode>> {
        self.inner.schemas.get(collection)
    }

    /// Resolve the schema governing `path` in documents of `collection`.
    ///
    /// # Errors
    ///
    /// Returns `Rejection::NoSchemaForCollection` or `Rejection::InvalidPath`.
    pub fn resolve(&self, collection: &str, path: &Path) -> Result<Arc<SchemaNode>, Rejection> {
        let root = self
            .schema(collection)
            .ok_or_else(|| Rejection::NoSchemaForCollection {
                collection: collection.to_string(),
            })?;
        Ok(resolve(root, path)?)
    }

    /// Validate one write attempt.
    ///
    /// Deletes pass once the collection is known. Creates are fully
    /// validated here. Mutations run their asynchronous checks here and
    /// return hooks for the post-apply checks.
    ///
    /// # Errors
    ///
    /// Returns `WriteError` describing why the write must be rejected.
    pub async fn submit(&self, request: WriteRequest) -> Result<Submission, WriteError> {
        let WriteRequest {
            collection,
            doc_id,
            operation,
        } = request;

        let Some(root) = self.inner.schemas.get(&collection) else {
            if self.inner.options.skip_non_existing {
                tracing::debug!(%collection, %doc_id, "no schema for collection, skipping");
                return Ok(Submission::Accepted);
            }
            return Err(reject(
                &collection,
                &doc_id,
                Rejection::NoSchemaForCollection {
                    collection: collection.clone(),
                },
            ));
        };

        let outcome = match operation {
            Operation::Create(document) => self
                .check_create(root, &collection, &document)
                .await
                .map(|()| Submission::Accepted),
            Operation::Mutate(ops) => self
                .prepare_mutation(root, &collection, &doc_id, ops)
                .await
                .map(Submission::Pending),
            Operation::Delete => {
                tracing::debug!(%collection, %doc_id, "delete accepted without validation");
                Ok(Submission::Accepted)
            }
        };

        outcome.map_err(|reason| reject(&collection, &doc_id, reason))
    }

    /// Validate a whole-document creation.
    ///
    /// # Errors
    ///
    /// Returns `WriteError` describing why the document must be rejected.
    pub async fn validate_create(
        &self,
        collection: &str,
        doc_id: &str,
        document: Value,
    ) -> Result<(), WriteError> {
        self.submit(WriteRequest::create(collection, doc_id, document))
            .await
            .map(|_| ())
    }

    async fn check_create(
        &self,
        root: &Arc<SchemaNode>,
        collection: &str,
        document: &Value,
    ) -> Result<(), Rejection> {
        let contexts = collect(&self.inner.validators, root, Some(document), &Path::root())?;
        tracing::debug!(%collection, contexts = contexts.len(), "validating create");

        // Asynchronous failures are reported on their own; the synchronous
        // pass only runs once every asynchronous check has passed.
        let contexts = settle(contexts).await?;
        match execute(self.inner.structural.as_ref(), collection, document, &contexts) {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    async fn prepare_mutation(
        &self,
        root: &Arc<SchemaNode>,
        collection: &str,
        doc_id: &str,
        ops: Vec<SubOp>,
    ) -> Result<PreparedMutation, Rejection> {
        // Resolve and collect for every sub-op before anything is scheduled,
        // so all sub-ops share one barrier.
        let mut all = Vec::new();
        let mut counts = Vec::with_capacity(ops.len());
        for op in &ops {
            let schema = resolve(root, &op.path)?;
            let contexts = collect(&self.inner.validators, &schema, op.edit.new_value(), &op.path)?;
            counts.push(contexts.len());
            all.extend(contexts);
        }
        tracing::debug!(
            %collection,
            %doc_id,
            ops = ops.len(),
            contexts = all.len(),
            "validating mutation"
        );

        let mut settled = settle(all).await?.into_iter();
        let ops = ops
            .into_iter()
            .zip(counts)
            .map(|(op, count)| PreparedOp {
                op,
                hook: PostApplyHook {
                    inner: Arc::clone(&self.inner),
                    collection: collection.to_string(),
                    doc_id: doc_id.to_string(),
                    contexts: settled.by_ref().take(count).collect(),
                },
            })
            .collect();

        Ok(PreparedMutation {
            inner: Arc::clone(&self.inner),
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            ops,
        })
    }
}

fn reject(collection: &str, doc_id: &str, reason: Rejection) -> WriteError {
    tracing::warn!(%collection, %doc_id, error = %reason, "write rejected");
    WriteError::new(collection, doc_id, reason)
}

/// Post-apply check for one sub-op.
///
/// Must be run against the document as it stands after the store applied
/// the sub-op, before the store commits.
#[derive(Clone)]
pub struct PostApplyHook {
    inner: Arc<Inner>,
    collection: String,
    doc_id: String,
    contexts: Vec<ValidationContext>,
}

impl PostApplyHook {
    /// Contexts collected for the sub-op, with asynchronous data attached.
    pub fn contexts(&self) -> &[ValidationContext] {
        &self.contexts
    }

    /// Validate the post-apply document: the whole document structurally,
    /// then this sub-op's synchronous custom checks.
    ///
    /// # Errors
    ///
    /// Returns `WriteError` with every violation found.
    pub fn validate(&self, document: &Value) -> Result<(), WriteError> {
        match execute(
            self.inner.structural.as_ref(),
            &self.collection,
            document,
            &self.contexts,
        ) {
            Some(failure) => Err(reject(&self.collection, &self.doc_id, failure.into())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PostApplyHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostApplyHook")
            .field("collection", &self.collection)
            .field("doc_id", &self.doc_id)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// A sub-op paired with its post-apply check.
#[derive(Debug, Clone)]
pub struct PreparedOp {
    pub op: SubOp,
    pub hook: PostApplyHook,
}

/// A mutation whose pre-apply checks passed.
///
/// The store either runs each sub-op's hook after applying that sub-op, or
/// applies every sub-op and calls [`PreparedMutation::validate_applied`]
/// once. Any failure rejects the whole mutation.
pub struct PreparedMutation {
    inner: Arc<Inner>,
    collection: String,
    doc_id: String,
    ops: Vec<PreparedOp>,
}

impl PreparedMutation {
    pub fn ops(&self) -> &[PreparedOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<PreparedOp> {
        self.ops
    }

    /// Validate the document after every sub-op was applied.
    ///
    /// Structural validation runs once; every sub-op's synchronous checks
    /// run against the final document.
    ///
    /// # Errors
    ///
    /// Returns `WriteError` with every violation found.
    pub fn validate_applied(&self, document: &Value) -> Result<(), WriteError> {
        let contexts: Vec<ValidationContext> = self
            .ops
            .iter()
            .flat_map(|prepared| prepared.hook.contexts.iter().cloned())
            .collect();
        match execute(
            self.inner.structural.as_ref(),
            &self.collection,
            document,
            &contexts,
        ) {
            Some(failure) => Err(reject(&self.collection, &self.doc_id, failure.into())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PreparedMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedMutation")
            .field("collection", &self.collection)
            .field("doc_id", &self.doc_id)
            .field("ops", &self.ops)
            .finish()
    }
}
