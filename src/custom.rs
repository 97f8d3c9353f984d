//! Custom validators: named, schema-attached checks beyond structural constraints.
//!
//! A validator may expose a synchronous check, an asynchronous check, or
//! both. Synchronous checks run against the value stored in the document
//! being validated; asynchronous checks run once per context before any
//! synchronous work and may attach diagnostic data to their context.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::context::ValidationContext;

/// A failing custom check.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomViolation {
    pub message: String,
}

impl CustomViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CustomViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Completion signal of an asynchronous check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsyncVerdict {
    pub error: Option<CustomViolation>,
    /// Stored on the context for later synchronous checks and diagnostics.
    pub data: Option<Value>,
}

impl AsyncVerdict {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn pass_with(data: Value) -> Self {
        Self {
            error: None,
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            error: Some(CustomViolation::new(message)),
            data: None,
        }
    }
}

pub type SyncCheck =
    Arc<dyn Fn(&Value, &ValidationContext) -> Result<(), CustomViolation> + Send + Sync>;

pub type AsyncCheck =
    Arc<dyn Fn(ValidationContext) -> BoxFuture<'static, AsyncVerdict> + Send + Sync>;

/// A named validator's checks.
#[derive(Clone, Default)]
pub struct CustomValidator {
    sync: Option<SyncCheck>,
    async_check: Option<AsyncCheck>,
}

impl CustomValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the synchronous check, run against the post-apply value.
    pub fn with_sync<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value, &ValidationContext) -> Result<(), CustomViolation> + Send + Sync + 'static,
    {
        self.sync = Some(Arc::new(check));
        self
    }

    /// Set the asynchronous check, run before synchronous validation.
    pub fn with_async<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(ValidationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AsyncVerdict> + Send + 'static,
    {
        self.async_check = Some(Arc::new(move |ctx: ValidationContext| check(ctx).boxed()));
        self
    }

    pub fn sync_check(&self) -> Option<&SyncCheck> {
        self.sync.as_ref()
    }

    pub fn async_check(&self) -> Option<&AsyncCheck> {
        self.async_check.as_ref()
    }

    pub fn is_async(&self) -> bool {
        self.async_check.is_some()
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValidator")
            .field("sync", &self.sync.is_some())
            .field("async", &self.async_check.is_some())
            .finish()
    }
}

/// Validators by name. Frozen once the guard is built.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, CustomValidator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, validator: CustomValidator) {
        self.validators.insert(name.into(), validator);
    }

    pub fn get(&self, name: &str) -> Option<&CustomValidator> {
        self.validators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// Registered names, sorted alphabetically.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
