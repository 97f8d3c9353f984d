//! Asynchronous custom validator coordination.
//!
//! Every asynchronous check of one write shares a single [`Barrier`]. The
//! barrier count is fixed before any check is spawned, and spawned tasks
//! never run inline, so a check that resolves immediately cannot release
//! the barrier early. All checks run to completion before the composite
//! decision is reported, exactly once.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::context::ValidationContext;
use crate::custom::{AsyncVerdict, CustomViolation};
use crate::error::{ValidationFailure, ValidationIssue};
use crate::types::Path;

/// Outcome of one arrival at a [`Barrier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Other participants are still outstanding.
    Pending,
    /// This arrival was the last one. Returned exactly once.
    Released,
    /// The barrier was already released; the arrival is ignored.
    Late,
}

/// Completion tracker for a fixed number of participants.
#[derive(Debug)]
pub struct Barrier {
    pending: usize,
    completed: bool,
}

impl Barrier {
    pub fn new(pending: usize) -> Self {
        Self {
            pending,
            completed: false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Record one participant finishing.
    pub fn arrive(&mut self) -> Arrival {
        if self.completed {
            return Arrival::Late;
        }
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            self.completed = true;
            Arrival::Released
        } else {
            Arrival::Pending
        }
    }

    /// Release a barrier that has nothing to wait for.
    ///
    /// Returns true only for the call that performs the release.
    pub fn release_if_idle(&mut self) -> bool {
        if self.completed || self.pending > 0 {
            return false;
        }
        self.completed = true;
        true
    }
}

/// Result of [`run_async`].
pub enum Scheduled<F> {
    /// This many checks are running; the completion fires after the last one.
    Running(usize),
    /// No context had an asynchronous check. Nothing was spawned and the
    /// completion was not invoked; both are handed back to the caller.
    Idle {
        contexts: Vec<ValidationContext>,
        on_done: F,
    },
}

struct Pass<F> {
    barrier: Barrier,
    /// Issues tagged with the index of the context that raised them.
    issues: Vec<(usize, ValidationIssue)>,
    contexts: Vec<ValidationContext>,
    on_done: Option<F>,
}

/// Start every asynchronous check among `contexts`.
///
/// Each check runs on its own Tokio task, so this must be called from within
/// a Tokio runtime. Once all checks have signalled, `on_done` receives the
/// contexts (with any data the checks attached) and the aggregated failure,
/// if any check reported an error. Issues are ordered by context position,
/// not by completion order.
///
/// With no asynchronous contexts nothing is scheduled and
/// [`Scheduled::Idle`] returns the completion to the caller.
pub fn run_async<F>(contexts: Vec<ValidationContext>, on_done: F) -> Scheduled<F>
where
    F: FnOnce(Vec<ValidationContext>, Option<ValidationFailure>) + Send + 'static,
{
    let targets: Vec<(usize, ValidationContext)> = contexts
        .iter()
        .enumerate()
        .filter(|(_, ctx)| ctx.is_async())
        .map(|(index, ctx)| (index, ctx.clone()))
        .collect();

    if targets.is_empty() {
        return Scheduled::Idle { contexts, on_done };
    }

    let count = targets.len();
    let pass = Arc::new(Mutex::new(Pass {
        barrier: Barrier::new(count),
        issues: Vec::new(),
        contexts,
        on_done: Some(on_done),
    }));

    for (index, ctx) in targets {
        let pass = Arc::clone(&pass);
        tokio::spawn(async move {
            let verdict = run_check(ctx).await;
            record(&pass, index, verdict);
        });
    }

    tracing::debug!(count, "scheduled asynchronous validators");
    Scheduled::Running(count)
}

/// Run the asynchronous checks among `contexts` and wait for all of them.
///
/// Returns the contexts with attached data when every check passed, or the
/// aggregated failure otherwise.
pub async fn settle(
    contexts: Vec<ValidationContext>,
) -> Result<Vec<ValidationContext>, ValidationFailure> {
    let (tx, rx) = oneshot::channel();
    let complete = move |contexts: Vec<ValidationContext>, failure: Option<ValidationFailure>| {
        // The receiver only goes away if the caller stopped waiting.
        let _ = tx.send(match failure {
            Some(failure) => Err(failure),
            None => Ok(contexts),
        });
    };

    match run_async(contexts, complete) {
        Scheduled::Running(_) => {}
        Scheduled::Idle { contexts, on_done } => on_done(contexts, None),
    }

    match rx.await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!("asynchronous validation pass ended without a decision");
            Err(ValidationFailure::single(ValidationIssue::custom(
                "async",
                "asynchronous validation did not complete",
                Path::root(),
            )))
        }
    }
}

async fn run_check(ctx: ValidationContext) -> AsyncVerdict {
    let Some(check) = ctx.validator.async_check().cloned() else {
        return AsyncVerdict::pass();
    };
    let name = ctx.validator_name.clone();
    match AssertUnwindSafe(check(ctx)).catch_unwind().await {
        Ok(verdict) => verdict,
        Err(_) => {
            tracing::warn!(validator = %name, "asynchronous validator panicked");
            AsyncVerdict {
                error: Some(CustomViolation::new(format!("validator {} panicked", name))),
                data: None,
            }
        }
    }
}

fn record<F>(pass: &Mutex<Pass<F>>, index: usize, verdict: AsyncVerdict)
where
    F: FnOnce(Vec<ValidationContext>, Option<ValidationFailure>),
{
    let released = {
        let mut state = pass.lock().unwrap_or_else(PoisonError::into_inner);
        let ctx = &mut state.contexts[index];
        ctx.data = verdict.data;
        let issue = verdict.error.map(|err| {
            ValidationIssue::custom(ctx.validator_name.clone(), err.message, ctx.paths.clone())
        });
        if let Some(issue) = issue {
            state.issues.push((index, issue));
        }

        match state.barrier.arrive() {
            Arrival::Pending => None,
            Arrival::Released => state.on_done.take().map(|on_done| {
                let mut issues = std::mem::take(&mut state.issues);
                issues.sort_by_key(|(index, _)| *index);
                let contexts = std::mem::take(&mut state.contexts);
                let issues = issues.into_iter().map(|(_, issue)| issue).collect::<Vec<_>>();
                (on_done, contexts, issues)
            }),
            Arrival::Late => {
                tracing::warn!(index, "validator signalled after the pass completed");
                None
            }
        }
    };

    // Invoke outside the lock so the completion may do arbitrary work.
    if let Some((on_done, contexts, issues)) = released {
        on_done(contexts, ValidationFailure::from_issues(issues));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::CustomValidator;
    use crate::schema::SchemaNode;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn context(name: &str, validator: CustomValidator, path: &str) -> ValidationContext {
        ValidationContext {
            validator_name: name.to_string(),
            validator,
            paths: Path::parse(path),
            schema: Arc::new(SchemaNode::permissive()),
            value: Value::Null,
            data: None,
        }
    }

    fn delayed(ms: u64, verdict: AsyncVerdict) -> CustomValidator {
        CustomValidator::new().with_async(move |_| {
            let verdict = verdict.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                verdict
            }
        })
    }

    #[test]
    fn barrier_releases_exactly_once() {
        let mut barrier = Barrier::new(2);
        assert_eq!(barrier.arrive(), Arrival::Pending);
        assert_eq!(barrier.pending(), 1);
        assert_eq!(barrier.arrive(), Arrival::Released);
        assert!(barrier.is_completed());
        assert_eq!(barrier.arrive(), Arrival::Late);
    }

    #[test]
    fn idle_barrier_releases_once() {
        let mut barrier = Barrier::new(0);
        assert!(barrier.release_if_idle());
        assert!(!barrier.release_if_idle());
        assert_eq!(barrier.arrive(), Arrival::Late);

        let mut busy = Barrier::new(1);
        assert!(!busy.release_if_idle());
    }

    #[tokio::test]
    async fn no_async_contexts_hands_completion_back() {
        let sync_only = context("sync", CustomValidator::new().with_sync(|_, _| Ok(())), "a");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let scheduled = run_async(vec![sync_only], move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        match scheduled {
            Scheduled::Idle { contexts, on_done } => {
                assert_eq!(contexts.len(), 1);
                assert_eq!(calls.load(Ordering::SeqCst), 0);
                on_done(contexts, None);
            }
            Scheduled::Running(_) => panic!("nothing should be scheduled"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn immediate_checks_do_not_release_early() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (tx, rx) = oneshot::channel();

        let immediate = CustomValidator::new().with_async(|_| async { AsyncVerdict::pass() });
        let contexts = vec![
            context("a", immediate.clone(), "x"),
            context("b", delayed(20, AsyncVerdict::pass()), "y"),
            context("c", immediate, "z"),
        ];

        let scheduled = run_async(contexts, move |contexts, failure| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send((contexts.len(), failure));
        });
        assert!(matches!(scheduled, Scheduled::Running(3)));

        let (len, failure) = rx.await.unwrap();
        assert_eq!(len, 3);
        assert!(failure.is_none());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_aggregate_in_context_order() {
        let contexts = vec![
            context("slow", delayed(30, AsyncVerdict::fail("slow failed")), "first"),
            context("ok", delayed(0, AsyncVerdict::pass()), "second"),
            context("fast", delayed(5, AsyncVerdict::fail("fast failed")), "third"),
        ];

        let failure = settle(contexts).await.unwrap_err();
        let messages: Vec<&str> = failure.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["slow failed", "fast failed"]);
        assert_eq!(failure.errors[0].paths, Path::parse("first"));
        assert_eq!(failure.errors[1].validator.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn data_is_attached_to_contexts() {
        let contexts = vec![
            context("lookup", delayed(1, AsyncVerdict::pass_with(json!({ "id": 7 }))), "ref"),
            context("sync", CustomValidator::new().with_sync(|_, _| Ok(())), "other"),
        ];

        let contexts = settle(contexts).await.unwrap();
        assert_eq!(contexts[0].data, Some(json!({ "id": 7 })));
        assert_eq!(contexts[1].data, None);
    }

    #[tokio::test]
    async fn settle_with_nothing_async_passes() {
        let sync_only = CustomValidator::new().with_sync(|_, _| Ok(()));
        let contexts = vec![context("sync", sync_only, "a")];
        assert_eq!(settle(contexts).await.unwrap().len(), 1);
        assert!(settle(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_check_counts_as_failure() {
        let boom = CustomValidator::new().with_async(|_| async {
            let explode = true;
            if explode {
                panic!("boom");
            }
            AsyncVerdict::pass()
        });
        let contexts = vec![
            context("boom", boom, "a"),
            context("ok", delayed(1, AsyncVerdict::pass()), "b"),
        ];

        let failure = settle(contexts).await.unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].message, "validator boom panicked");
    }
}
