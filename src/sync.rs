//! Batch synchronization of local mutations to the remote store.
//!
//! A job drives its mutations to terminal status under a concurrency bound
//! and a per-mutation timeout. Mutations are independent: one failure never
//! aborts the rest. The job resolves exactly once, after every mutation is
//! terminal, with the success count and the full failure list. Retrying is
//! a new job with a fresh mutation set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, warn};

use crate::remote::{RemoteError, RemoteStore};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// One pending local change headed for the remote store.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub key: String,
    pub resource: String,
    pub op: MutationOp,
    pub filter: Value,
    pub payload: Value,
    pub status: MutationStatus,
    pub attempt: u32,
}

impl Mutation {
    pub fn insert(key: &str, resource: &str, payload: Value) -> Self {
        Self {
            key: key.to_string(),
            resource: resource.to_string(),
            op: MutationOp::Insert,
            filter: Value::Null,
            payload,
            status: MutationStatus::Pending,
            attempt: 0,
        }
    }

    pub fn update(key: &str, resource: &str, patch: Value) -> Self {
        Self {
            key: key.to_string(),
            resource: resource.to_string(),
            op: MutationOp::Update,
            filter: json!({ "id": key }),
            payload: patch,
            status: MutationStatus::Pending,
            attempt: 0,
        }
    }

    pub fn delete(key: &str, resource: &str) -> Self {
        Self {
            key: key.to_string(),
            resource: resource.to_string(),
            op: MutationOp::Delete,
            filter: json!({ "id": key }),
            payload: Value::Null,
            status: MutationStatus::Pending,
            attempt: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationFailure {
    pub key: String,
    pub error: RemoteError,
}

/// Aggregated job result, delivered exactly once.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failures: Vec<MutationFailure>,
    pub succeeded_keys: Vec<String>,
    /// Every mutation of the job in its terminal status, completion order.
    pub mutations: Vec<Mutation>,
}

#[derive(Default)]
struct BatchAccumulator {
    success_count: usize,
    failures: Vec<MutationFailure>,
    succeeded_keys: Vec<String>,
    mutations: Vec<Mutation>,
}

impl BatchAccumulator {
    fn record_success(&mut self, mutation: Mutation) {
        self.success_count += 1;
        self.succeeded_keys.push(mutation.key.clone());
        self.mutations.push(mutation);
    }

    fn record_failure(&mut self, mutation: Mutation, error: RemoteError) {
        self.failures.push(MutationFailure {
            key: mutation.key.clone(),
            error,
        });
        self.mutations.push(mutation);
    }

    fn into_outcome(self) -> BatchOutcome {
        BatchOutcome {
            success_count: self.success_count,
            failures: self.failures,
            succeeded_keys: self.succeeded_keys,
            mutations: self.mutations,
        }
    }
}

/// Handle to a running job. Dropping the handle without waiting leaves the
/// job running to completion; `cancel` additionally discards the outcome so
/// no completion signal reaches a torn-down owner.
pub struct BatchJob {
    total: usize,
    cancelled: Arc<AtomicBool>,
    rx: oneshot::Receiver<BatchOutcome>,
}

impl BatchJob {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resolves with the aggregated outcome, or `None` if the job was
    /// cancelled before completion.
    pub async fn wait(self) -> Option<BatchOutcome> {
        self.rx.await.ok()
    }
}

type CompletionHook = Box<dyn FnOnce(&BatchOutcome) + Send>;

pub struct BatchSyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    concurrency: usize,
    op_timeout: Duration,
    dispatch_spacing: Duration,
}

impl BatchSyncCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, concurrency: usize, op_timeout: Duration) -> Self {
        Self {
            remote,
            concurrency: concurrency.max(1),
            op_timeout,
            dispatch_spacing: Duration::ZERO,
        }
    }

    /// Minimum spacing between dispatches. Pacing only; correctness never
    /// depends on it.
    pub fn with_dispatch_spacing(mut self, spacing: Duration) -> Self {
        self.dispatch_spacing = spacing;
        self
    }

    pub fn submit(&self, mutations: Vec<Mutation>) -> BatchJob {
        self.submit_with_hook(mutations, None)
    }

    /// Submits a job and runs `on_complete` with the outcome before the
    /// handle resolves. The hook is skipped if the job was cancelled.
    pub fn submit_with<F>(&self, mutations: Vec<Mutation>, on_complete: F) -> BatchJob
    where
        F: FnOnce(&BatchOutcome) + Send + 'static,
    {
        self.submit_with_hook(mutations, Some(Box::new(on_complete)))
    }

    fn submit_with_hook(&self, mutations: Vec<Mutation>, hook: Option<CompletionHook>) -> BatchJob {
        let total = mutations.len();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let remote = Arc::clone(&self.remote);
        let concurrency = self.concurrency;
        let op_timeout = self.op_timeout;
        let spacing = self.dispatch_spacing;
        let cancel_flag = Arc::clone(&cancelled);

        tokio::spawn(async move {
            debug!("dispatching batch job of {total} mutations (concurrency {concurrency})");
            let accumulator = Arc::new(Mutex::new(BatchAccumulator::default()));
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut workers = Vec::with_capacity(total);

            for (index, mutation) in mutations.into_iter().enumerate() {
                if index > 0 && !spacing.is_zero() {
                    tokio::time::sleep(spacing).await;
                }
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let remote = Arc::clone(&remote);
                let accumulator = Arc::clone(&accumulator);
                workers.push(tokio::spawn(async move {
                    let _permit = permit;
                    run_mutation(remote.as_ref(), mutation, op_timeout, &accumulator).await;
                }));
            }

            for worker in workers {
                let _ = worker.await;
            }

            let outcome = std::mem::take(&mut *accumulator.lock()).into_outcome();
            info!(
                "batch job finished: {} succeeded, {} failed",
                outcome.success_count,
                outcome.failures.len()
            );

            if cancel_flag.load(Ordering::SeqCst) {
                debug!("batch job owner cancelled; discarding outcome");
                return;
            }
            if let Some(hook) = hook {
                hook(&outcome);
            }
            let _ = tx.send(outcome);
        });

        BatchJob {
            total,
            cancelled,
            rx,
        }
    }
}

async fn run_mutation(
    remote: &dyn RemoteStore,
    mut mutation: Mutation,
    op_timeout: Duration,
    accumulator: &Mutex<BatchAccumulator>,
) {
    mutation.status = MutationStatus::InFlight;
    mutation.attempt += 1;

    let result = match tokio::time::timeout(op_timeout, dispatch(remote, &mutation)).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout {
            timeout_ms: op_timeout.as_millis() as u64,
        }),
    };

    match result {
        Ok(()) => {
            mutation.status = MutationStatus::Succeeded;
            accumulator.lock().record_success(mutation);
        }
        Err(error) => {
            mutation.status = MutationStatus::Failed;
            warn!(
                "mutation {} ({}) failed: {error}",
                mutation.key,
                error.kind()
            );
            accumulator.lock().record_failure(mutation, error);
        }
    }
}

async fn dispatch(remote: &dyn RemoteStore, mutation: &Mutation) -> Result<(), RemoteError> {
    match mutation.op {
        MutationOp::Insert => remote
            .insert(&mutation.resource, &mutation.payload)
            .await
            .map(|_| ()),
        MutationOp::Update => {
            remote
                .update(&mutation.resource, &mutation.filter, &mutation.payload)
                .await
        }
        MutationOp::Delete => remote.delete(&mutation.resource, &mutation.filter).await,
    }
}
