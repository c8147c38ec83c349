//! Execution pool: queue → dispatcher → workers.
//!
//! Submitted units land on an unbounded FIFO. A single dispatcher task takes
//! them in order, resolves their promises, waits for a worker permit and runs
//! the command on a blocking thread. Outcomes (values or failures) go to the
//! result store; the checkpoint of a finished unit is deleted.
//!
//! Abort never reaches a worker. It raises the unit's flag: a unit that has
//! not started is skipped and its slot receives an "aborted" failure, while
//! a running unit can only notice through `execution::aborted()`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use remora_core::config::ExecutorConfig;
use remora_core::{Command, ExecutionFailure, ResultId, Value};
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::checkpoint_store::CheckpointStore;
use crate::execution::{self, AbortFlag, ExecutionContext};
use crate::registry::{ExecError, Registry};
use crate::resolve::resolve;
use crate::result_store::ResultStore;

/// Where a unit of work is in its lifecycle. Finished units are no longer
/// tracked; their outcome is in the result store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Queued,
    Resolving,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("executor is shut down")]
pub struct ExecutorClosed;

/// Runs submitted commands and stores their outcomes.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Queue `command`; its outcome will be stored under `id`.
    fn submit(&self, id: ResultId, command: Command) -> Result<(), ExecutorClosed>;

    /// Flag `id` for cancellation. Returns true if it was still in flight.
    fn abort(&self, id: &ResultId) -> bool;

    /// Stop dispatching and wait for in-flight work to finish.
    async fn shutdown(&self);
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub workers: usize,
    pub poll_interval: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for PoolSettings {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            workers: config.effective_workers(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

struct Unit {
    id: ResultId,
    command: Command,
    flag: AbortFlag,
}

struct Tracked {
    state: UnitState,
    flag: AbortFlag,
}

/// State shared by the handle, the dispatcher and every worker.
struct Shared {
    results: ResultStore,
    checkpoints: CheckpointStore,
    registry: Arc<Registry>,
    in_flight: DashMap<ResultId, Tracked>,
}

impl Shared {
    fn set_state(&self, id: &ResultId, state: UnitState) {
        if let Some(mut tracked) = self.in_flight.get_mut(id) {
            tracked.state = state;
        }
    }

    /// Store the outcome of `id` and forget it.
    fn complete(&self, id: &ResultId, value: Value) {
        self.in_flight.remove(id);
        if let Err(e) = self.results.set(id, value) {
            tracing::debug!(id = id.short(), error = %e, "outcome already stored");
        }
        if let Err(e) = self.checkpoints.delete(id) {
            tracing::warn!(id = id.short(), error = %e, "failed to delete checkpoint");
        }
    }

    fn complete_aborted(&self, id: &ResultId) {
        tracing::info!(id = id.short(), "unit aborted before execution");
        self.complete(id, Value::Failure(ExecutionFailure::aborted(id)));
    }

    fn complete_shut_down(&self, id: &ResultId) {
        self.complete(
            id,
            Value::Failure(ExecutionFailure::new(
                format!("command {}", id),
                "executor shut down before execution",
            )),
        );
    }
}

/// In-process worker pool.
pub struct PoolExecutor {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Unit>,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PoolExecutor {
    /// Spawn the dispatcher. Must be called inside a tokio runtime.
    pub fn start(
        results: ResultStore,
        checkpoints: CheckpointStore,
        registry: Arc<Registry>,
        settings: PoolSettings,
    ) -> Self {
        let shared = Arc::new(Shared {
            results,
            checkpoints,
            registry,
            in_flight: DashMap::new(),
        });
        let (queue, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            workers = settings.workers,
            poll_interval_ms = settings.poll_interval.as_millis() as u64,
            "executor started"
        );
        let dispatcher = tokio::spawn(dispatch(shared.clone(), rx, shutdown_rx, settings));

        Self {
            shared,
            queue,
            shutdown_tx,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Lifecycle state of an unfinished unit.
    pub fn state(&self, id: &ResultId) -> Option<UnitState> {
        self.shared.in_flight.get(id).map(|t| t.state)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.len()
    }
}

#[async_trait]
impl Executor for PoolExecutor {
    fn submit(&self, id: ResultId, command: Command) -> Result<(), ExecutorClosed> {
        if *self.shutdown_tx.borrow() {
            return Err(ExecutorClosed);
        }
        let flag = AbortFlag::new();
        self.shared.in_flight.insert(
            id.clone(),
            Tracked {
                state: UnitState::Queued,
                flag: flag.clone(),
            },
        );
        tracing::debug!(id = id.short(), kind = %command.kind(), "unit queued");
        self.queue
            .send(Unit {
                id: id.clone(),
                command,
                flag,
            })
            .map_err(|_| {
                self.shared.in_flight.remove(&id);
                ExecutorClosed
            })
    }

    fn abort(&self, id: &ResultId) -> bool {
        let (flag, state) = match self.shared.in_flight.get(id) {
            Some(tracked) => (tracked.flag.clone(), tracked.state),
            None => return false,
        };
        flag.raise();
        tracing::info!(id = id.short(), ?state, "abort requested");
        // Queued units fail now so waiters do not sit behind the queue; the
        // dispatcher drops them when it gets there.
        if state == UnitState::Queued {
            self.shared.complete_aborted(id);
        }
        true
    }

    async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatcher task failed");
            }
        }
    }
}

enum Step<T> {
    Ready(T),
    Aborted,
    Shutdown,
}

/// Race `fut` against the unit's abort flag and executor shutdown.
async fn guarded<F: std::future::Future>(
    fut: F,
    flag: &AbortFlag,
    shutdown: &mut watch::Receiver<bool>,
) -> Step<F::Output> {
    tokio::select! {
        biased;
        _ = flag.raised() => Step::Aborted,
        _ = shutdown.changed() => Step::Shutdown,
        out = fut => Step::Ready(out),
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Unit>,
    mut shutdown: watch::Receiver<bool>,
    settings: PoolSettings,
) {
    let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
    let mut workers = JoinSet::new();

    loop {
        reap(&mut workers);
        let unit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            unit = rx.recv() => match unit {
                Some(unit) => unit,
                None => break,
            },
            _ = tokio::time::sleep(settings.poll_interval) => continue,
        };

        if unit.flag.is_raised() {
            shared.complete_aborted(&unit.id);
            continue;
        }

        let Unit {
            id,
            mut command,
            flag,
        } = unit;
        shared.set_state(&id, UnitState::Resolving);

        let resolved = guarded(resolve(&mut command, &shared.results), &flag, &mut shutdown).await;
        match resolved {
            Step::Ready(Ok(())) => {}
            Step::Ready(Err(e)) => {
                shared.complete(&id, Value::Failure(ExecutionFailure::new(&command, e)));
                continue;
            }
            Step::Aborted => {
                shared.complete_aborted(&id);
                continue;
            }
            Step::Shutdown => {
                shared.complete_shut_down(&id);
                break;
            }
        }

        // Permits are taken here, in queue order, so units start FIFO.
        let permit = match guarded(permits.clone().acquire_owned(), &flag, &mut shutdown).await {
            Step::Ready(Ok(permit)) => permit,
            Step::Ready(Err(_)) | Step::Shutdown => {
                shared.complete_shut_down(&id);
                break;
            }
            Step::Aborted => {
                shared.complete_aborted(&id);
                continue;
            }
        };
        if flag.is_raised() {
            shared.complete_aborted(&id);
            continue;
        }

        shared.set_state(&id, UnitState::Running);
        let shared = shared.clone();
        workers.spawn(async move {
            let value = run(&shared, id.clone(), command, flag).await;
            shared.complete(&id, value);
            drop(permit);
        });
    }

    // Let cooperative units stop early, then wait for all of them.
    for tracked in shared.in_flight.iter() {
        if tracked.state == UnitState::Running {
            tracked.flag.raise();
        }
    }
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "worker task failed");
        }
    }

    rx.close();
    while let Ok(unit) = rx.try_recv() {
        shared.complete_shut_down(&unit.id);
    }
    let leftover: Vec<ResultId> = shared.in_flight.iter().map(|t| t.key().clone()).collect();
    for id in leftover {
        shared.complete_shut_down(&id);
    }
    tracing::info!("executor stopped");
}

/// Drop finished worker tasks from `workers`. Returns how many were reaped.
fn reap(workers: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(res) = workers.try_join_next() {
        if let Err(e) = res {
            tracing::error!(error = %e, "worker task failed");
        }
        reaped += 1;
    }
    reaped
}

/// Execute one resolved command on a blocking thread.
async fn run(shared: &Arc<Shared>, id: ResultId, command: Command, flag: AbortFlag) -> Value {
    let description = command.to_string();
    let registry = shared.registry.clone();
    let ctx = ExecutionContext::new(id.clone(), shared.checkpoints.clone(), flag);

    tracing::debug!(id = id.short(), command = %description, "unit running");
    let outcome = tokio::task::spawn_blocking(move || {
        let _guard = execution::enter(ctx);
        registry.execute(&command)
    })
    .await;

    match outcome {
        Ok(Ok(value)) => {
            tracing::debug!(id = id.short(), "unit completed");
            value
        }
        Ok(Err(ExecError::Upstream(upstream))) => Value::Failure(ExecutionFailure::caused_by(
            &description,
            "an argument is a failed result",
            &upstream,
        )),
        Ok(Err(e)) => {
            tracing::info!(id = id.short(), error = %e, "unit failed");
            Value::Failure(ExecutionFailure::new(&description, e))
        }
        Err(join_err) => {
            let reason = panic_message(join_err);
            tracing::warn!(id = id.short(), reason = %reason, "unit panicked");
            Value::Failure(ExecutionFailure::new(&description, reason))
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
