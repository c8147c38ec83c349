//! The engine ties the stores, the registry and an executor together.
//!
//! It is the single entry point for transports: commands come in through
//! `submit`, outcomes go out through `fetch` / `state` / `status`.

use std::sync::Arc;

use bytes::Bytes;
use remora_core::{Command, Contract, ResultId, Value};

use crate::checkpoint_store::{CheckpointError, CheckpointStore};
use crate::executor::{Executor, PoolExecutor, PoolSettings};
use crate::registry::Registry;
use crate::result_store::{ResultStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown promise {0}")]
    UnknownPromise(ResultId),
    #[error("unknown result {0}")]
    UnknownResult(ResultId),
    #[error("engine is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unknown(id) => EngineError::UnknownResult(id),
            other => EngineError::Store(other),
        }
    }
}

/// What `GET /state` reports for an id.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The final outcome.
    Result(Arc<Value>),
    /// The latest checkpoint blob of a unit still in progress.
    Checkpoint(Bytes),
    /// Known, unfinished and never checkpointed.
    Empty,
}

#[derive(Clone)]
pub struct Engine {
    results: ResultStore,
    checkpoints: CheckpointStore,
    registry: Arc<Registry>,
    executor: Arc<dyn Executor>,
}

impl Engine {
    /// Start an engine backed by an in-process worker pool.
    pub fn start(registry: Registry, checkpoints: CheckpointStore, settings: PoolSettings) -> Self {
        let results = ResultStore::new();
        let registry = Arc::new(registry);
        let executor = PoolExecutor::start(
            results.clone(),
            checkpoints.clone(),
            registry.clone(),
            settings,
        );
        Self::with_executor(results, checkpoints, registry, Arc::new(executor))
    }

    /// Assemble an engine around an existing executor.
    pub fn with_executor(
        results: ResultStore,
        checkpoints: CheckpointStore,
        registry: Arc<Registry>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            results,
            checkpoints,
            registry,
            executor,
        }
    }

    /// Accept a command and return the id its outcome will be stored under.
    ///
    /// Every promise must name a known id. Abort is handled here and never
    /// queued: its own result is `true` if it flagged an unfinished unit.
    pub fn submit(&self, command: Command) -> Result<ResultId, EngineError> {
        if let Some(unknown) = command
            .promises()
            .into_iter()
            .find(|p| !self.results.contains(p))
        {
            return Err(EngineError::UnknownPromise(unknown.clone()));
        }

        let id = ResultId::generate();
        if let Command::Abort(abort) = &command {
            let hit = self.executor.abort(&abort.id);
            tracing::info!(id = id.short(), target = abort.id.short(), hit, "abort handled");
            self.results.set(&id, Value::Bool(hit))?;
            return Ok(id);
        }

        tracing::debug!(id = id.short(), command = %command, "command accepted");
        self.results.register(id.clone());
        if self.executor.submit(id.clone(), command).is_err() {
            self.results.remove(&id);
            return Err(EngineError::ShuttingDown);
        }
        Ok(id)
    }

    /// Store an uploaded value directly.
    pub fn store(&self, value: Value) -> Result<ResultId, EngineError> {
        let id = ResultId::generate();
        self.results.set(&id, value)?;
        tracing::debug!(id = id.short(), "value stored");
        Ok(id)
    }

    /// Wait for the outcome of `id`.
    pub async fn fetch(&self, id: &ResultId) -> Result<Arc<Value>, EngineError> {
        Ok(self.results.get(id).await?)
    }

    /// `Some(true)` once `id` is ready, `None` if it was never registered.
    pub fn status(&self, id: &ResultId) -> Option<bool> {
        if !self.results.contains(id) {
            return None;
        }
        Some(self.results.has(id))
    }

    /// The result if ready, else the latest checkpoint.
    pub fn state(&self, id: &ResultId) -> Result<Snapshot, EngineError> {
        if !self.results.contains(id) {
            return Err(EngineError::UnknownResult(id.clone()));
        }
        if let Some(value) = self.results.try_get(id) {
            return Ok(Snapshot::Result(value));
        }
        Ok(match self.checkpoints.get(id)? {
            Some(blob) => Snapshot::Checkpoint(blob),
            None => Snapshot::Empty,
        })
    }

    pub fn contract(&self) -> Contract {
        self.registry.contract()
    }

    /// Drop the stored outcome of `id`.
    pub fn forget(&self, id: &ResultId) -> bool {
        self.results.remove(id)
    }

    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}
