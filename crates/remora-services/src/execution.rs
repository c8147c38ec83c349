//! Ambient context for the command running on the current worker thread.
//!
//! Class methods do not receive their result id explicitly. The pool installs
//! an `ExecutionContext` on the blocking thread before invoking a method, and
//! `save_state` / `aborted` read it from there.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use remora_core::codec::{self, CodecError};
use remora_core::{ResultId, Value};
use tokio::sync::Notify;

use crate::checkpoint_store::{CheckpointError, CheckpointStore};

/// Cooperative cancellation flag shared by the engine and one unit of work.
#[derive(Clone, Default, Debug)]
pub struct AbortFlag(Arc<AbortInner>);

#[derive(Default, Debug)]
struct AbortInner {
    raised: AtomicBool,
    notify: Notify,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns false if it was already raised.
    pub fn raise(&self) -> bool {
        let first = !self.0.raised.swap(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
        first
    }

    pub fn is_raised(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised.
    pub async fn raised(&self) {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("save_state called outside of a running command")]
    NoContext,
    #[error("state is not serializable: {0}")]
    Encode(#[from] CodecError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// What a running command can see about itself.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub id: ResultId,
    checkpoints: CheckpointStore,
    abort: AbortFlag,
}

impl ExecutionContext {
    pub fn new(id: ResultId, checkpoints: CheckpointStore, abort: AbortFlag) -> Self {
        Self {
            id,
            checkpoints,
            abort,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<ExecutionContext>> = const { RefCell::new(None) };
}

/// Restores the previous context on drop.
pub struct ContextGuard {
    previous: Option<ExecutionContext>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Install `ctx` for the current thread until the guard drops.
pub fn enter(ctx: ExecutionContext) -> ContextGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(ctx));
    ContextGuard { previous }
}

/// Id of the command running on this thread.
pub fn current_id() -> Option<ResultId> {
    CURRENT.with(|current| current.borrow().as_ref().map(|ctx| ctx.id.clone()))
}

/// True once the running command has been asked to stop. False outside a
/// running command.
pub fn aborted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|ctx| ctx.abort.is_raised())
            .unwrap_or(false)
    })
}

/// Checkpoint `state` under the running command's id.
pub fn save_state(state: &Value) -> Result<(), StateError> {
    let (id, checkpoints) = CURRENT
        .with(|current| {
            current
                .borrow()
                .as_ref()
                .map(|ctx| (ctx.id.clone(), ctx.checkpoints.clone()))
        })
        .ok_or(StateError::NoContext)?;
    let blob = codec::encode_blob(state)?;
    checkpoints.save(&id, &blob)?;
    Ok(())
}
