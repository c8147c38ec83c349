//! Write-once result slots.
//!
//! Every submitted command gets a slot keyed by its `ResultId`. A slot is a
//! `watch` channel holding `None` until the outcome lands. Readers subscribe
//! under the shard lock and wait outside it, so a slow reader never blocks
//! `set` or unrelated ids.

use std::sync::Arc;

use dashmap::DashMap;
use remora_core::{ResultId, Value};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("result {0} was already stored")]
    AlreadySet(ResultId),
    #[error("result {0} is unknown")]
    Unknown(ResultId),
    #[error("result {0} was removed before it was stored")]
    Removed(ResultId),
}

type Slot = watch::Sender<Option<Arc<Value>>>;

/// In-memory store for command outcomes.
#[derive(Clone, Default)]
pub struct ResultStore {
    /// result id → slot
    slots: Arc<DashMap<ResultId, Slot>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Create an empty slot. Returns false if the id already exists.
    pub fn register(&self, id: ResultId) -> bool {
        let mut created = false;
        self.slots.entry(id).or_insert_with(|| {
            created = true;
            watch::channel(None).0
        });
        created
    }

    /// Store the outcome for `id` and wake every waiter.
    ///
    /// Unregistered ids get a slot on the fly. A second `set` for the same id
    /// is rejected and the first value stays.
    pub fn set(&self, id: &ResultId, value: Value) -> Result<(), StoreError> {
        let slot = self
            .slots
            .entry(id.clone())
            .or_insert_with(|| watch::channel(None).0);
        let mut value = Some(Arc::new(value));
        let stored = slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = value.take();
            true
        });
        if stored {
            Ok(())
        } else {
            Err(StoreError::AlreadySet(id.clone()))
        }
    }

    /// Wait until `id` holds a value.
    pub async fn get(&self, id: &ResultId) -> Result<Arc<Value>, StoreError> {
        let mut rx = self
            .slots
            .get(id)
            .map(|slot| slot.subscribe())
            .ok_or_else(|| StoreError::Unknown(id.clone()))?;
        let ready = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| StoreError::Removed(id.clone()))?;
        ready.clone().ok_or_else(|| StoreError::Removed(id.clone()))
    }

    /// The value for `id` if it is ready.
    pub fn try_get(&self, id: &ResultId) -> Option<Arc<Value>> {
        self.slots.get(id).and_then(|slot| slot.borrow().clone())
    }

    /// True if `id` holds a value.
    pub fn has(&self, id: &ResultId) -> bool {
        self.slots
            .get(id)
            .map(|slot| slot.borrow().is_some())
            .unwrap_or(false)
    }

    /// True if `id` is registered and still empty.
    pub fn awaiting(&self, id: &ResultId) -> bool {
        self.slots
            .get(id)
            .map(|slot| slot.borrow().is_none())
            .unwrap_or(false)
    }

    /// True if `id` is registered, ready or not.
    pub fn contains(&self, id: &ResultId) -> bool {
        self.slots.contains_key(id)
    }

    /// Drop the slot for `id`. Pending waiters fail with `Removed`.
    pub fn remove(&self, id: &ResultId) -> bool {
        self.slots.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
