//! remora-services: server-side execution: result and checkpoint stores,
//! the class registry, promise resolution and the worker pool.

pub mod builtins;
pub mod checkpoint_store;
pub mod engine;
pub mod execution;
pub mod executor;
pub mod registry;
pub mod resolve;
pub mod result_store;

pub use checkpoint_store::CheckpointStore;
pub use engine::{Engine, EngineError, Snapshot};
pub use executor::{Executor, PoolExecutor, PoolSettings};
pub use registry::{Args, ClassDef, ExecError, Registry};
pub use result_store::{ResultStore, StoreError};
