//! libremora: client library for Remora.
//!
//! ```no_run
//! # async fn demo() -> libremora::Result<()> {
//! use libremora::{Client, Value};
//!
//! let client = Client::discover()?;
//! let text = client.class("builtins.str").await?;
//! let hello = text.new_instance(vec![Value::from("hello")]).await?;
//! let shout = hello.method("upper", vec![]).await?;
//! assert_eq!(shout.get().await?, Value::from("HELLO"));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod handle;
pub mod proxy;

pub use backend::{Backend, HttpBackend, LocalBackend};
pub use client::{Catalogue, Client};
pub use error::{ClientError, Result};
pub use handle::{Outcome, RemoteHandle};
pub use proxy::ProxyClass;

pub use remora_core::{ClassDescriptor, Command, ExecutionFailure, ResultId, Value};
