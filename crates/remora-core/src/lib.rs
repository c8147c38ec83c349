//! remora-core: the value model, command protocol, wire codec and
//! configuration shared by every Remora crate.

pub mod codec;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod id;
pub mod value;

pub use command::{Command, CommandKind, Kwargs};
pub use descriptor::{ClassDescriptor, Contract, MethodDescriptor};
pub use id::ResultId;
pub use value::{ExecutionFailure, Instance, Slice, Value};
