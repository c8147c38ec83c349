//! CLI command modules.

pub mod commands;
pub mod contract;
pub mod http;
pub mod results;
