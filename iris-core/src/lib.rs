//! Iris core utilities: shared types, configuration loading, and the core
//! error taxonomy used across the workspace.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod types;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use types::ConnectionId;
