//! Iris daemon runtime: per-connection key establishment and custody.
//!
//! The daemon owns the state the key-agreement engine must not: a registry
//! of connections keyed by id, the bounded retry policy around handshake
//! attempts, the broadcast channel that carries diagnostic events to
//! callers, and the relay-side stream-cipher contract that consumes derived
//! keys. Transport, room membership, and message routing live elsewhere.

#![forbid(unsafe_code)]

pub mod errors;
pub mod event_system;
pub mod registry;
pub mod relay;
pub mod service;

pub use errors::{DaemonError, Result};
pub use event_system::{Event, EventKind, EventSystem};
pub use registry::{ConnectionRegistry, ConnectionState, ConnectionStatus, RegistryConfig};
pub use service::{HandshakeService, ServiceConfig};
