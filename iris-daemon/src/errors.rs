/// Error types for the Iris daemon runtime.
use iris_core::types::ConnectionId;
use thiserror::Error;

pub type Result<T, E = DaemonError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("connection {0} is not registered")]
    ConnectionNotFound(ConnectionId),
    #[error("connection {0} already registered")]
    ConnectionExists(ConnectionId),
    #[error("connection {0} has no established key")]
    KeyUnavailable(ConnectionId),
    #[error("connection {0} closed before its handshake completed")]
    Cancelled(ConnectionId),
    #[error("handshake failed after {attempts} attempts: {last}")]
    HandshakeFailed {
        attempts: u32,
        #[source]
        last: iris_qkd::Error,
    },
    #[error("registry at capacity ({0} connections)")]
    ResourceExhaustion(usize),
    #[error("relay key material invalid: {0}")]
    InvalidKeyMaterial(String),
}

impl DaemonError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
