//! Connection registry and key custody.
//!
//! An explicit store keyed by connection id, injected into whatever drives
//! it; nothing in the daemon reaches for ambient global state. Each entry
//! tracks the handshake lifecycle for one connection and, once established,
//! holds the derived key for the lifetime of that connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use iris_core::types::ConnectionId;
use iris_qkd::FinalKey;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::{DaemonError, Result};

/// Lifecycle of one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Registered, no handshake attempt started yet.
    Pending,
    /// A handshake attempt is in flight.
    Handshaking,
    /// A key was committed; the connection is usable.
    Established,
    /// All attempts exhausted or a fatal error occurred.
    Failed,
}

/// Per-connection entry.
struct Connection {
    state: ConnectionState,
    key: Option<FinalKey>,
    attempts: u32,
    created_at: Instant,
    last_activity: Instant,
}

impl Connection {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: ConnectionState::Pending,
            key: None,
            attempts: 0,
            created_at: now,
            last_activity: now,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
    /// Enable registry metrics collection.
    pub enable_metrics: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_connections: 1024, enable_metrics: true }
    }
}

/// Registry-level metrics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegistryMetrics {
    pub connections_registered: u64,
    pub handshakes_succeeded: u64,
    pub handshakes_failed: u64,
    pub connections_closed: u64,
}

/// Connection status snapshot, safe to report outward. Carries no key
/// material.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub attempts: u32,
    pub age: Duration,
    pub idle_time: Duration,
    pub has_key: bool,
}

/// Store of per-connection handshake state, keyed by connection id.
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
    config: RegistryConfig,
    metrics: Arc<RwLock<RegistryMetrics>>,
}

impl ConnectionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            config,
            metrics: Arc::new(RwLock::new(RegistryMetrics::default())),
        }
    }

    /// Register a connection id assigned by the session layer.
    pub async fn register(&self, id: ConnectionId) -> Result<()> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(DaemonError::ResourceExhaustion(connections.len()));
        }
        if connections.contains_key(&id) {
            return Err(DaemonError::ConnectionExists(id));
        }
        connections.insert(id, Connection::new());
        drop(connections);

        if self.config.enable_metrics {
            self.metrics.write().await.connections_registered += 1;
        }
        info!(connection_id = id, "connection registered");
        Ok(())
    }

    /// Record the start of a handshake attempt, returning the attempt count.
    pub async fn begin_attempt(&self, id: ConnectionId) -> Result<u32> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&id)
            .ok_or(DaemonError::ConnectionNotFound(id))?;
        conn.state = ConnectionState::Handshaking;
        conn.attempts += 1;
        conn.touch();
        Ok(conn.attempts)
    }

    /// Commit a derived key, marking the connection established.
    ///
    /// A connection closed while its handshake was in flight is gone from the
    /// store; the key is dropped and the caller gets
    /// [`DaemonError::Cancelled`], never a key committed to a dead entry.
    pub async fn commit_key(&self, id: ConnectionId, key: FinalKey) -> Result<()> {
        let mut connections = self.connections.write().await;
        let conn = connections.get_mut(&id).ok_or(DaemonError::Cancelled(id))?;
        conn.key = Some(key);
        conn.state = ConnectionState::Established;
        conn.touch();
        drop(connections);

        if self.config.enable_metrics {
            self.metrics.write().await.handshakes_succeeded += 1;
        }
        info!(connection_id = id, "key committed, connection established");
        Ok(())
    }

    /// Mark a connection failed after its attempts were exhausted.
    pub async fn mark_failed(&self, id: ConnectionId) -> Result<()> {
        let mut connections = self.connections.write().await;
        let conn = connections.get_mut(&id).ok_or(DaemonError::Cancelled(id))?;
        conn.key = None;
        conn.state = ConnectionState::Failed;
        conn.touch();
        drop(connections);

        if self.config.enable_metrics {
            self.metrics.write().await.handshakes_failed += 1;
        }
        Ok(())
    }

    /// Remove a connection from the store. Any in-flight handshake for it
    /// will find the entry gone and abandon its result.
    pub async fn close(&self, id: ConnectionId) -> Result<()> {
        let removed = self.connections.write().await.remove(&id);
        if removed.is_none() {
            return Err(DaemonError::ConnectionNotFound(id));
        }
        if self.config.enable_metrics {
            self.metrics.write().await.connections_closed += 1;
        }
        info!(connection_id = id, "connection closed");
        Ok(())
    }

    /// The established key for a connection, for the message-relay layer.
    pub async fn key(&self, id: ConnectionId) -> Result<FinalKey> {
        let connections = self.connections.read().await;
        let conn = connections
            .get(&id)
            .ok_or(DaemonError::ConnectionNotFound(id))?;
        conn.key.clone().ok_or(DaemonError::KeyUnavailable(id))
    }

    /// Status snapshot for one connection.
    pub async fn status(&self, id: ConnectionId) -> Option<ConnectionStatus> {
        let connections = self.connections.read().await;
        connections.get(&id).map(|conn| ConnectionStatus {
            id,
            state: conn.state,
            attempts: conn.attempts,
            age: conn.created_at.elapsed(),
            idle_time: conn.last_activity.elapsed(),
            has_key: conn.key.is_some(),
        })
    }

    pub async fn active_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn metrics(&self) -> RegistryMetrics {
        *self.metrics.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> FinalKey {
        // Any fixed pair works; the registry never inspects key contents.
        let bits = vec![true, false, true];
        let pair = iris_qkd::SiftedKeyPair::new(bits.clone(), bits).unwrap();
        let mut rng = <rand_chacha::ChaCha20Rng as rand::SeedableRng>::seed_from_u64(1);
        iris_qkd::amplify::amplify(&pair, &mut rng).unwrap()
    }

    #[tokio::test]
    async fn register_and_status() {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        registry.register(1).await.unwrap();
        let status = registry.status(1).await.unwrap();
        assert_eq!(status.state, ConnectionState::Pending);
        assert_eq!(status.attempts, 0);
        assert!(!status.has_key);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        registry.register(1).await.unwrap();
        assert!(matches!(
            registry.register(1).await,
            Err(DaemonError::ConnectionExists(1))
        ));
    }

    #[tokio::test]
    async fn capacity_limit_is_enforced() {
        let registry = ConnectionRegistry::new(RegistryConfig {
            max_connections: 2,
            ..Default::default()
        });
        registry.register(1).await.unwrap();
        registry.register(2).await.unwrap();
        assert!(matches!(
            registry.register(3).await,
            Err(DaemonError::ResourceExhaustion(2))
        ));
    }

    #[tokio::test]
    async fn commit_establishes_and_key_is_retrievable() {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        registry.register(5).await.unwrap();
        registry.begin_attempt(5).await.unwrap();
        let key = test_key();
        registry.commit_key(5, key.clone()).await.unwrap();

        let status = registry.status(5).await.unwrap();
        assert_eq!(status.state, ConnectionState::Established);
        assert!(status.has_key);
        assert_eq!(registry.key(5).await.unwrap(), key);
    }

    #[tokio::test]
    async fn commit_after_close_is_cancelled() {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        registry.register(9).await.unwrap();
        registry.begin_attempt(9).await.unwrap();
        registry.close(9).await.unwrap();
        assert!(matches!(
            registry.commit_key(9, test_key()).await,
            Err(DaemonError::Cancelled(9))
        ));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn key_unavailable_before_establishment() {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        registry.register(3).await.unwrap();
        assert!(matches!(
            registry.key(3).await,
            Err(DaemonError::KeyUnavailable(3))
        ));
        assert!(matches!(
            registry.key(4).await,
            Err(DaemonError::ConnectionNotFound(4))
        ));
    }

    #[tokio::test]
    async fn metrics_track_lifecycle() {
        let registry = ConnectionRegistry::new(RegistryConfig::default());
        registry.register(1).await.unwrap();
        registry.register(2).await.unwrap();
        registry.begin_attempt(1).await.unwrap();
        registry.commit_key(1, test_key()).await.unwrap();
        registry.mark_failed(2).await.unwrap();
        registry.close(1).await.unwrap();

        let metrics = registry.metrics().await;
        assert_eq!(metrics.connections_registered, 2);
        assert_eq!(metrics.handshakes_succeeded, 1);
        assert_eq!(metrics.handshakes_failed, 1);
        assert_eq!(metrics.connections_closed, 1);
    }
}
