//! Handshake driver service.
//!
//! Wraps the key-agreement engine in the policy the engine deliberately does
//! not carry: a bounded retry loop with backoff around retryable outcomes,
//! key custody through the registry, diagnostic forwarding to the event
//! channel, and abandonment of in-flight work when the owning connection
//! closes. The pipeline itself is CPU-bound, so every attempt runs on a
//! blocking worker thread, one isolated RNG per attempt.

use std::sync::Arc;
use std::time::Duration;

use iris_core::types::ConnectionId;
use iris_core::CoreConfig;
use iris_qkd::handshake::handshake_rng;
use iris_qkd::{run_handshake, FinalKey, HandshakeConfig, Stage};
use tracing::{info, warn};

use crate::errors::{DaemonError, Result};
use crate::event_system::{Event, EventSystem};
use crate::registry::ConnectionRegistry;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Engine parameters applied to every attempt.
    pub handshake: HandshakeConfig,
    /// Attempts per connection before it is marked failed.
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt count.
    pub retry_backoff: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            max_attempts: iris_core::types::MAX_HANDSHAKE_ATTEMPTS,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl ServiceConfig {
    /// Derive the service parameters from the core configuration.
    pub fn from_core(cfg: &CoreConfig) -> Self {
        Self {
            handshake: HandshakeConfig::from_core(cfg),
            max_attempts: cfg.max_handshake_attempts,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(DaemonError::config("max_attempts must be positive"));
        }
        self.handshake
            .validate()
            .map_err(|e| DaemonError::config(format!("handshake config: {e}")))
    }
}

/// Per-connection key establishment and lookup.
pub struct HandshakeService {
    registry: Arc<ConnectionRegistry>,
    events: EventSystem,
    config: ServiceConfig,
}

impl HandshakeService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        events: EventSystem,
        config: ServiceConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { registry, events, config })
    }

    /// Establish a key for a registered connection.
    ///
    /// Runs up to `max_attempts` handshake attempts, retrying the retryable
    /// outcomes (channel abort, degenerate key, key divergence) with linear
    /// backoff. On success the key is committed to the registry and returned;
    /// after the last failed attempt the connection is marked failed and the
    /// final engine error is surfaced. A connection closed mid-computation
    /// yields [`DaemonError::Cancelled`] and commits nothing.
    pub async fn establish(&self, id: ConnectionId) -> Result<FinalKey> {
        let mut last: Option<iris_qkd::Error> = None;

        for attempt in 1..=self.config.max_attempts {
            let attempts = match self.registry.begin_attempt(id).await {
                Ok(n) => n,
                // The entry vanished between attempts: the connection closed.
                Err(DaemonError::ConnectionNotFound(_)) if attempt > 1 => {
                    return Err(DaemonError::Cancelled(id));
                }
                Err(e) => return Err(e),
            };

            let (result, progress) = self.run_attempt().await?;
            for (stage, detail) in progress {
                self.events.publish(Event::progress(id, stage, &detail));
            }

            match result {
                Ok(outcome) => {
                    self.registry.commit_key(id, outcome.key.clone()).await?;
                    self.events.publish(Event::lifecycle(
                        id,
                        format!(
                            "established after {attempts} attempt(s), QBER {}",
                            outcome.report.qber
                        ),
                    ));
                    info!(connection_id = id, attempts, "connection established");
                    return Ok(outcome.key);
                }
                Err(
                    err @ (iris_qkd::Error::ChannelAbort { .. }
                    | iris_qkd::Error::DegenerateKey { .. }
                    | iris_qkd::Error::KeyDivergence),
                ) => {
                    warn!(connection_id = id, attempt, error = %err, "handshake attempt failed");
                    self.events
                        .publish(Event::failure(id, format!("attempt {attempt} failed: {err}")));
                    last = Some(err);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
                // Bookkeeping inconsistencies corrupt key material; never
                // retried.
                Err(err) => {
                    self.registry.mark_failed(id).await.ok();
                    self.events.publish(Event::failure(id, format!("fatal: {err}")));
                    return Err(DaemonError::HandshakeFailed { attempts, last: err });
                }
            }
        }

        self.registry.mark_failed(id).await.ok();
        self.events.publish(Event::failure(
            id,
            format!("giving up after {} attempts", self.config.max_attempts),
        ));
        match last {
            Some(err) => Err(DaemonError::HandshakeFailed {
                attempts: self.config.max_attempts,
                last: err,
            }),
            None => Err(DaemonError::internal("retry loop ended without an error")),
        }
    }

    /// One engine attempt on a blocking worker, with its own RNG.
    async fn run_attempt(
        &self,
    ) -> Result<(
        iris_qkd::Result<iris_qkd::HandshakeOutcome>,
        Vec<(Stage, String)>,
    )> {
        let config = self.config.handshake.clone();
        tokio::task::spawn_blocking(move || {
            let mut rng = handshake_rng();
            let mut progress: Vec<(Stage, String)> = Vec::new();
            let result = run_handshake(&config, &mut rng, &mut progress);
            (result, progress)
        })
        .await
        .map_err(|e| DaemonError::internal(format!("handshake worker panicked: {e}")))
    }

    /// The established key for a connection; entry point for the
    /// message-relay layer.
    pub async fn derive_key(&self, id: ConnectionId) -> Result<FinalKey> {
        self.registry.key(id).await
    }
}
