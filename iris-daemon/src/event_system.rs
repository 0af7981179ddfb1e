//! Pub/sub for daemon events over a broadcast channel.
//!
//! Handshake stage diagnostics and connection lifecycle notices flow through
//! here to whoever subscribed. The text is informational only; subscribers
//! must not attach protocol meaning to it.

use std::sync::Arc;

use iris_core::types::ConnectionId;
use iris_qkd::Stage;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// Category of a daemon event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Connection registered, established, closed.
    Lifecycle,
    /// Per-stage handshake diagnostics.
    Progress,
    /// A handshake attempt or connection failed.
    Failure,
}

/// One daemon event, addressed to a connection's caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Connection the event concerns.
    pub connection_id: ConnectionId,
    pub detail: String,
}

impl Event {
    /// Lifecycle notice for a connection.
    pub fn lifecycle(connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self { kind: EventKind::Lifecycle, connection_id, detail: detail.into() }
    }

    /// Stage diagnostic emitted during a handshake attempt.
    pub fn progress(connection_id: ConnectionId, stage: Stage, detail: &str) -> Self {
        Self {
            kind: EventKind::Progress,
            connection_id,
            detail: format!("{stage:?}: {detail}"),
        }
    }

    /// Failure notice for a connection.
    pub fn failure(connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self { kind: EventKind::Failure, connection_id, detail: detail.into() }
    }
}

/// Simple pub/sub for daemon events over a broadcast channel.
#[derive(Clone)]
pub struct EventSystem {
    tx: broadcast::Sender<Event>,
    // naive filter state; can evolve to per-subscriber rules
    default_kinds: Arc<RwLock<Vec<EventKind>>>,
}

impl EventSystem {
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer);
        Self {
            tx,
            default_kinds: Arc::new(RwLock::new(vec![EventKind::Lifecycle, EventKind::Failure])),
        }
    }

    pub fn sender(&self) -> broadcast::Sender<Event> {
        self.tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event; a send with no live subscribers is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub async fn set_default_kinds(&self, kinds: Vec<EventKind>) {
        *self.default_kinds.write().await = kinds;
    }

    /// Whether `ev` passes the subscriber's filter, falling back to the
    /// default kinds when no explicit filter was given.
    pub async fn matches(&self, ev: &Event, filter: &Option<Vec<EventKind>>) -> bool {
        let allow = match filter {
            Some(kinds) => kinds,
            None => &*self.default_kinds.read().await,
        };
        allow.contains(&ev.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let events = EventSystem::new(16);
        let mut rx = events.subscribe();
        events.publish(Event::lifecycle(7, "registered"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Lifecycle);
        assert_eq!(ev.connection_id, 7);
    }

    #[tokio::test]
    async fn default_filter_hides_progress() {
        let events = EventSystem::new(16);
        let progress = Event::progress(1, Stage::Sifting, "kept 12/24 rounds");
        assert!(!events.matches(&progress, &None).await);
        assert!(events.matches(&progress, &Some(vec![EventKind::Progress])).await);

        let failure = Event::failure(1, "attempt aborted");
        assert!(events.matches(&failure, &None).await);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let events = EventSystem::new(4);
        events.publish(Event::failure(2, "nobody listening"));
    }
}
