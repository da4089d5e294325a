//! # Update Bus
//! Fan-out of "this panel changed" events from the refresh scheduler to all
//! connected client sessions.
//!
//! Built on `tokio::sync::broadcast`: producers never block, and a consumer
//! that falls behind the channel capacity observes `RecvError::Lagged`, which
//! the session layer treats as its resync signal (drop-oldest per consumer).

use metrics::counter;
use serde::Serialize;
use tokio::sync::broadcast;

/// Why an update was emitted for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateReason {
    /// A routine successful refresh.
    Success,
    /// First success after one or more failures.
    Recovered,
    /// First failure after a success (last-known-good payload retained).
    Degraded,
}

/// Immutable change notification. Carries no payload; consumers read the
/// fresh entry from the cache so late delivery never ships outdated data.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateEvent {
    pub source_id: String,
    pub emitted_at: u64,
    pub reason: UpdateReason,
}

impl UpdateEvent {
    pub fn now(source_id: impl Into<String>, reason: UpdateReason) -> Self {
        Self {
            source_id: source_id.into(),
            emitted_at: crate::now_unix(),
            reason,
        }
    }
}

#[derive(Debug)]
pub struct UpdateBus {
    tx: broadcast::Sender<UpdateEvent>,
}

impl UpdateBus {
    /// `capacity` bounds how many undelivered events a slow session may miss
    /// before it is forced into a resync.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers. Never blocks; with no
    /// subscribers the event is simply dropped.
    pub fn publish(&self, ev: UpdateEvent) {
        counter!("bus_events_total").increment(1);
        tracing::debug!(
            source = %ev.source_id,
            reason = ?ev.reason,
            subscribers = self.tx.receiver_count(),
            "bus publish"
        );
        let _ = self.tx.send(ev);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
