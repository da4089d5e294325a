//! # Client Sessions
//! One session per connected dashboard client. A session first replays a full
//! cache snapshot, then streams single-source updates as the bus delivers
//! them. If the client falls behind the bus buffer the session switches to a
//! resync: one fresh snapshot instead of a backlog of stale diffs.
//!
//! Per session: `Connecting → Streaming → (Resyncing ⇄ Streaming) → Closed`.
//! `Closed` is terminal; a reconnect gets a new session id. Sessions are
//! fully independent — nothing a session does can stall the scheduler or
//! another session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::bus::{UpdateBus, UpdateEvent};
use crate::cache::{CacheEntry, PanelCache, PanelStatus};
use crate::now_unix;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Resyncing,
    Closed,
}

/// One entry of a snapshot or single-source update, as shipped to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub source_id: String,
    pub payload: Value,
    pub status: PanelStatus,
    pub fetched_at: u64,
}

impl SnapshotEntry {
    fn from_entry(source_id: &str, entry: &CacheEntry, now: u64) -> Self {
        Self {
            source_id: source_id.to_string(),
            payload: entry.payload.clone(),
            status: entry.display_status(now),
            fetched_at: entry.fetched_at,
        }
    }
}

/// Discrete push-stream message. The sequence contract is fixed: one
/// `snapshot` at connect (and per resync), then `update` per change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Snapshot {
        entries: Vec<SnapshotEntry>,
    },
    Update {
        source_id: String,
        payload: Value,
        status: PanelStatus,
        fetched_at: u64,
    },
}

impl WireMessage {
    /// SSE event name for this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            WireMessage::Snapshot { .. } => "snapshot",
            WireMessage::Update { .. } => "update",
        }
    }
}

pub struct Session {
    id: u64,
    state: SessionState,
    rx: broadcast::Receiver<UpdateEvent>,
    cache: Arc<PanelCache>,
    /// `None` means interested in every source.
    interest: Option<HashSet<String>>,
}

impl Session {
    /// Register with the bus and start in `Connecting`. Subscribing before
    /// the snapshot is taken means no update between snapshot and first recv
    /// can be missed.
    pub fn connect(cache: Arc<PanelCache>, bus: &UpdateBus, interest: Option<HashSet<String>>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let rx = bus.subscribe();
        gauge!("sse_clients").increment(1.0);
        tracing::info!(session = id, "client connected");
        Self {
            id,
            state: SessionState::Connecting,
            rx,
            cache,
            interest,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn interested(&self, source_id: &str) -> bool {
        self.interest
            .as_ref()
            .is_none_or(|set| set.contains(source_id))
    }

    fn snapshot_message(&self) -> WireMessage {
        let now = now_unix();
        let entries = self
            .cache
            .entries()
            .iter()
            .filter(|(id, _)| self.interested(id))
            .map(|(id, entry)| SnapshotEntry::from_entry(id, entry, now))
            .collect();
        WireMessage::Snapshot { entries }
    }

    fn resync(&mut self) -> WireMessage {
        self.state = SessionState::Streaming;
        self.snapshot_message()
    }

    /// Produce the next message for this client, or `None` once the session
    /// is closed. Drives the session state machine.
    pub async fn next_message(&mut self) -> Option<WireMessage> {
        match self.state {
            SessionState::Connecting | SessionState::Resyncing => Some(self.resync()),
            SessionState::Streaming => loop {
                match self.rx.recv().await {
                    Ok(ev) => {
                        if !self.interested(&ev.source_id) {
                            continue;
                        }
                        // Read the entry fresh so a late delivery never ships
                        // older data than the cache holds.
                        let Some(entry) = self.cache.get(&ev.source_id) else {
                            continue;
                        };
                        let now = now_unix();
                        return Some(WireMessage::Update {
                            status: entry.display_status(now),
                            source_id: ev.source_id,
                            payload: entry.payload,
                            fetched_at: entry.fetched_at,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        counter!("sse_lagged_total").increment(1);
                        tracing::warn!(session = self.id, missed, "client lagged, resyncing");
                        self.state = SessionState::Resyncing;
                        // Repair the gap with a full snapshot, not a backlog.
                        return Some(self.resync());
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.state = SessionState::Closed;
                        return None;
                    }
                }
            },
            SessionState::Closed => None,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        gauge!("sse_clients").decrement(1.0);
        tracing::info!(session = self.id, "client disconnected");
    }
}
