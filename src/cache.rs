//! # Panel Cache
//! Holds the latest normalized payload per source, stale-while-revalidate
//! style: a failed refresh keeps the last good payload and only flips the
//! status, so a failing panel never goes blank.
//!
//! Every entry is written by exactly one scheduler task (its source's), and
//! replaced whole under the lock, so readers always see a consistent entry.
//! Entries are never evicted while their source exists; staleness is advisory
//! for the UI, not a removal policy.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::adapters::FetchError;
use crate::bus::UpdateReason;
use crate::config::SourceCfg;
use crate::now_unix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelStatus {
    Fresh,
    Stale,
    Error,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Normalized payload. `Null` only before the first successful fetch;
    /// after that it is only ever replaced by a newer successful payload.
    pub payload: Value,
    /// Unix seconds of the last successful fetch (0 = never).
    pub fetched_at: u64,
    pub ttl: Duration,
    /// Outcome of the most recent attempt: `Fresh` after a success, `Error`
    /// after a failure. `Stale` only appears in the display status.
    pub status: PanelStatus,
    pub last_error: Option<FetchError>,
    pub consecutive_failures: u32,
}

impl CacheEntry {
    fn initial(ttl: Duration) -> Self {
        Self {
            payload: Value::Null,
            fetched_at: 0,
            ttl,
            status: PanelStatus::Stale,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// What the UI should show: `Error` while the source is failing,
    /// otherwise `Fresh`/`Stale` by TTL age.
    pub fn display_status(&self, now: u64) -> PanelStatus {
        if self.status == PanelStatus::Error {
            PanelStatus::Error
        } else if now.saturating_sub(self.fetched_at) > self.ttl.as_secs() {
            PanelStatus::Stale
        } else {
            PanelStatus::Fresh
        }
    }
}

#[derive(Debug)]
pub struct PanelCache {
    inner: RwLock<HashMap<String, CacheEntry>>,
    /// Configured source ids in declaration order; fixes snapshot ordering.
    order: Vec<String>,
}

impl PanelCache {
    /// Pre-registers one entry per configured source so a snapshot always
    /// covers every source, even before its first fetch.
    pub fn new(sources: &[SourceCfg]) -> Self {
        let mut map = HashMap::with_capacity(sources.len());
        let mut order = Vec::with_capacity(sources.len());
        for s in sources {
            map.insert(s.id.clone(), CacheEntry::initial(s.ttl()));
            order.push(s.id.clone());
        }
        Self {
            inner: RwLock::new(map),
            order,
        }
    }

    pub fn get(&self, source_id: &str) -> Option<CacheEntry> {
        self.inner
            .read()
            .expect("panel cache rwlock poisoned")
            .get(source_id)
            .cloned()
    }

    /// All entries in configured order.
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        let map = self.inner.read().expect("panel cache rwlock poisoned");
        self.order
            .iter()
            .filter_map(|id| map.get(id).map(|e| (id.clone(), e.clone())))
            .collect()
    }

    pub fn source_ids(&self) -> &[String] {
        &self.order
    }

    pub fn is_stale(&self, source_id: &str) -> Option<bool> {
        let now = now_unix();
        self.get(source_id)
            .map(|e| now.saturating_sub(e.fetched_at) > e.ttl.as_secs())
    }

    pub fn consecutive_failures(&self, source_id: &str) -> u32 {
        self.get(source_id).map_or(0, |e| e.consecutive_failures)
    }

    /// Record a successful fetch. Replaces the payload, resets the failure
    /// counter, and reports whether this was a routine success or a recovery.
    ///
    /// Returns `None` for an unknown source id, which would mean a scheduler
    /// task outliving its configuration (programmer error): loud in debug,
    /// logged and skipped in release.
    pub fn put_ok(&self, source_id: &str, payload: Value) -> Option<UpdateReason> {
        let mut map = self.inner.write().expect("panel cache rwlock poisoned");
        let Some(entry) = map.get_mut(source_id) else {
            debug_assert!(false, "put_ok for unregistered source {source_id}");
            tracing::error!(source = source_id, "cache write for unregistered source");
            return None;
        };
        let reason = if entry.status == PanelStatus::Error {
            UpdateReason::Recovered
        } else {
            UpdateReason::Success
        };
        *entry = CacheEntry {
            payload,
            fetched_at: now_unix(),
            ttl: entry.ttl,
            status: PanelStatus::Fresh,
            last_error: None,
            consecutive_failures: 0,
        };
        Some(reason)
    }

    /// Record a failed fetch. The previous payload and `fetched_at` are
    /// retained; only the status, error and failure counter move.
    ///
    /// Returns `Some(Degraded)` on the ok→error transition only, so repeated
    /// failures do not flood clients with no-op updates.
    pub fn put_err(&self, source_id: &str, err: FetchError) -> Option<UpdateReason> {
        let mut map = self.inner.write().expect("panel cache rwlock poisoned");
        let Some(entry) = map.get_mut(source_id) else {
            debug_assert!(false, "put_err for unregistered source {source_id}");
            tracing::error!(source = source_id, "cache write for unregistered source");
            return None;
        };
        let transitioned = entry.status != PanelStatus::Error;
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(err);
        entry.status = PanelStatus::Error;
        transitioned.then_some(UpdateReason::Degraded)
    }
}
