// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod adapters;
pub mod api;
pub mod bus;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod scheduler;
pub mod session;
pub mod trend;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::bus::{UpdateBus, UpdateEvent, UpdateReason};
pub use crate::cache::{CacheEntry, PanelCache, PanelStatus};
pub use crate::session::{Session, SessionState, WireMessage};

/// Current UNIX time in seconds.
pub fn now_unix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
