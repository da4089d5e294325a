// src/adapters/mod.rs
//
// Leaf collaborators of the refresh core. Each adapter performs one fetch
// attempt for one source and returns a normalized JSON object or a typed
// failure; it keeps no state between calls.

pub mod fixture;
pub mod http_json;
pub mod rss;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AdapterCfg;

/// Normalized failure taxonomy for a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    Transport,
    Parse,
    /// Upstream answered but refused us (4xx/5xx, rate limit, block page).
    UpstreamRejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Parse, message)
    }

    pub fn upstream_rejected(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::UpstreamRejected, message)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

/// One fetch-and-normalize function for one source.
///
/// The scheduler wraps every call in its own `tokio::time::timeout`, so
/// implementations do not need their own deadline handling; anything that
/// hangs is cut off and reported as `Timeout` by the caller.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;
    fn name(&self) -> &str;
}

/// Build the adapter a source's configuration refers to.
pub fn build(cfg: &AdapterCfg, source_id: &str) -> Arc<dyn Adapter> {
    match cfg {
        AdapterCfg::HttpJson { url } => {
            Arc::new(http_json::HttpJsonAdapter::new(source_id, url.clone()))
        }
        AdapterCfg::Rss { url } => Arc::new(rss::RssAdapter::from_url(source_id, url.clone())),
        AdapterCfg::Fixture { payload } => {
            Arc::new(fixture::FixtureAdapter::steady(source_id, payload.clone()))
        }
    }
}
