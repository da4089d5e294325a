// src/config.rs
//
// Static startup configuration: the list of sources (id, adapter, cadence,
// ttl, timeout) plus server settings. Loaded once from TOML; no hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const ENV_PATH: &str = "CITYDASH_CONFIG";
const DEFAULT_PATH: &str = "config/sources.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerCfg,
    pub sources: Vec<SourceCfg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
    pub bind: String,
    /// Broadcast buffer per the whole bus; a session this far behind resyncs.
    pub bus_capacity: usize,
    pub sse_ping_secs: u64,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            bus_capacity: 64,
            sse_ping_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCfg {
    pub id: String,
    pub adapter: AdapterCfg,
    pub refresh_secs: u64,
    pub ttl_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// JSON pointer into the payload for the per-source trend buffer,
    /// e.g. "/current/temperature".
    #[serde(default)]
    pub trend_pointer: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl SourceCfg {
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterCfg {
    HttpJson { url: String },
    Rss { url: String },
    Fixture { payload: serde_json::Value },
}

pub fn load_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let cfg: Config = toml::from_str(&content)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Load config using env var + fallback:
/// 1) $CITYDASH_CONFIG
/// 2) config/sources.toml
pub fn load_default() -> Result<Config> {
    let path = std::env::var(ENV_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_PATH));
    load_from(&path)
}

fn validate(cfg: &Config) -> Result<()> {
    if cfg.sources.is_empty() {
        bail!("no sources configured");
    }
    let mut seen = std::collections::HashSet::new();
    for s in &cfg.sources {
        if s.id.trim().is_empty() {
            bail!("source with empty id");
        }
        if !seen.insert(s.id.as_str()) {
            bail!("duplicate source id '{}'", s.id);
        }
        if s.refresh_secs == 0 || s.ttl_secs == 0 || s.timeout_secs == 0 {
            bail!("source '{}': intervals must be non-zero", s.id);
        }
        // A fetch must never span its own refresh window.
        if s.timeout_secs >= s.refresh_secs {
            bail!(
                "source '{}': timeout ({}s) must be strictly less than refresh interval ({}s)",
                s.id,
                s.timeout_secs,
                s.refresh_secs
            );
        }
    }
    if cfg.server.bus_capacity == 0 {
        bail!("server.bus_capacity must be non-zero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        bind = "127.0.0.1:8000"
        bus_capacity = 32

        [[sources]]
        id = "weather"
        refresh_secs = 1800
        ttl_secs = 2000
        timeout_secs = 10
        trend_pointer = "/current/temperature"
        adapter = { kind = "http_json", url = "https://api.open-meteo.com/v1/forecast" }

        [[sources]]
        id = "news"
        refresh_secs = 600
        ttl_secs = 700
        adapter = { kind = "rss", url = "https://feeds.example.org/city" }
    "#;

    #[test]
    fn sample_config_parses_and_validates() {
        let cfg: Config = toml::from_str(SAMPLE).expect("toml parses");
        validate(&cfg).expect("sample is valid");
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.server.bus_capacity, 32);
        assert_eq!(cfg.server.sse_ping_secs, 30, "default ping");
        assert_eq!(cfg.sources[0].timeout(), Duration::from_secs(10));
        assert!(matches!(cfg.sources[1].adapter, AdapterCfg::Rss { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.sources[1].id = "weather".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn timeout_must_stay_below_refresh_interval() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.sources[0].timeout_secs = cfg.sources[0].refresh_secs;
        let err = validate(&cfg).expect_err("equal timeout must fail");
        assert!(err.to_string().contains("strictly less"));
    }

    #[test]
    fn empty_source_list_is_rejected() {
        let cfg: Config = toml::from_str("sources = []").unwrap();
        assert!(validate(&cfg).is_err());
    }
}
