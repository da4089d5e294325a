//! # Trend Buffer
//! Short in-memory history of one numeric reading per source (temperature,
//! index level, AQI, ...), for sparkline-style panels.
//!
//! Samples are extracted by the scheduler from successful payloads via a
//! configured JSON pointer. This is informational only and is the entire
//! extent of historical storage; nothing is persisted.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use serde::Serialize;

use crate::now_unix;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrendSample {
    pub ts_unix: u64,
    pub value: f64,
}

/// Thread-safe per-source ring of recent samples.
#[derive(Debug)]
pub struct PanelTrends {
    inner: Mutex<HashMap<String, VecDeque<TrendSample>>>,
    cap: usize,
}

impl PanelTrends {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            cap: cap.clamp(1, 10_000),
        }
    }

    /// Record a new observation. If `ts_unix` is `None`, current time is used.
    pub fn record(&self, source_id: &str, value: f64, ts_unix: Option<u64>) {
        let ts = ts_unix.unwrap_or_else(now_unix);
        let mut map = self.inner.lock().expect("trend mutex poisoned");
        let buf = map.entry(source_id.to_string()).or_default();
        buf.push_back(TrendSample { ts_unix: ts, value });
        while buf.len() > self.cap {
            buf.pop_front();
        }
    }

    /// Oldest-first copy of the buffered samples for one source.
    pub fn snapshot(&self, source_id: &str) -> Vec<TrendSample> {
        let map = self.inner.lock().expect("trend mutex poisoned");
        map.get(source_id)
            .map(|buf| buf.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn average(&self, source_id: &str) -> Option<f64> {
        let map = self.inner.lock().expect("trend mutex poisoned");
        let buf = map.get(source_id)?;
        if buf.is_empty() {
            return None;
        }
        Some(buf.iter().map(|s| s.value).sum::<f64>() / buf.len() as f64)
    }
}
