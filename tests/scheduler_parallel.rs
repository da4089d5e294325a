// tests/scheduler_parallel.rs
//
// Failure and latency isolation across sources: ten sources whose adapters
// each sleep half a refresh interval must all complete their first fetch in
// about one interval of (paused) time — parallel, not serialized — and a
// source that keeps failing must never delay or mark its neighbors.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use citydash::adapters::fixture::FixtureAdapter;
use citydash::adapters::{Adapter, FetchError};
use citydash::bus::UpdateBus;
use citydash::cache::{PanelCache, PanelStatus};
use citydash::config::{AdapterCfg, SourceCfg};
use citydash::scheduler::{self, SchedulerCtx};
use citydash::trend::PanelTrends;

fn source(id: &str, refresh_secs: u64) -> SourceCfg {
    SourceCfg {
        id: id.to_string(),
        adapter: AdapterCfg::Fixture {
            payload: serde_json::Value::Null,
        },
        refresh_secs,
        ttl_secs: refresh_secs * 2,
        timeout_secs: refresh_secs - 1,
        trend_pointer: None,
    }
}

#[tokio::test(start_paused = true)]
async fn ten_slow_sources_refresh_in_parallel_not_serially() {
    let sources: Vec<SourceCfg> = (0..10).map(|i| source(&format!("s{i}"), 10)).collect();
    let ctx = SchedulerCtx {
        cache: Arc::new(PanelCache::new(&sources)),
        bus: Arc::new(UpdateBus::new(64)),
        trends: Arc::new(PanelTrends::with_capacity(8)),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let started = tokio::time::Instant::now();
    let tasks: Vec<_> = sources
        .iter()
        .map(|s| {
            // Each fetch takes half the refresh interval.
            let adapter: Arc<dyn Adapter> = Arc::new(
                FixtureAdapter::steady(&s.id, json!({"ok": true}))
                    .with_delay(Duration::from_secs(5)),
            );
            scheduler::spawn_source(s.clone(), adapter, ctx.clone(), shutdown_rx.clone())
        })
        .collect();

    loop {
        let done = ctx
            .cache
            .entries()
            .iter()
            .filter(|(_, e)| e.fetched_at > 0)
            .count();
        if done == 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Jitter (≤ interval/4) + one 5s fetch + polling slack. Serial execution
    // would need 50s+.
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_secs(10),
        "ten 5s fetches must overlap, took {elapsed:?}"
    );

    let _ = shutdown_tx.send(true);
    for t in tasks {
        let _ = t.await;
    }
}

#[tokio::test(start_paused = true)]
async fn a_failing_source_never_affects_its_neighbor() {
    let sources = vec![source("broken", 10), source("healthy", 10)];
    let ctx = SchedulerCtx {
        cache: Arc::new(PanelCache::new(&sources)),
        bus: Arc::new(UpdateBus::new(64)),
        trends: Arc::new(PanelTrends::with_capacity(8)),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let broken: Arc<dyn Adapter> = Arc::new(FixtureAdapter::from_script(
        "broken",
        vec![Err(FetchError::upstream_rejected("403 blocked"))],
    ));
    let healthy: Arc<dyn Adapter> =
        Arc::new(FixtureAdapter::steady("healthy", json!({"n": 1})));
    let t1 = scheduler::spawn_source(
        sources[0].clone(),
        broken,
        ctx.clone(),
        shutdown_rx.clone(),
    );
    let t2 = scheduler::spawn_source(sources[1].clone(), healthy, ctx.clone(), shutdown_rx);

    // Let the broken source fail repeatedly while the healthy one keeps
    // refreshing.
    while ctx.cache.consecutive_failures("broken") < 3 {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    let healthy_entry = ctx.cache.get("healthy").expect("entry");
    assert_eq!(healthy_entry.status, PanelStatus::Fresh);
    assert_eq!(healthy_entry.consecutive_failures, 0);
    assert_eq!(healthy_entry.payload["n"], 1);

    let broken_entry = ctx.cache.get("broken").expect("entry");
    assert_eq!(broken_entry.status, PanelStatus::Error);

    let _ = shutdown_tx.send(true);
    let _ = t1.await;
    let _ = t2.await;
}
