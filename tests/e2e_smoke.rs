// tests/e2e_smoke.rs
//
// Whole-stack smoke test: config-built adapters, scheduler tasks, cache,
// bus and router wired exactly as in main, with a fixture source so no
// network is touched. Real (unpaused) time, sub-second cadence.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _;

use citydash::api::{create_router, AppState};
use citydash::bus::UpdateBus;
use citydash::cache::PanelCache;
use citydash::config::Config;
use citydash::scheduler::{self, SchedulerCtx};
use citydash::trend::PanelTrends;

const CONFIG: &str = r#"
    [[sources]]
    id = "ticker"
    refresh_secs = 2
    ttl_secs = 4
    timeout_secs = 1
    adapter = { kind = "fixture", payload = { message = "citydash up" } }
"#;

#[tokio::test]
async fn boot_refresh_and_snapshot_roundtrip() {
    let cfg: Config = toml::from_str(CONFIG).expect("test config parses");

    let ctx = SchedulerCtx {
        cache: Arc::new(PanelCache::new(&cfg.sources)),
        bus: Arc::new(UpdateBus::new(16)),
        trends: Arc::new(PanelTrends::with_capacity(16)),
    };
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let tasks = scheduler::spawn_refresh_tasks(&cfg.sources, &ctx, shutdown_rx);

    let app = create_router(AppState {
        cache: ctx.cache.clone(),
        bus: ctx.bus.clone(),
        trends: ctx.trends.clone(),
        sse_ping: Duration::from_secs(30),
    });

    // Startup jitter is bounded by a quarter interval; the first fetch lands
    // well within two seconds.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let entries = loop {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/snapshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("oneshot /api/snapshot");
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let v: Json = serde_json::from_slice(&bytes).unwrap();
        let entries = v.as_array().expect("array").clone();
        if entries[0]["status"] == "fresh" {
            break entries;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "first refresh never landed"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["source_id"], "ticker");
    assert_eq!(entries[0]["payload"], json!({"message": "citydash up"}));
    assert!(entries[0]["fetched_at"].as_u64().unwrap() > 0);

    let _ = shutdown_tx.send(true);
    for t in tasks {
        let _ = t.await;
    }
}
