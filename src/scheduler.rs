//! # Refresh Scheduler
//! One independent task per source. Each task fetches immediately at startup
//! (after a small jitter so sources don't stampede their upstreams at boot),
//! then re-fetches on its own cadence with exponential backoff while the
//! source is failing.
//!
//! Fetches for one source are strictly sequential because the loop awaits the
//! fetch before sleeping; across sources there is no shared lock and no
//! ordering. A hanging adapter is cut off by its per-fetch timeout and can
//! never delay another source's refresh.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::{self, Adapter, FetchError};
use crate::bus::{UpdateBus, UpdateEvent};
use crate::cache::PanelCache;
use crate::config::SourceCfg;
use crate::trend::PanelTrends;

/// Backoff never exceeds 8× the base refresh interval.
pub const BACKOFF_CAP_FACTOR: u32 = 8;

const MAX_STARTUP_JITTER: Duration = Duration::from_secs(5);

/// Shared collaborators handed to every refresh task.
#[derive(Clone)]
pub struct SchedulerCtx {
    pub cache: Arc<PanelCache>,
    pub bus: Arc<UpdateBus>,
    pub trends: Arc<PanelTrends>,
}

/// Delay until the next attempt given how many times the source has failed
/// in a row: base, 2×, 4×, 8×, then constant at the cap.
pub fn backoff_delay(base: Duration, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return base;
    }
    let factor = 2u32
        .saturating_pow(consecutive_failures)
        .min(BACKOFF_CAP_FACTOR);
    base.saturating_mul(factor)
}

fn startup_jitter(interval: Duration) -> Duration {
    let max = (interval / 4).min(MAX_STARTUP_JITTER);
    if max.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max.as_millis() as u64))
}

/// Spawn one refresh task per configured source, building each source's
/// adapter from its config. Tasks stop when `shutdown` flips to true.
pub fn spawn_refresh_tasks(
    sources: &[SourceCfg],
    ctx: &SchedulerCtx,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    sources
        .iter()
        .map(|s| {
            let adapter = adapters::build(&s.adapter, &s.id);
            spawn_source(s.clone(), adapter, ctx.clone(), shutdown.clone())
        })
        .collect()
}

/// Spawn a refresh task with an explicit adapter (tests inject scripted
/// fixtures this way).
pub fn spawn_source(
    src: SourceCfg,
    adapter: Arc<dyn Adapter>,
    ctx: SchedulerCtx,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(refresh_loop(src, adapter, ctx, shutdown))
}

async fn refresh_loop(
    src: SourceCfg,
    adapter: Arc<dyn Adapter>,
    ctx: SchedulerCtx,
    mut shutdown: watch::Receiver<bool>,
) {
    let jitter = startup_jitter(src.refresh());
    tokio::select! {
        _ = tokio::time::sleep(jitter) => {}
        _ = shutdown.changed() => return,
    }

    loop {
        // Sequential await keeps at most one fetch in flight per source.
        refresh_once(&src, adapter.as_ref(), &ctx).await;

        let failures = ctx.cache.consecutive_failures(&src.id);
        let delay = backoff_delay(src.refresh(), failures);
        if failures > 0 {
            tracing::debug!(source = %src.id, failures, delay_secs = delay.as_secs(), "backing off");
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!(source = %src.id, "refresh task stopped");
}

/// One fetch attempt: run the adapter under the per-source timeout, write the
/// outcome to the cache, and publish on the bus when the cache reports a
/// state change.
pub async fn refresh_once(src: &SourceCfg, adapter: &dyn Adapter, ctx: &SchedulerCtx) {
    counter!("refresh_runs_total", "source" => src.id.clone()).increment(1);
    let started = tokio::time::Instant::now();

    let outcome = tokio::time::timeout(src.timeout(), adapter.fetch()).await;
    histogram!("refresh_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

    let result = match outcome {
        Ok(r) => r,
        Err(_) => Err(FetchError::timeout(format!(
            "no response within {}s",
            src.timeout_secs
        ))),
    };

    match result {
        Ok(payload) => {
            if let Some(ptr) = &src.trend_pointer {
                if let Some(v) = payload.pointer(ptr).and_then(|v| v.as_f64()) {
                    ctx.trends.record(&src.id, v, None);
                }
            }
            if let Some(reason) = ctx.cache.put_ok(&src.id, payload) {
                ctx.bus.publish(UpdateEvent::now(&src.id, reason));
            }
            gauge!("source_consecutive_failures", "source" => src.id.clone()).set(0.0);
        }
        Err(err) => {
            counter!("refresh_errors_total", "source" => src.id.clone()).increment(1);
            tracing::warn!(source = %src.id, kind = ?err.kind, error = %err.message, "refresh failed");
            if let Some(reason) = ctx.cache.put_err(&src.id, err) {
                ctx.bus.publish(UpdateEvent::now(&src.id, reason));
            }
            let failures = ctx.cache.consecutive_failures(&src.id);
            gauge!("source_consecutive_failures", "source" => src.id.clone()).set(failures as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_strictly_increasing_up_to_cap_then_constant() {
        let base = Duration::from_secs(30);
        let delays: Vec<_> = (0..6).map(|f| backoff_delay(base, f)).collect();
        assert_eq!(delays[0], base);
        // Strictly increasing while below the cap...
        assert!(delays[1] > delays[0]);
        assert!(delays[2] > delays[1]);
        assert!(delays[3] > delays[2]);
        assert_eq!(delays[3], base * BACKOFF_CAP_FACTOR);
        // ...then constant.
        assert_eq!(delays[4], delays[3]);
        assert_eq!(delays[5], delays[3]);
    }

    #[test]
    fn backoff_does_not_overflow_on_huge_failure_counts() {
        let base = Duration::from_secs(3600);
        assert_eq!(backoff_delay(base, u32::MAX), base * BACKOFF_CAP_FACTOR);
    }

    #[test]
    fn startup_jitter_stays_within_a_quarter_interval() {
        let interval = Duration::from_secs(60);
        for _ in 0..100 {
            let j = startup_jitter(interval);
            assert!(j <= Duration::from_secs(5));
        }
        assert_eq!(startup_jitter(Duration::ZERO), Duration::ZERO);
    }
}
