use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_runs_total", "Refresh attempts per source.");
        describe_counter!("refresh_errors_total", "Failed refresh attempts per source.");
        describe_counter!("bus_events_total", "Update events published on the bus.");
        describe_counter!(
            "sse_lagged_total",
            "Sessions forced into a snapshot resync after lagging."
        );
        describe_gauge!("sse_clients", "Currently connected push clients.");
        describe_gauge!(
            "source_consecutive_failures",
            "Consecutive failed refreshes per source."
        );
        describe_histogram!("refresh_duration_ms", "Adapter fetch time in milliseconds.");
    });
}

impl Metrics {
    /// Initialize the Prometheus recorder and register our series.
    pub fn init() -> Self {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_metrics_described();

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
