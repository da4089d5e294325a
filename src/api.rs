use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::bus::UpdateBus;
use crate::cache::PanelCache;
use crate::now_unix;
use crate::session::{Session, SnapshotEntry};
use crate::trend::{PanelTrends, TrendSample};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PanelCache>,
    pub bus: Arc<UpdateBus>,
    pub trends: Arc<PanelTrends>,
    pub sse_ping: Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/snapshot", get(snapshot))
        .route("/api/panel/{source_id}", get(panel))
        .route("/api/trend/{source_id}", get(trend))
        .route("/sse/updates", get(sse_updates))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Pull view: current entry for every configured source.
async fn snapshot(State(state): State<AppState>) -> Json<Vec<SnapshotEntry>> {
    let now = now_unix();
    let entries = state
        .cache
        .entries()
        .iter()
        .map(|(id, entry)| SnapshotEntry {
            source_id: id.clone(),
            payload: entry.payload.clone(),
            status: entry.display_status(now),
            fetched_at: entry.fetched_at,
        })
        .collect();
    Json(entries)
}

async fn panel(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<SnapshotEntry>, StatusCode> {
    let entry = state.cache.get(&source_id).ok_or(StatusCode::NOT_FOUND)?;
    let now = now_unix();
    Ok(Json(SnapshotEntry {
        status: entry.display_status(now),
        payload: entry.payload,
        fetched_at: entry.fetched_at,
        source_id,
    }))
}

async fn trend(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Vec<TrendSample>>, StatusCode> {
    if state.cache.get(&source_id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(state.trends.snapshot(&source_id)))
}

#[derive(Debug, Deserialize)]
struct SseParams {
    /// Comma-separated source ids; absent = all sources.
    sources: Option<String>,
}

/// Push stream: one `snapshot` event at connect (and per resync), then one
/// `update` event per change.
async fn sse_updates(
    State(state): State<AppState>,
    Query(params): Query<SseParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let interest: Option<HashSet<String>> = params.sources.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    });

    let session = Session::connect(state.cache.clone(), &state.bus, interest);

    let stream = futures_util::stream::unfold(session, |mut session| async move {
        let msg = session.next_message().await?;
        Some((msg, session))
    })
    .map(|msg| {
        let event = Event::default().event(msg.event_name());
        Ok(match event.json_data(&msg) {
            Ok(ev) => ev,
            // Serialization of our own types cannot realistically fail; keep
            // the stream alive with a comment frame if it ever does.
            Err(e) => {
                tracing::error!(error = %e, "sse serialization failed");
                Event::default().comment("serialization error")
            }
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.sse_ping).text("ping"))
}
