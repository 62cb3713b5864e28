// src/api.rs
//! Read-only dashboard API. Every endpoint serves a snapshot taken under a
//! short read lock; there is no mutation path from here into the queue or
//! the posting-window counters.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::policy::PostingWindowState;
use crate::queue::EntryState;
use crate::scheduler::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/queue", get(queue_snapshot))
        .route("/api/trends", get(trends_snapshot))
        .route("/api/window", get(window_snapshot))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Serialize)]
struct QueueEntryView {
    key: String,
    title: String,
    url: String,
    score: f64,
    state: EntryState,
    retry_count: u32,
    last_error: Option<String>,
    external_post_id: Option<String>,
}

async fn queue_snapshot(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Vec<QueueEntryView>> {
    let queue = state.engine.queue.read().expect("queue lock");
    let views = queue
        .entries()
        .take(q.limit)
        .map(|e| QueueEntryView {
            key: e.key.as_str().to_string(),
            title: e.title.clone(),
            url: e.url.clone(),
            score: e.score,
            state: e.state,
            retry_count: e.retry_count,
            last_error: e.last_error.clone(),
            external_post_id: e.external_post_id.clone(),
        })
        .collect();
    Json(views)
}

#[derive(Serialize)]
struct TrendView {
    fingerprint: String,
    title: String,
    url: String,
    score: f64,
    sources: usize,
}

async fn trends_snapshot(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Vec<TrendView>> {
    let trends = state.engine.trends.read().expect("trends lock");
    let views = trends
        .iter()
        .take(q.limit)
        .map(|t| TrendView {
            fingerprint: t.fingerprint.to_string(),
            title: t.title.clone(),
            url: t.url.clone(),
            score: t.score,
            sources: t.distinct_sources(),
        })
        .collect();
    Json(views)
}

async fn window_snapshot(State(state): State<AppState>) -> Json<PostingWindowState> {
    let window = state.engine.window.read().expect("window lock");
    Json(window.clone())
}
