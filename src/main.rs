//! trendcast — Binary entrypoint.
//! Boots the scheduler control loop and the read-only dashboard, wires the
//! store, sources and collaborators, and handles graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trendcast::api::{self, AppState};
use trendcast::config::AppConfig;
use trendcast::generate::{ContentGenerator, OpenAiGenerator, TemplateGenerator};
use trendcast::metrics::Metrics;
use trendcast::publish::{MemoryPublisher, Publisher, WebhookPublisher};
use trendcast::scheduler::{Engine, Scheduler};
use trendcast::sources::{
    google_trends::GoogleTrendsSource, reddit::RedditSource, rss::RssSource, TrendSource,
};
use trendcast::store::FileStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trendcast=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// OpenAI when a key is configured, deterministic templates otherwise.
fn build_generator() -> Arc<dyn ContentGenerator> {
    let openai = OpenAiGenerator::new(None);
    if openai.is_configured() {
        tracing::info!("content generator: openai");
        Arc::new(openai)
    } else {
        tracing::info!("content generator: template (OPENAI_API_KEY not set)");
        Arc::new(TemplateGenerator)
    }
}

/// Webhook publisher when configured, otherwise a dry-run recorder.
fn build_publisher() -> Arc<dyn Publisher> {
    match std::env::var("TRENDCAST_WEBHOOK_URL") {
        Ok(url) if !url.is_empty() => {
            tracing::info!("publisher: webhook");
            Arc::new(WebhookPublisher::new(url))
        }
        _ => {
            tracing::warn!("publisher: dry-run memory (TRENDCAST_WEBHOOK_URL not set)");
            Arc::new(MemoryPublisher::new())
        }
    }
}

fn build_sources() -> Vec<Arc<dyn TrendSource>> {
    let mut sources: Vec<Arc<dyn TrendSource>> = Vec::new();
    if let Ok(subs) = std::env::var("TRENDCAST_SUBREDDITS") {
        for sub in subs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            sources.push(Arc::new(RedditSource::new(sub.to_string())));
        }
    }
    if let Ok(feeds) = std::env::var("TRENDCAST_RSS_FEEDS") {
        for feed in feeds.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            sources.push(Arc::new(RssSource::from_url(feed.to_string())));
        }
    }
    if let Ok(geos) = std::env::var("TRENDCAST_TRENDS_GEO") {
        for geo in geos.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            sources.push(Arc::new(GoogleTrendsSource::new(geo.to_string())));
        }
    }
    sources
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init();

    let store = FileStore::new(&cfg.state_path);
    let persisted = store.load().await.context("loading persisted state")?;
    let engine = Arc::new(Engine::restore(&cfg, persisted));

    let sources = build_sources();
    if sources.is_empty() {
        tracing::warn!(
            "no sources configured (TRENDCAST_SUBREDDITS / TRENDCAST_RSS_FEEDS / TRENDCAST_TRENDS_GEO)"
        );
    }

    let bind_addr = cfg.bind_addr.clone();
    let scheduler = Scheduler::new(
        cfg,
        Arc::clone(&engine),
        sources,
        build_generator(),
        build_publisher(),
        store,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let router = api::create_router(AppState { engine }).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding dashboard to {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "dashboard listening");

    let server = axum::serve(listener, router);
    tokio::select! {
        res = server => res.context("dashboard server")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    // Let an in-flight publish finish, then wait for the loop to persist.
    let _ = shutdown_tx.send(true);
    scheduler_task
        .await
        .context("joining scheduler task")?
        .context("scheduler loop")?;
    Ok(())
}
