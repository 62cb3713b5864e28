// src/sources/mod.rs
//! Source connectors and the concurrent fan-out that feeds aggregation.
//!
//! Each connector implements [`TrendSource`]; the scheduler runs them in
//! parallel with an independent timeout per source. A timed-out or erroring
//! source contributes zero items for that cycle and never blocks or cancels
//! its siblings.

pub mod fixture;
pub mod google_trends;
pub mod reddit;
pub mod rss;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::model::RawItem;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("source parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Fetch up to `limit` trending items. Must not block indefinitely; the
    /// caller imposes its own timeout on top.
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceError>;
    fn name(&self) -> &'static str;
}

/// Fan-out / fan-in across all sources with per-task timeout and partial-
/// result tolerance. Returns whatever the healthy sources produced.
pub async fn fetch_all(
    sources: &[Arc<dyn TrendSource>],
    limit: usize,
    per_source_timeout: Duration,
) -> Vec<RawItem> {
    let mut set = JoinSet::new();
    for source in sources {
        let source = Arc::clone(source);
        set.spawn(async move {
            let name = source.name();
            match tokio::time::timeout(per_source_timeout, source.fetch(limit)).await {
                Ok(Ok(items)) => {
                    tracing::info!(target: "sources", source = name, count = items.len(), "fetched");
                    items
                }
                Ok(Err(e)) => {
                    tracing::warn!(target: "sources", source = name, error = %e, "source error");
                    counter!("source_errors_total", "source" => name).increment(1);
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!(target: "sources", source = name, "source timed out");
                    counter!("source_timeouts_total", "source" => name).increment(1);
                    Vec::new()
                }
            }
        });
    }

    let mut all = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(mut items) => all.append(&mut items),
            Err(e) => {
                // A panicked fetch task is isolated like any other failure.
                tracing::error!(target: "sources", error = %e, "fetch task join error");
            }
        }
    }
    counter!("trend_fetched_total").increment(all.len() as u64);
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Region, SourceId};
    use chrono::Utc;

    struct SlowSource;

    #[async_trait]
    impl TrendSource for SlowSource {
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawItem>, SourceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TrendSource for FailingSource {
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawItem>, SourceError> {
            Err(SourceError::Unavailable("down for maintenance".into()))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct OkSource;

    #[async_trait]
    impl TrendSource for OkSource {
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawItem>, SourceError> {
            Ok(vec![RawItem {
                source: SourceId::Rss,
                external_id: "1".into(),
                title: "hello".into(),
                url: "https://ex.com/1".into(),
                observed_at: Utc::now(),
                signal: 5,
                region: Region::Global,
            }])
        }
        fn name(&self) -> &'static str {
            "ok"
        }
    }

    #[tokio::test]
    async fn failing_and_slow_sources_do_not_block_healthy_ones() {
        let sources: Vec<Arc<dyn TrendSource>> = vec![
            Arc::new(SlowSource),
            Arc::new(FailingSource),
            Arc::new(OkSource),
        ];
        let items = fetch_all(&sources, 10, Duration::from_millis(100)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "hello");
    }
}
