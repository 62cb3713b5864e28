// src/scheduler.rs
//! # Scheduler
//! Single cooperative control loop. Each tick: fan-out fetch across sources
//! (concurrent, individually timed out, failure-isolated), ingest and
//! re-rank, top up the post queue, then run the gated publish step. Only
//! this loop mutates the queue and the posting-window counters; the
//! dashboard reads snapshots through short-lived read locks.
//!
//! Durable state is persisted after every queue/window mutation. Failure of
//! the store is fatal; every other failure is isolated to its source or
//! entry.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::dedup::Deduplicator;
use crate::fingerprint::Normalizer;
use crate::generate::ContentGenerator;
use crate::model::CanonicalItem;
use crate::policy::{self, PostGate, PostingWindowState};
use crate::publish::{PublishError, Publisher};
use crate::queue::{EntryKey, EntryState, PostQueue};
use crate::score;
use crate::sources::{self, TrendSource};
use crate::store::{FileStore, PersistedState};

/// State shared between the scheduler (sole writer) and the read-only
/// dashboard. Locks are held only for non-async critical sections.
pub struct Engine {
    pub queue: RwLock<PostQueue>,
    pub window: RwLock<PostingWindowState>,
    /// Latest ranked canonical items, for the dashboard.
    pub trends: RwLock<Vec<CanonicalItem>>,
}

impl Engine {
    /// Rebuild shared state from a persisted snapshot, resetting in-flight
    /// entries left over from a prior run.
    pub fn restore(cfg: &AppConfig, persisted: PersistedState) -> Self {
        let mut queue = PostQueue::from_entries(cfg.queue.clone(), persisted.entries);
        let reset = queue.recover();
        if reset > 0 {
            tracing::info!(target: "scheduler", reset, "recovered in-flight entries to pending");
        }
        Self {
            queue: RwLock::new(queue),
            window: RwLock::new(persisted.window),
            trends: RwLock::new(Vec::new()),
        }
    }
}

/// What a publish step did; drives the wait between attempts.
#[derive(Debug, PartialEq)]
pub enum StepOutcome {
    Published,
    /// Nothing selectable right now.
    Idle,
    /// The attempt failed; the entry was re-queued or skipped.
    Failed,
    /// Policy said no.
    Denied { next_eligible: DateTime<Utc> },
}

pub struct Scheduler {
    cfg: AppConfig,
    dedup: Deduplicator,
    engine: Arc<Engine>,
    sources: Vec<Arc<dyn TrendSource>>,
    generator: Arc<dyn ContentGenerator>,
    publisher: Arc<dyn Publisher>,
    store: FileStore,
    /// Platform-imposed backoff (publisher 429), distinct from the policy.
    platform_backoff_until: Option<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(
        cfg: AppConfig,
        engine: Arc<Engine>,
        sources: Vec<Arc<dyn TrendSource>>,
        generator: Arc<dyn ContentGenerator>,
        publisher: Arc<dyn Publisher>,
        store: FileStore,
    ) -> Self {
        let dedup = Deduplicator::new(
            Normalizer::new(cfg.fingerprint.clone()),
            cfg.score.clone(),
        );
        Self {
            cfg,
            dedup,
            engine,
            sources,
            generator,
            publisher,
            store,
            platform_backoff_until: None,
        }
    }

    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    /// Run until the shutdown signal flips. An in-flight publish step always
    /// completes (or fails into a terminal/pending state) before exit.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let tick = Duration::from_secs(self.cfg.scheduler.tick_secs);
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let outcome = self.run_cycle().await?;

            // Denied with an eligibility inside this tick: wait and retry the
            // publish step (not the fetch) once, unless shutdown wins.
            if let StepOutcome::Denied { next_eligible } = outcome {
                let now = Utc::now();
                let until_eligible = (next_eligible - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if until_eligible < tick {
                    tokio::select! {
                        _ = tokio::time::sleep(until_eligible) => {
                            self.publish_step().await?;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        self.persist().await?;
        tracing::info!(target: "scheduler", "scheduler stopped");
        Ok(())
    }

    /// One full cycle: aggregate, then one publish attempt.
    pub async fn run_cycle(&mut self) -> Result<StepOutcome> {
        self.aggregate_once().await?;
        let outcome = self.publish_step().await?;
        gauge!("scheduler_last_tick_ts").set(Utc::now().timestamp() as f64);
        Ok(outcome)
    }

    /// Fan-out fetch, ingest into the deduplicator, re-rank, enqueue the top
    /// candidates. Source failures cost that source's items only.
    pub async fn aggregate_once(&mut self) -> Result<()> {
        let fetch_timeout = Duration::from_secs(self.cfg.scheduler.fetch_timeout_secs);
        let raw_items =
            sources::fetch_all(&self.sources, self.cfg.scheduler.fetch_limit, fetch_timeout).await;

        let now = Utc::now();
        let mut ingested = 0u64;
        for raw in raw_items {
            match self.dedup.ingest(raw, now) {
                Ok(_) => ingested += 1,
                Err(e) => {
                    tracing::warn!(target: "dedup", error = %e, "dropping invalid item");
                    counter!("trend_invalid_total").increment(1);
                }
            }
        }
        counter!("trend_ingested_total").increment(ingested);

        self.dedup.evict_stale(now, self.cfg.scheduler.item_max_age_secs);
        self.dedup.rescore(now);

        let ranked: Vec<CanonicalItem> = score::rank(self.dedup.items())
            .into_iter()
            .cloned()
            .collect();

        {
            let mut queue = self.engine.queue.write().expect("queue lock");
            for item in ranked.iter().take(self.cfg.scheduler.enqueue_top) {
                queue.enqueue(item, now);
            }
            queue.compact(now, self.cfg.scheduler.item_max_age_secs);
            let depth = queue
                .entries()
                .filter(|e| !e.state.is_terminal())
                .count();
            gauge!("queue_depth").set(depth as f64);
        }
        *self.engine.trends.write().expect("trends lock") = ranked;

        self.persist().await?;
        Ok(())
    }

    /// One gated publish attempt: policy check, candidate selection, then
    /// the Selected -> Generating -> Ready -> Posted walk. Generation and
    /// publish are bounded by their own timeouts; a timeout is a retryable
    /// failure like any other.
    pub async fn publish_step(&mut self) -> Result<StepOutcome> {
        let now = Utc::now();

        if let Some(until) = self.platform_backoff_until {
            if now < until {
                tracing::debug!(target: "scheduler", until = %until, "platform backoff active");
                return Ok(StepOutcome::Idle);
            }
            self.platform_backoff_until = None;
        }

        let gate = {
            let window = self.engine.window.read().expect("window lock");
            policy::may_post(now, &window, &self.cfg.policy)
        };
        if let PostGate::Denied { reason, next_eligible } = gate {
            tracing::info!(
                target: "scheduler",
                reason = ?reason,
                next_eligible = %next_eligible,
                "publishing denied by policy"
            );
            return Ok(StepOutcome::Denied { next_eligible });
        }

        let Some(key) = self.select_candidate(now)? else {
            return Ok(StepOutcome::Idle);
        };

        // Generate.
        let item = self.candidate_item(&key);
        {
            let mut queue = self.engine.queue.write().expect("queue lock");
            queue.mark_generating(&key)?;
        }
        let generate_timeout = Duration::from_secs(self.cfg.scheduler.generate_timeout_secs);
        let generated =
            tokio::time::timeout(generate_timeout, self.generator.generate(&item)).await;
        let content = match generated {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => return self.fail_entry(&key, &format!("generation failed: {e}")).await,
            Err(_) => return self.fail_entry(&key, "generation timed out").await,
        };
        {
            let mut queue = self.engine.queue.write().expect("queue lock");
            queue.mark_ready(&key, content.clone())?;
        }
        self.persist().await?;

        // Publish.
        let publish_timeout = Duration::from_secs(self.cfg.scheduler.publish_timeout_secs);
        let published = tokio::time::timeout(publish_timeout, self.publisher.publish(&content)).await;
        match published {
            Ok(Ok(post_id)) => {
                let now = Utc::now();
                {
                    let mut queue = self.engine.queue.write().expect("queue lock");
                    queue.mark_posted(&key, post_id.clone(), now)?;
                    let mut window = self.engine.window.write().expect("window lock");
                    window.record_post(now, self.cfg.policy.window_secs);
                }
                counter!("posts_published_total").increment(1);
                tracing::info!(
                    target: "scheduler",
                    key = key.as_str(),
                    post_id = %post_id,
                    "published"
                );
                self.persist().await?;
                Ok(StepOutcome::Published)
            }
            Ok(Err(PublishError::RateLimited { retry_after_secs })) => {
                self.platform_backoff_until =
                    Some(Utc::now() + chrono::Duration::seconds(retry_after_secs as i64));
                self.fail_entry(&key, &format!("platform rate limited ({retry_after_secs}s)"))
                    .await
            }
            Ok(Err(e)) => self.fail_entry(&key, &format!("publish failed: {e}")).await,
            Err(_) => self.fail_entry(&key, "publish timed out").await,
        }
    }

    /// Peek the best candidate and claim it. Selection is the only path out
    /// of `Pending`, and this loop is the only caller.
    fn select_candidate(&self, now: DateTime<Utc>) -> Result<Option<EntryKey>> {
        let mut queue = self.engine.queue.write().expect("queue lock");
        let Some(key) = queue.next_candidate(now).map(|e| e.key.clone()) else {
            return Ok(None);
        };
        queue.mark_selected(&key)?;
        Ok(Some(key))
    }

    /// Snapshot enough of the entry to generate content without holding the
    /// queue lock across awaits.
    fn candidate_item(&self, key: &EntryKey) -> CanonicalItem {
        let queue = self.engine.queue.read().expect("queue lock");
        let e = queue.get(key).expect("selected entry exists");
        CanonicalItem {
            fingerprint: e.fingerprint.clone(),
            title: e.title.clone(),
            url: e.url.clone(),
            provenance: Vec::new(),
            first_seen: e.enqueued_at,
            last_seen: e.enqueued_at,
            score: e.score,
            region: crate::model::Region::Global,
            content_hash: e.content_hash.clone(),
        }
    }

    async fn fail_entry(&mut self, key: &EntryKey, error: &str) -> Result<StepOutcome> {
        let landed = {
            let mut queue = self.engine.queue.write().expect("queue lock");
            queue.mark_failed(key, error, Utc::now())?
        };
        counter!("posts_failed_total").increment(1);
        if landed == EntryState::Skipped {
            counter!("posts_skipped_total").increment(1);
        }
        tracing::warn!(
            target: "scheduler",
            key = key.as_str(),
            landed = %landed,
            error,
            "publish attempt failed"
        );
        self.persist().await?;
        Ok(StepOutcome::Failed)
    }

    /// Persist queue + window. A store failure aborts the control loop.
    async fn persist(&self) -> Result<()> {
        let state = {
            let queue = self.engine.queue.read().expect("queue lock");
            let window = self.engine.window.read().expect("window lock");
            PersistedState {
                entries: queue.snapshot(),
                window: window.clone(),
            }
        };
        self.store
            .save(&state)
            .await
            .context("persisting scheduler state")
    }
}
