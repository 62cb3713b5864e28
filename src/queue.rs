// src/queue.rs
//! # Post queue
//! Durable ordered store of canonical items awaiting content generation and
//! publishing. Owns every lifecycle transition; callers go through the
//! `mark_*` methods, which validate against the state machine:
//!
//! ```text
//! Pending -> Selected -> Generating -> Ready -> Posted
//! {Selected, Generating, Ready} -> Failed -> Pending (retries remain)
//!                                         -> Skipped (ceiling exceeded)
//! ```
//!
//! Terminal states are `Posted` and `Skipped`. Entries are keyed by
//! fingerprint + UTC calendar day, which doubles as the idempotency key that
//! blocks reposting a trend inside the cool-down window even across
//! restarts.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::generate::PostContent;
use crate::model::CanonicalItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Selected,
    Generating,
    Ready,
    Posted,
    Failed,
    Skipped,
}

impl EntryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Posted | EntryState::Skipped)
    }

    /// States an entry can be left in when the process dies mid-flight.
    fn is_in_flight(&self) -> bool {
        matches!(
            self,
            EntryState::Selected | EntryState::Generating | EntryState::Ready
        )
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryState::Pending => "pending",
            EntryState::Selected => "selected",
            EntryState::Generating => "generating",
            EntryState::Ready => "ready",
            EntryState::Posted => "posted",
            EntryState::Failed => "failed",
            EntryState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// `fingerprint + calendar day`, the repost-prevention key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(String);

impl EntryKey {
    pub fn new(fp: &Fingerprint, day: chrono::NaiveDate) -> Self {
        Self(format!("{}:{}", fp, day))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub key: EntryKey,
    pub fingerprint: Fingerprint,
    pub content_hash: String,
    pub title: String,
    pub url: String,
    pub score: f64,
    pub state: EntryState,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Earliest instant the entry may be selected (retry backoff).
    pub not_before: Option<DateTime<Utc>>,
    pub content: Option<PostContent>,
    pub external_post_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// A contract violation, never expected in normal operation.
    #[error("illegal transition {from} -> {to} for entry {key}")]
    IllegalTransition {
        key: String,
        from: EntryState,
        to: EntryState,
    },
    #[error("no entry with key {0}")]
    UnknownEntry(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// `mark_failed` beyond this count parks the entry in `Skipped`.
    pub retry_ceiling: u32,
    /// Seconds a posted fingerprint/content-hash stays ineligible.
    pub cooldown_secs: i64,
    /// Base retry backoff, seconds; doubled per attempt.
    pub retry_backoff_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            cooldown_secs: 24 * 3600,
            retry_backoff_secs: 300,
        }
    }
}

#[derive(Debug)]
pub struct PostQueue {
    cfg: QueueConfig,
    entries: BTreeMap<EntryKey, QueueEntry>,
}

impl PostQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self {
            cfg,
            entries: BTreeMap::new(),
        }
    }

    /// Rebuild from a persisted snapshot.
    pub fn from_entries(cfg: QueueConfig, entries: Vec<QueueEntry>) -> Self {
        Self {
            cfg,
            entries: entries.into_iter().map(|e| (e.key.clone(), e)).collect(),
        }
    }

    pub fn cfg(&self) -> &QueueConfig {
        &self.cfg
    }

    /// Idempotent enqueue: no-op when the trend is cool-down-blocked or
    /// already queued today. Returns the key when a new entry was created.
    pub fn enqueue(&mut self, item: &CanonicalItem, now: DateTime<Utc>) -> Option<EntryKey> {
        if self.is_blocked(&item.fingerprint, &item.content_hash, now) {
            return None;
        }
        let key = EntryKey::new(&item.fingerprint, now.date_naive());
        if self.entries.contains_key(&key) {
            return None;
        }
        // A still-hot trend re-enqueued on a new day replaces its older
        // pending entry (stale score) instead of stacking a second one.
        self.entries.retain(|k, e| {
            !(e.fingerprint == item.fingerprint && e.state == EntryState::Pending && *k != key)
        });
        let entry = QueueEntry {
            key: key.clone(),
            fingerprint: item.fingerprint.clone(),
            content_hash: item.content_hash.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            score: item.score,
            state: EntryState::Pending,
            retry_count: 0,
            last_error: None,
            not_before: None,
            content: None,
            external_post_id: None,
            enqueued_at: now,
            posted_at: None,
        };
        self.entries.insert(key.clone(), entry);
        Some(key)
    }

    /// A fingerprint (or the same content under another url) posted within
    /// the cool-down window must never become selectable again.
    pub fn is_blocked(&self, fp: &Fingerprint, content_hash: &str, now: DateTime<Utc>) -> bool {
        let cooldown = Duration::seconds(self.cfg.cooldown_secs);
        self.entries.values().any(|e| {
            e.state == EntryState::Posted
                && (e.fingerprint == *fp || (!content_hash.is_empty() && e.content_hash == content_hash))
                && e.posted_at.map(|t| now - t < cooldown).unwrap_or(true)
        })
    }

    /// Highest-ranked selectable entry: `Pending`, past its `not_before`,
    /// not cool-down-blocked. Pure peek; mutates nothing.
    pub fn next_candidate(&self, now: DateTime<Utc>) -> Option<&QueueEntry> {
        self.entries
            .values()
            .filter(|e| e.state == EntryState::Pending)
            .filter(|e| e.not_before.map(|t| t <= now).unwrap_or(true))
            .filter(|e| !self.is_blocked(&e.fingerprint, &e.content_hash, now))
            .max_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| b.enqueued_at.cmp(&a.enqueued_at))
                    .then_with(|| b.fingerprint.cmp(&a.fingerprint))
            })
    }

    pub fn mark_selected(&mut self, key: &EntryKey) -> Result<(), QueueError> {
        self.transition(key, EntryState::Selected, &[EntryState::Pending])
    }

    pub fn mark_generating(&mut self, key: &EntryKey) -> Result<(), QueueError> {
        self.transition(key, EntryState::Generating, &[EntryState::Selected])
    }

    pub fn mark_ready(&mut self, key: &EntryKey, content: PostContent) -> Result<(), QueueError> {
        self.transition(key, EntryState::Ready, &[EntryState::Generating])?;
        if let Some(e) = self.entries.get_mut(key) {
            e.content = Some(content);
        }
        Ok(())
    }

    pub fn mark_posted(
        &mut self,
        key: &EntryKey,
        external_post_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.transition(key, EntryState::Posted, &[EntryState::Ready])?;
        if let Some(e) = self.entries.get_mut(key) {
            e.external_post_id = Some(external_post_id);
            e.posted_at = Some(now);
        }
        Ok(())
    }

    /// Record a per-entry failure. The entry passes through `Failed` and
    /// resolves immediately: back to `Pending` with a doubled backoff while
    /// retries remain, `Skipped` (terminal) once the ceiling is exceeded.
    /// Returns the state the entry landed in.
    pub fn mark_failed(
        &mut self,
        key: &EntryKey,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<EntryState, QueueError> {
        self.transition(
            key,
            EntryState::Failed,
            &[EntryState::Selected, EntryState::Generating, EntryState::Ready],
        )?;
        let cfg = self.cfg.clone();
        let e = self
            .entries
            .get_mut(key)
            .ok_or_else(|| QueueError::UnknownEntry(key.as_str().to_string()))?;
        e.retry_count += 1;
        e.last_error = Some(error.to_string());
        if e.retry_count > cfg.retry_ceiling {
            e.state = EntryState::Skipped;
        } else {
            let backoff = cfg.retry_backoff_secs << (e.retry_count - 1).min(8);
            e.not_before = Some(now + Duration::seconds(backoff));
            e.state = EntryState::Pending;
        }
        Ok(e.state)
    }

    /// Crash/restart recovery: in-flight entries go back to `Pending` with
    /// retry counts preserved. A post that actually reached the platform
    /// without being recorded here cannot be detected; the fingerprint+day
    /// key bounds the damage to one repeat per trend per cool-down.
    pub fn recover(&mut self) -> usize {
        let mut reset = 0;
        for e in self.entries.values_mut() {
            if e.state.is_in_flight() {
                tracing::warn!(
                    target: "queue",
                    key = e.key.as_str(),
                    state = %e.state,
                    retry_count = e.retry_count,
                    "resetting in-flight entry to pending after restart"
                );
                e.state = EntryState::Pending;
                reset += 1;
            }
        }
        reset
    }

    /// Drop entries with no further effect on the queue: terminal entries
    /// past the cool-down window (they no longer block anything) and
    /// `Pending` entries not re-enqueued for `stale_after_secs` (their frozen
    /// score no longer reflects the trend).
    pub fn compact(&mut self, now: DateTime<Utc>, stale_after_secs: i64) {
        let cooldown = Duration::seconds(self.cfg.cooldown_secs);
        let stale_after = Duration::seconds(stale_after_secs);
        self.entries.retain(|_, e| {
            if e.state.is_terminal() {
                let anchor = e.posted_at.unwrap_or(e.enqueued_at);
                return now - anchor < cooldown;
            }
            if e.state == EntryState::Pending {
                return now - e.enqueued_at < stale_after;
            }
            true
        });
    }

    pub fn get(&self, key: &EntryKey) -> Option<&QueueEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot for persistence / dashboard.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.values().cloned().collect()
    }

    fn transition(
        &mut self,
        key: &EntryKey,
        to: EntryState,
        allowed_from: &[EntryState],
    ) -> Result<(), QueueError> {
        let e = self
            .entries
            .get_mut(key)
            .ok_or_else(|| QueueError::UnknownEntry(key.as_str().to_string()))?;
        if !allowed_from.contains(&e.state) {
            return Err(QueueError::IllegalTransition {
                key: key.as_str().to_string(),
                from: e.state,
                to,
            });
        }
        e.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;

    fn item(fp: &str, score: f64) -> CanonicalItem {
        CanonicalItem {
            fingerprint: Fingerprint::from_hex(fp),
            title: format!("title {fp}"),
            url: format!("https://ex.com/{fp}"),
            provenance: vec![],
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            score,
            region: Region::Global,
            content_hash: format!("hash-{fp}"),
        }
    }

    fn content() -> PostContent {
        PostContent {
            text_tr: "tr".into(),
            text_en: "en".into(),
            hashtags: vec![],
        }
    }

    #[test]
    fn enqueue_is_idempotent_per_day() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        assert!(q.enqueue(&item("aa", 1.0), now).is_some());
        assert!(q.enqueue(&item("aa", 1.0), now).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn happy_path_reaches_posted() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();
        q.mark_selected(&key).unwrap();
        q.mark_generating(&key).unwrap();
        q.mark_ready(&key, content()).unwrap();
        q.mark_posted(&key, "post-1".into(), now).unwrap();
        let e = q.get(&key).unwrap();
        assert_eq!(e.state, EntryState::Posted);
        assert_eq!(e.external_post_id.as_deref(), Some("post-1"));
    }

    #[test]
    fn illegal_transition_fails_and_leaves_state_unchanged() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();
        let err = q.mark_ready(&key, content()).unwrap_err();
        assert!(matches!(err, QueueError::IllegalTransition { .. }));
        assert_eq!(q.get(&key).unwrap().state, EntryState::Pending);
    }

    #[test]
    fn posted_fingerprint_is_cooldown_blocked() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();
        q.mark_selected(&key).unwrap();
        q.mark_generating(&key).unwrap();
        q.mark_ready(&key, content()).unwrap();
        q.mark_posted(&key, "p".into(), now).unwrap();

        // Next calendar day, still inside the 24h cool-down: enqueue no-ops.
        let tomorrow = now + Duration::hours(23);
        assert!(q.enqueue(&item("aa", 2.0), tomorrow).is_none());
        assert!(q.next_candidate(tomorrow).is_none());

        // Past the cool-down the trend is eligible again.
        let later = now + Duration::hours(25);
        assert!(q.enqueue(&item("aa", 2.0), later).is_some());
    }

    #[test]
    fn same_content_hash_under_other_url_is_blocked() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();
        q.mark_selected(&key).unwrap();
        q.mark_generating(&key).unwrap();
        q.mark_ready(&key, content()).unwrap();
        q.mark_posted(&key, "p".into(), now).unwrap();

        let mut variant = item("bb", 2.0);
        variant.content_hash = "hash-aa".into();
        assert!(q.enqueue(&variant, now + Duration::hours(1)).is_none());
    }

    #[test]
    fn retry_ceiling_parks_entry_in_skipped_forever() {
        let cfg = QueueConfig {
            retry_ceiling: 2,
            ..QueueConfig::default()
        };
        let mut q = PostQueue::new(cfg);
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();

        for attempt in 1..=2u32 {
            q.mark_selected(&key).unwrap();
            let state = q.mark_failed(&key, "generation timed out", now).unwrap();
            assert_eq!(state, EntryState::Pending, "attempt {attempt} retries");
            // Clear backoff so the next selection is legal in this test.
            // (next_candidate honors not_before; transitions do not.)
        }
        q.mark_selected(&key).unwrap();
        let state = q.mark_failed(&key, "still failing", now).unwrap();
        assert_eq!(state, EntryState::Skipped);
        assert_eq!(q.get(&key).unwrap().retry_count, 3);

        // Terminal: any further transition is illegal.
        assert!(q.mark_selected(&key).is_err());
        assert_eq!(q.get(&key).unwrap().state, EntryState::Skipped);
    }

    #[test]
    fn failed_entry_backs_off_before_reselection() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();
        q.mark_selected(&key).unwrap();
        q.mark_failed(&key, "publish 503", now).unwrap();

        assert!(q.next_candidate(now).is_none(), "backoff still running");
        let later = now + Duration::seconds(QueueConfig::default().retry_backoff_secs + 1);
        assert_eq!(q.next_candidate(later).unwrap().key, key);
        assert_eq!(
            q.get(&key).unwrap().last_error.as_deref(),
            Some("publish 503")
        );
    }

    #[test]
    fn next_candidate_prefers_highest_score_and_is_a_peek() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        q.enqueue(&item("aa", 0.4), now).unwrap();
        q.enqueue(&item("bb", 0.9), now).unwrap();
        let c = q.next_candidate(now).unwrap();
        assert_eq!(c.fingerprint.as_str(), "bb");
        assert_eq!(c.state, EntryState::Pending);
        // Peeking twice changes nothing.
        assert_eq!(q.next_candidate(now).unwrap().fingerprint.as_str(), "bb");
    }

    #[test]
    fn new_day_enqueue_supersedes_the_prior_pending_entry() {
        let mut q = PostQueue::new(QueueConfig::default());
        let day1 = Utc::now();
        let day2 = day1 + Duration::days(1);
        q.enqueue(&item("aa", 0.9), day1).unwrap();
        let key2 = q.enqueue(&item("aa", 0.7), day2).unwrap();

        // One entry per unposted trend, carrying the fresh score.
        assert_eq!(q.len(), 1);
        let e = q.get(&key2).unwrap();
        assert_eq!(e.score, 0.7);
        assert_eq!(e.enqueued_at, day2);
    }

    #[test]
    fn compact_drops_stale_pending_but_keeps_fresh_and_in_flight() {
        let mut q = PostQueue::new(QueueConfig::default());
        let t0 = Utc::now();
        q.enqueue(&item("aa", 0.9), t0).unwrap();
        let fresh = t0 + Duration::days(3);
        q.enqueue(&item("bb", 0.5), fresh).unwrap();
        let busy = q.enqueue(&item("cc", 0.4), t0).unwrap();
        q.mark_selected(&busy).unwrap();

        q.compact(fresh, 24 * 3600);

        // The stale pending entry is gone; fresh and in-flight remain.
        assert_eq!(q.len(), 2);
        assert!(q.entries().all(|e| e.fingerprint.as_str() != "aa"));
        assert_eq!(q.get(&busy).unwrap().state, EntryState::Selected);
    }

    #[test]
    fn recover_resets_in_flight_and_preserves_retry_count() {
        let mut q = PostQueue::new(QueueConfig::default());
        let now = Utc::now();
        let key = q.enqueue(&item("aa", 1.0), now).unwrap();
        q.mark_selected(&key).unwrap();
        q.mark_failed(&key, "boom", now).unwrap();
        q.mark_selected(&key).unwrap();
        q.mark_generating(&key).unwrap();

        // Simulate restart from a snapshot taken mid-generation.
        let mut restored = PostQueue::from_entries(QueueConfig::default(), q.snapshot());
        assert_eq!(restored.recover(), 1);
        let e = restored.get(&key).unwrap();
        assert_eq!(e.state, EntryState::Pending);
        assert_eq!(e.retry_count, 1);
    }
}
