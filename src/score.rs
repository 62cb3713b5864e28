// src/score.rs
//! # Scorer / Ranker
//! Pure, testable logic that maps a canonical item to a ranking score and a
//! set of canonical items to a deterministic total order. No I/O.
//!
//! Score = (signal + authority + diversity bonus) * recency decay.
//! Determinism matters: ranks are recomputed after restarts and must come
//! out identical for identical inputs, so ties break by first-seen then by
//! fingerprint lexical order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CanonicalItem, SourceId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Weight of the normalized source signal component.
    pub signal_weight: f64,
    /// Weight of the source-authority component.
    pub authority_weight: f64,
    /// Bonus per extra distinct corroborating source.
    pub diversity_bonus: f64,
    /// Cap on the total diversity bonus.
    pub diversity_cap: f64,
    /// Exponential decay time constant, seconds. Score halves roughly every
    /// `0.69 * tau`.
    pub decay_tau_secs: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            signal_weight: 0.5,
            authority_weight: 0.2,
            diversity_bonus: 0.15,
            diversity_cap: 0.3,
            decay_tau_secs: 6.0 * 3600.0,
        }
    }
}

/// Typical "full strength" magnitude per source; signals are log-normalized
/// against these so a 5k-upvote Reddit post and a spiking search term land in
/// the same [0,1] range.
fn signal_scale(source: SourceId) -> f64 {
    match source {
        SourceId::Reddit => 5_000.0,
        SourceId::GoogleTrends => 200_000.0,
        SourceId::YoutubeTrending => 1_000_000.0,
        SourceId::Rss => 50.0,
        SourceId::TwitterTrends => 10_000.0,
    }
}

/// How much we trust each source's notion of "trending".
fn authority(source: SourceId) -> f64 {
    match source {
        SourceId::GoogleTrends => 0.9,
        SourceId::Reddit => 0.8,
        SourceId::TwitterTrends => 0.7,
        SourceId::YoutubeTrending => 0.6,
        SourceId::Rss => 0.5,
    }
}

/// Monotonic log transform of a raw signal into [0,1].
fn normalized_signal(source: SourceId, signal: u64) -> f64 {
    let scale = signal_scale(source);
    let x = (signal as f64 / scale).min(1.0);
    // log(1 + 9x) / log(10): 0 -> 0, scale -> 1, concave in between.
    (1.0 + 9.0 * x).log10()
}

/// Compute the aggregate score of a canonical item over its full provenance
/// set. Called on every merge; never incrementally approximated.
pub fn compute(item: &CanonicalItem, now: DateTime<Utc>, cfg: &ScoreConfig) -> f64 {
    if item.provenance.is_empty() {
        return 0.0;
    }

    // Strongest normalized signal across contributors.
    let mut best_signal = 0.0f64;
    let mut best_authority = 0.0f64;
    for raw in &item.provenance {
        best_signal = best_signal.max(normalized_signal(raw.source, raw.signal));
        best_authority = best_authority.max(authority(raw.source));
    }

    let diversity = ((item.distinct_sources().saturating_sub(1)) as f64 * cfg.diversity_bonus)
        .min(cfg.diversity_cap);

    let base =
        cfg.signal_weight * best_signal + cfg.authority_weight * best_authority + diversity;

    let age_secs = (now - item.first_seen).num_seconds().max(0) as f64;
    let decay = (-age_secs / cfg.decay_tau_secs).exp();

    base * decay
}

/// Order items by score descending; ties by earlier `first_seen` (older trend
/// wins), then by fingerprint lexical order. Total and deterministic.
pub fn rank<'a>(items: impl IntoIterator<Item = &'a CanonicalItem>) -> Vec<&'a CanonicalItem> {
    let mut out: Vec<&CanonicalItem> = items.into_iter().collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    out
}
