// src/model.rs
//! Core item shapes shared by the whole pipeline: raw items as reported by
//! source connectors, and canonical items produced by the deduplicator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Known trend sources. Connectors report one of these on every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Reddit,
    GoogleTrends,
    YoutubeTrending,
    Rss,
    TwitterTrends,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Reddit => "reddit",
            SourceId::GoogleTrends => "google_trends",
            SourceId::YoutubeTrending => "youtube_trending",
            SourceId::Rss => "rss",
            SourceId::TwitterTrends => "twitter_trends",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trend is relevant: everywhere, or one country (ISO-ish tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    #[default]
    Global,
    Country(String),
}

/// One trending item exactly as a source reported it. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub source: SourceId,
    pub external_id: String,
    pub title: String,
    pub url: String,
    /// When the source observed/reported the item.
    pub observed_at: DateTime<Utc>,
    /// Source-specific magnitude: upvotes, view count, search volume.
    pub signal: u64,
    #[serde(default)]
    pub region: Region,
}

/// One trend after deduplication. Identity is the fingerprint; provenance
/// carries every raw item that contributed to it.
///
/// Merges are monotonic: `last_seen` and `score` only move forward, the
/// provenance set only grows. Only `Deduplicator::ingest` mutates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub fingerprint: Fingerprint,
    /// Title/url of the first raw item that created this canonical.
    pub title: String,
    pub url: String,
    pub provenance: Vec<RawItem>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Aggregate ranking score, recomputed over the full provenance set on
    /// every merge.
    pub score: f64,
    pub region: Region,
    /// Hash of the normalized title only, used to block reposting the same
    /// content under a different url.
    pub content_hash: String,
}

impl CanonicalItem {
    /// Number of distinct sources that corroborate this trend.
    pub fn distinct_sources(&self) -> usize {
        let mut seen: Vec<SourceId> = Vec::with_capacity(self.provenance.len());
        for raw in &self.provenance {
            if !seen.contains(&raw.source) {
                seen.push(raw.source);
            }
        }
        seen.len()
    }
}
