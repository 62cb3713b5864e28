// src/dedup.rs
//! # Deduplicator
//! Collapses raw items from heterogeneous sources into canonical items with
//! merged provenance. Identity is the title+domain fingerprint; a fuzzy
//! title-similarity fallback catches near-duplicates whose normalization
//! still differs (e.g. truncated headlines).
//!
//! Merging is commutative: any arrival order of raw items with equal
//! fingerprints yields the same canonical set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use strsim::normalized_levenshtein;
use thiserror::Error;

use crate::fingerprint::{url_domain, Fingerprint, Normalizer};
use crate::model::{CanonicalItem, RawItem};
use crate::score::{self, ScoreConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidItem {
    #[error("item from {source_name} has an empty title")]
    MissingTitle { source_name: String },
    #[error("item from {source_name} has an empty url")]
    MissingUrl { source_name: String },
}

/// Holds the canonical set for the active aggregation window.
#[derive(Debug)]
pub struct Deduplicator {
    normalizer: Normalizer,
    score_cfg: ScoreConfig,
    items: HashMap<Fingerprint, CanonicalItem>,
}

impl Deduplicator {
    pub fn new(normalizer: Normalizer, score_cfg: ScoreConfig) -> Self {
        Self {
            normalizer,
            score_cfg,
            items: HashMap::new(),
        }
    }

    /// Create-or-merge a raw item into the canonical set.
    ///
    /// Returns the fingerprint of the canonical item the raw item landed in.
    /// Malformed items are rejected before touching the set.
    pub fn ingest(&mut self, raw: RawItem, now: DateTime<Utc>) -> Result<Fingerprint, InvalidItem> {
        if raw.title.trim().is_empty() {
            return Err(InvalidItem::MissingTitle {
                source_name: raw.source.to_string(),
            });
        }
        if raw.url.trim().is_empty() {
            return Err(InvalidItem::MissingUrl {
                source_name: raw.source.to_string(),
            });
        }

        let fp = self.normalizer.fingerprint(&raw.title, &raw.url);
        let target = if self.items.contains_key(&fp) {
            fp
        } else if let Some(similar) = self.find_similar(&raw) {
            similar
        } else {
            fp
        };

        match self.items.get_mut(&target) {
            Some(existing) => {
                existing.provenance.push(raw);
                existing.last_seen = existing.last_seen.max(now);
                existing.score = score::compute(existing, now, &self.score_cfg);
                counter!("trend_merges_total").increment(1);
                tracing::debug!(
                    target: "dedup",
                    fingerprint = %target,
                    provenance = existing.provenance.len(),
                    "merged raw item into existing trend"
                );
            }
            None => {
                let content_hash = self.normalizer.content_hash(&raw.title);
                let mut item = CanonicalItem {
                    fingerprint: target.clone(),
                    title: raw.title.clone(),
                    url: raw.url.clone(),
                    region: raw.region.clone(),
                    first_seen: now,
                    last_seen: now,
                    score: 0.0,
                    content_hash,
                    provenance: vec![raw],
                };
                item.score = score::compute(&item, now, &self.score_cfg);
                self.items.insert(target.clone(), item);
            }
        }
        Ok(target)
    }

    /// Fuzzy fallback: same domain and near-identical normalized title.
    fn find_similar(&self, raw: &RawItem) -> Option<Fingerprint> {
        let threshold = self.normalizer.similarity_threshold();
        let norm_title = self.normalizer.normalize(&raw.title);
        let domain = url_domain(&raw.url);
        self.items
            .values()
            .filter(|c| url_domain(&c.url) == domain)
            .find(|c| {
                normalized_levenshtein(&norm_title, &self.normalizer.normalize(&c.title))
                    >= threshold
            })
            .map(|c| c.fingerprint.clone())
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<&CanonicalItem> {
        self.items.get(fp)
    }

    pub fn items(&self) -> impl Iterator<Item = &CanonicalItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Recompute every aggregate score at `now` (recency decay moves even
    /// when no new raw items arrive).
    pub fn rescore(&mut self, now: DateTime<Utc>) {
        for item in self.items.values_mut() {
            item.score = score::compute(item, now, &self.score_cfg);
        }
    }

    /// Drop canonical items not seen for `max_age_secs`, bounding the active
    /// window's memory.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_age_secs: i64) {
        self.items
            .retain(|_, item| (now - item.last_seen).num_seconds() <= max_age_secs);
    }
}
