// src/fingerprint.rs
//! Title/url normalization and fingerprinting.
//!
//! The fingerprint is the identity used to collapse the same trend reported
//! by different sources: SHA-256 over `normalized_title | url_domain`,
//! case/whitespace/punctuation-insensitive. The normalization rule is
//! deliberately a configurable pure function (see [`Normalizer`]) so tests
//! can pin it down and deployments can tune it.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic identity of a canonical trend item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filler words stripped from titles when `strip_stop_words` is on, so that
/// "The markets are rallying" and "markets rallying" collapse together.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "this", "that", "these", "those",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub strip_stop_words: bool,
    pub stop_words: Vec<String>,
    /// Normalized-Levenshtein similarity above which two titles from the same
    /// domain are treated as the same trend even when fingerprints differ.
    pub similarity_threshold: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            strip_stop_words: true,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            similarity_threshold: 0.92,
        }
    }
}

/// Pure title normalizer. Same input always yields the same output,
/// regardless of call order or process lifetime.
#[derive(Debug, Clone)]
pub struct Normalizer {
    cfg: NormalizerConfig,
}

impl Normalizer {
    pub fn new(cfg: NormalizerConfig) -> Self {
        Self { cfg }
    }

    /// Lowercase, decode HTML entities, strip punctuation, collapse
    /// whitespace, then drop stop words when configured.
    pub fn normalize(&self, text: &str) -> String {
        let mut out = html_escape::decode_html_entities(text).to_string();
        out = out.to_lowercase();

        static RE_PUNCT: OnceCell<Regex> = OnceCell::new();
        let re_punct = RE_PUNCT.get_or_init(|| Regex::new(r"[^\w\s]").unwrap());
        out = re_punct.replace_all(&out, " ").to_string();

        static RE_WS: OnceCell<Regex> = OnceCell::new();
        let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
        out = re_ws.replace_all(&out, " ").trim().to_string();

        if self.cfg.strip_stop_words {
            out = out
                .split(' ')
                .filter(|w| !w.is_empty() && !self.cfg.stop_words.iter().any(|s| s == w))
                .collect::<Vec<_>>()
                .join(" ");
        }
        out
    }

    /// Identity hash over normalized title + url domain.
    pub fn fingerprint(&self, title: &str, url: &str) -> Fingerprint {
        let input = format!("{}|{}", self.normalize(title), url_domain(url));
        Fingerprint(hex_sha256(&input, 16))
    }

    /// Hash over the normalized title alone; used for cross-language /
    /// cross-url repost blocking downstream.
    pub fn content_hash(&self, title: &str) -> String {
        hex_sha256(&self.normalize(title), 16)
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.cfg.similarity_threshold
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

fn hex_sha256(input: &str, bytes: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(bytes * 2);
    for b in digest.iter().take(bytes) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Extract the host part of a url: scheme, `www.`, port and path stripped,
/// lowercased. Tolerates bare hosts and malformed input (returns it as-is,
/// lowercased, rather than failing: the fingerprint must stay total).
pub fn url_domain(url: &str) -> String {
    let s = url.trim();
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s);
    let host = s.split(['/', '?', '#']).next().unwrap_or(s);
    let host = host.split('@').next_back().unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.to_lowercase()
}
