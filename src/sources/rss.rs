// src/sources/rss.rs
//! Generic RSS connector. Feed entries become raw items with a modest
//! signal; corroboration and recency do the ranking work for RSS.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::model::{RawItem, Region, SourceId};
use crate::sources::{SourceError, TrendSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

pub(crate) fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct RssSource {
    mode: Mode,
    region: Region,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssSource {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            region: Region::Global,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
            },
            region: Region::Global,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    fn parse_items(&self, xml: &str) -> Result<Vec<RawItem>, SourceError> {
        let clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&clean).map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = it.title.unwrap_or_default();
            let url = it.link.unwrap_or_default();
            if title.trim().is_empty() || url.trim().is_empty() {
                continue;
            }
            let observed_at = it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or_else(Utc::now);
            out.push(RawItem {
                source: SourceId::Rss,
                external_id: it.guid.unwrap_or_else(|| url.clone()),
                title,
                url,
                observed_at,
                signal: 10,
                region: self.region.clone(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl TrendSource for RssSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let mut items = match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml)?,
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()
                    .map_err(|e| SourceError::Unavailable(e.to_string()))?
                    .text()
                    .await?;
                self.parse_items(&body)?
            }
        };
        items.truncate(limit);
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Sample</title>
  <item>
    <title>First &ndash; headline</title>
    <link>https://news.example.com/a</link>
    <guid>a-1</guid>
    <pubDate>Sat, 06 Sep 2025 09:00:00 GMT</pubDate>
  </item>
  <item>
    <title></title>
    <link>https://news.example.com/empty</link>
  </item>
  <item>
    <title>Second headline</title>
    <link>https://news.example.com/b</link>
  </item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_fixture_and_skips_empty_titles() {
        let src = RssSource::from_fixture(SAMPLE);
        let items = src.fetch(10).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First - headline");
        assert_eq!(items[0].external_id, "a-1");
        assert_eq!(items[0].observed_at.to_rfc2822(), "Sat, 6 Sep 2025 09:00:00 +0000");
        // Missing guid falls back to the link.
        assert_eq!(items[1].external_id, "https://news.example.com/b");
    }

    #[tokio::test]
    async fn limit_is_honored() {
        let src = RssSource::from_fixture(SAMPLE);
        let items = src.fetch(1).await.unwrap();
        assert_eq!(items.len(), 1);
    }
}
