// src/sources/google_trends.rs
//! Google Trends connector: the public daily-trends RSS feed per region.
//! Approximate search traffic ("200,000+") becomes the signal; the first
//! linked news article becomes the item url so the domain fingerprint points
//! at the story, not at google.

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::model::{RawItem, Region, SourceId};
use crate::sources::rss::parse_rfc2822;
use crate::sources::{SourceError, TrendSource};

#[derive(Debug, Deserialize)]
struct Feed {
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
    #[serde(rename = "approx_traffic")]
    approx_traffic: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "news_item", default)]
    news_items: Vec<NewsItem>,
}
#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(rename = "news_item_url")]
    url: Option<String>,
}

/// "200,000+" -> 200000. Unparseable or missing traffic gets a floor value;
/// being on the feed at all is already a trend signal.
fn parse_traffic(raw: Option<&str>) -> u64 {
    let digits: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(1_000)
}

pub struct GoogleTrendsSource {
    mode: Mode,
    geo: String,
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

impl GoogleTrendsSource {
    /// `geo` is the feed's region code, e.g. "US" or "TR".
    pub fn new(geo: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http(reqwest::Client::new()),
            geo: geo.into(),
        }
    }

    pub fn from_fixture(xml: &str, geo: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            geo: geo.into(),
        }
    }

    fn feed_url(&self) -> String {
        format!("https://trends.google.com/trending/rss?geo={}", self.geo)
    }

    fn parse_items(&self, xml: &str) -> Result<Vec<RawItem>, SourceError> {
        let feed: Feed = from_str(xml).map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut out = Vec::with_capacity(feed.channel.item.len());
        for it in feed.channel.item {
            let title = it.title.unwrap_or_default();
            if title.trim().is_empty() {
                continue;
            }
            let url = it
                .news_items
                .iter()
                .find_map(|n| n.url.clone().filter(|u| !u.trim().is_empty()))
                .or(it.link)
                .unwrap_or_default();
            if url.trim().is_empty() {
                continue;
            }
            let observed_at = it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or_else(Utc::now);
            out.push(RawItem {
                source: SourceId::GoogleTrends,
                external_id: format!("{}:{}", self.geo, title),
                title,
                url,
                observed_at,
                signal: parse_traffic(it.approx_traffic.as_deref()),
                region: Region::Country(self.geo.clone()),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl TrendSource for GoogleTrendsSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let mut items = match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml)?,
            Mode::Http(client) => {
                let body = client
                    .get(self.feed_url())
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
        "google_trends"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:ht="https://trends.google.com/trending/rss" version="2.0"><channel>
  <title>Daily Search Trends</title>
  <item>
    <title>big breaking topic</title>
    <ht:approx_traffic>200,000+</ht:approx_traffic>
    <link>https://trends.google.com/trending?geo=US</link>
    <pubDate>Sat, 06 Sep 2025 10:00:00 -0700</pubDate>
    <ht:news_item>
      <ht:news_item_url>https://news.example.com/story</ht:news_item_url>
    </ht:news_item>
  </item>
  <item>
    <title>quieter topic</title>
    <link>https://trends.google.com/trending?geo=US</link>
  </item>
  <item>
    <title></title>
    <link>https://trends.google.com/trending?geo=US</link>
  </item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_feed_with_traffic_and_news_url() {
        let src = GoogleTrendsSource::from_fixture(SAMPLE, "US");
        let items = src.fetch(10).await.unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "big breaking topic");
        assert_eq!(items[0].signal, 200_000);
        // The linked article wins over the google landing page.
        assert_eq!(items[0].url, "https://news.example.com/story");
        assert_eq!(items[0].region, Region::Country("US".into()));

        // No news item: the feed link and the floor signal are used.
        assert_eq!(items[1].url, "https://trends.google.com/trending?geo=US");
        assert_eq!(items[1].signal, 1_000);
    }

    #[test]
    fn traffic_strings_reduce_to_counts() {
        assert_eq!(parse_traffic(Some("200,000+")), 200_000);
        assert_eq!(parse_traffic(Some("1,000,000+")), 1_000_000);
        assert_eq!(parse_traffic(Some("garbage")), 1_000);
        assert_eq!(parse_traffic(None), 1_000);
    }
}
