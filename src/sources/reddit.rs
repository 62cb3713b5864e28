// src/sources/reddit.rs
//! Reddit connector: public listing JSON of a subreddit's hot posts,
//! upvote count as the signal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::model::{RawItem, Region, SourceId};
use crate::sources::{SourceError, TrendSource};

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}
#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}
#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}
#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: String,
    url: Option<String>,
    permalink: Option<String>,
    #[serde(default)]
    ups: u64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    stickied: bool,
}

pub struct RedditSource {
    subreddit: String,
    client: reqwest::Client,
    region: Region,
}

impl RedditSource {
    pub fn new(subreddit: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("trendcast/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            subreddit: subreddit.into(),
            client,
            region: Region::Global,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    fn to_raw(&self, post: Post) -> Option<RawItem> {
        if post.stickied {
            return None;
        }
        let url = post
            .url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| post.permalink.map(|p| format!("https://reddit.com{p}")))?;
        let observed_at = DateTime::<Utc>::from_timestamp(post.created_utc as i64, 0)
            .unwrap_or_else(Utc::now);
        Some(RawItem {
            source: SourceId::Reddit,
            external_id: post.id,
            title: post.title,
            url,
            observed_at,
            signal: post.ups,
            region: self.region.clone(),
        })
    }

    fn parse_listing(&self, body: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let listing: Listing =
            serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(|c| self.to_raw(c.data))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl TrendSource for RedditSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        let url = format!(
            "https://www.reddit.com/r/{}/hot.json?limit={}",
            self.subreddit, limit
        );
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?
            .text()
            .await?;
        self.parse_listing(&body, limit)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
