// src/publish.rs
//! Publishing collaborators. The engine depends on the [`Publisher`] trait
//! only; platform-side rate limiting is reported as its own error variant so
//! the scheduler can back off without confusing it with the internal policy.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::generate::PostContent;

#[derive(Debug, Error)]
pub enum PublishError {
    /// The platform itself throttled us; distinct from the internal policy.
    #[error("platform rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("post rejected by platform: {0}")]
    Rejected(String),
    #[error("publish transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish and return the platform's id for the new post.
    async fn publish(&self, content: &PostContent) -> Result<String, PublishError>;
    fn name(&self) -> &'static str;
}

/// Webhook-backed publisher with bounded retries and exponential backoff.
#[derive(Clone)]
pub struct WebhookPublisher {
    webhook: String,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookPublisher {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text_tr: &'a str,
    text_en: &'a str,
    hashtags: &'a [String],
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, content: &PostContent) -> Result<String, PublishError> {
        let body = WebhookBody {
            text_tr: &content.text_tr,
            text_en: &content.text_en,
            hashtags: &content.hashtags,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if rsp.status().as_u16() == 429 {
                        let retry_after_secs = rsp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(60);
                        return Err(PublishError::RateLimited { retry_after_secs });
                    }
                    if rsp.status().is_client_error() {
                        let msg = rsp.text().await.unwrap_or_default();
                        return Err(PublishError::Rejected(msg));
                    }
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(PublishError::Transport(e.to_string()));
                    }
                    // Platforms echo an id; fall back to a header or a
                    // synthetic id when the body is empty.
                    let id = rsp.text().await.unwrap_or_default();
                    let id = id.trim();
                    return Ok(if id.is_empty() {
                        format!("webhook-{}", chrono::Utc::now().timestamp())
                    } else {
                        id.to_string()
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(PublishError::Transport(e.to_string()));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// In-memory publisher for tests and dry runs: records every post, can be
/// scripted to fail.
#[derive(Default)]
pub struct MemoryPublisher {
    pub posts: Mutex<Vec<PostContent>>,
    pub fail_next: Mutex<Option<PublishError>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn fail_next_with(&self, err: PublishError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, content: &PostContent) -> Result<String, PublishError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        let mut posts = self.posts.lock().unwrap();
        posts.push(content.clone());
        Ok(format!("mem-{}", posts.len()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
