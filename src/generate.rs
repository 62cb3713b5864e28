// src/generate.rs
//! Content-generation collaborators: turn a canonical trend into a bilingual
//! post. The engine only depends on the [`ContentGenerator`] trait; a failed
//! or rejected generation maps to a queue failure, never a crash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::model::CanonicalItem;

/// A ready-to-publish bilingual post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    pub text_tr: String,
    pub text_en: String,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The model/moderation layer rejected the topic.
    #[error("content rejected: {0}")]
    Moderation(String),
    #[error("generation upstream error: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, item: &CanonicalItem) -> Result<PostContent, GenerateError>;
    fn name(&self) -> &'static str;
}

/// Deterministic template generator. Default when no API key is configured;
/// also the workhorse for tests.
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, item: &CanonicalItem) -> Result<PostContent, GenerateError> {
        let sources = item.distinct_sources();
        Ok(PostContent {
            text_tr: format!("Gündemde: {} — {}", item.title, item.url),
            text_en: format!("Trending now: {} — {}", item.title, item.url),
            hashtags: if sources > 1 {
                vec!["#trending".into(), "#news".into()]
            } else {
                vec!["#trending".into()]
            },
        })
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

/// OpenAI-backed generator (Chat Completions). Requires `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    /// `model_override`: pass Some("gpt-4o-mini") to override; defaults to gpt-4o-mini.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("trendcast/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, item: &CanonicalItem) -> Result<PostContent, GenerateError> {
        if self.api_key.is_empty() {
            return Err(GenerateError::Upstream("OPENAI_API_KEY not set".into()));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: ResponseFormat,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            r#type: &'static str,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You write short bilingual social posts about trending topics. \
                   Return JSON with keys text_tr (Turkish), text_en (English), hashtags \
                   (array of strings). Each text <= 240 chars, neutral tone, no emojis.";
        let user = format!("Topic: {}\nLink: {}", item.title, item.url);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg { role: "system", content: sys },
                Msg { role: "user", content: &user },
            ],
            temperature: 0.4,
            max_tokens: 300,
            response_format: ResponseFormat { r#type: "json_object" },
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| GenerateError::Upstream(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // Moderation-style rejections come back as 400s with an error blob.
            if status.as_u16() == 400 {
                return Err(GenerateError::Moderation(body));
            }
            return Err(GenerateError::Upstream(format!("HTTP {status}: {body}")));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| GenerateError::Upstream(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        let parsed: PostContent = serde_json::from_str(content)
            .map_err(|e| GenerateError::Upstream(format!("bad model output: {e}")))?;
        Ok(parsed)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
