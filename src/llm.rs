use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api_types::{ChatMessage, ChatRequest, ChatResponse};
use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub const REPORT: GenerationParams = GenerationParams { temperature: 0.4, max_tokens: Some(512) };
    pub const QUESTION: GenerationParams = GenerationParams { temperature: 0.3, max_tokens: None };
    pub const ADVISORY: GenerationParams = GenerationParams { temperature: 0.2, max_tokens: None };
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation request failed: {0}")]
    Network(String),
    #[error("text generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("text generation response was malformed: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Network errors, rate limits and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Network(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Malformed(_) => false,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str, params: GenerationParams) -> Result<String, GenerationError>;
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl ChatCompletionsClient {
    pub fn new(cfg: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: chat_endpoint(&cfg.api_base),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            max_retries: cfg.max_retries.min(5),
            backoff: Duration::from_millis(500),
        })
    }

    async fn send_once(&self, prompt: &str, params: GenerationParams) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::user(prompt)],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| GenerationError::Network(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| GenerationError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Status { status: status.as_u16(), body: truncate(&text, 300) });
        }
        parse_completion(&text)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, params: GenerationParams) -> Result<String, GenerationError> {
        let start = std::time::Instant::now();
        debug!("LLM call starting - model={}, prompt_length={} chars", self.model, prompt.len());

        let mut attempt = 0u32;
        let answer = loop {
            match self.send_once(prompt, params).await {
                Ok(a) => break a,
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let wait = self.backoff * 2u32.pow(attempt);
                    attempt += 1;
                    warn!("LLM call failed, retrying - attempt={}/{}, wait={:?}, error={}", attempt, self.max_retries, wait, e);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "LLM API call completed - duration={:.2}s, response_length={} chars",
            start.elapsed().as_secs_f32(),
            answer.len()
        );
        Ok(answer)
    }
}

/// Accepts `.../v1`, a bare host, or the full `/chat/completions` URL.
pub fn chat_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

pub fn parse_completion(raw: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse =
        serde_json::from_str(raw).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GenerationError::Malformed("no choices[0].message.content".to_string()))
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned outcomes and records every prompt it receives.
    pub struct ScriptedGenerator {
        outcomes: Mutex<Vec<Result<String, GenerationError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(outcomes: Vec<Result<String, GenerationError>>) -> Self {
            Self { outcomes: Mutex::new(outcomes), prompts: Mutex::new(Vec::new()) }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, prompt: &str, _params: GenerationParams) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                return Err(GenerationError::Network("no scripted outcome left".into()));
            }
            outcomes.remove(0)
        }
    }
}
