//! HTTP text-generation providers.
//!
//! Implements [`TextGenerator`] for two backends:
//!
//! | Kind | Endpoint | Auth |
//! |------|----------|------|
//! | `openai` | `POST {url}/v1/chat/completions` with `response_format: json_object` | `OPENAI_API_KEY` |
//! | `ollama` | `POST {url}/api/chat` with `format: "json"` | none |
//!
//! `disabled` maps to the core's [`DisabledGenerator`], which fails fast.
//!
//! # Retry Strategy
//!
//! Both providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry
//!
//! Delays are 1s, 2s, 4s, ... capped at 32s, for up to
//! `provider.max_retries` retries. The core bounds every call with its own
//! timeout on top of this.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use plotline_core::error::ProviderError;
use plotline_core::provider::{DisabledGenerator, ProviderRequest, TextGenerator};

use crate::config::ProviderConfig;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Build the provider named by `provider.kind`.
///
/// # Errors
///
/// Returns an error if the kind is unknown, `model` is missing, or
/// `OPENAI_API_KEY` is unset for the OpenAI provider.
pub fn build_generator(config: &ProviderConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.kind.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown provider kind: {}", other),
    }
}

fn system_prompt(request: &ProviderRequest) -> String {
    format!(
        "You are a story development assistant. Answer with a single JSON object \
         matching this shape and nothing else:\n{}",
        request.schema
    )
}

fn user_prompt(request: &ProviderRequest) -> String {
    if request.context.is_empty() {
        request.instruction.clone()
    } else {
        format!("{}\n\n---\n{}", request.instruction, request.context)
    }
}

/// Parse the model's message content as JSON, tolerating a code fence.
fn parse_content(content: &str) -> Result<Value, ProviderError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))
}

fn openai_content(json: &Value) -> Result<Value, ProviderError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))?;
    parse_content(content)
}

fn ollama_content(json: &Value) -> Result<Value, ProviderError> {
    let content = json
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| ProviderError::Malformed("missing message.content".into()))?;
    parse_content(content)
}

/// POST `body` with backoff, returning the successful response JSON.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value, ProviderError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, ?delay, "retrying provider call");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| ProviderError::Malformed(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 {
                    last_err = Some(ProviderError::RateLimited);
                    continue;
                }
                if status.is_server_error() {
                    last_err = Some(ProviderError::Http {
                        status: status.as_u16(),
                        body: body_text,
                    });
                    continue;
                }
                return Err(ProviderError::Http {
                    status: status.as_u16(),
                    body: body_text,
                });
            }
            Err(e) => {
                last_err = Some(ProviderError::Transport(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ProviderError::Transport("no attempts made".into())))
}

fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ OpenAI ============

pub struct OpenAiGenerator {
    name: String,
    model: String,
    url: String,
    api_key: String,
    temperature: f64,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string());
        Ok(Self {
            name: format!("openai:{}", model),
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<Value, ProviderError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt(request)},
                {"role": "user", "content": user_prompt(request)},
            ],
        });
        let url = format!("{}/v1/chat/completions", self.url);
        let json = post_with_retry(&self.client, &url, Some(&self.api_key), &body, self.max_retries).await?;
        openai_content(&json)
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    name: String,
    model: String,
    url: String,
    temperature: f64,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for Ollama provider"))?;
        let url = config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string());
        Ok(Self {
            name: format!("ollama:{}", model),
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<Value, ProviderError> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "format": "json",
            "options": {"temperature": self.temperature},
            "messages": [
                {"role": "system", "content": system_prompt(request)},
                {"role": "user", "content": user_prompt(request)},
            ],
        });
        let url = format!("{}/api/chat", self.url);
        let json = post_with_retry(&self.client, &url, None, &body, self.max_retries)
            .await
            .map_err(|e| match e {
                ProviderError::Transport(msg) => ProviderError::Transport(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, msg
                )),
                other => other,
            })?;
        ollama_content(&json)
    }
}
