use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::PipelineError;
use crate::error::upstream_snippet;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";
pub const DEFAULT_SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes video transcripts. \
Provide a clear, structured summary that captures the key points, main arguments, and important details. \
Use bullet points for key takeaways.";

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Per-request summarization settings supplied by the caller
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryOptions {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

impl SummaryOptions {
    pub fn model(&self) -> &str {
        non_empty(&self.model).unwrap_or(DEFAULT_MODEL)
    }

    pub fn system_prompt(&self) -> &str {
        non_empty(&self.system_prompt).unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Turns transcript text into a summary
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript_text: &str, title: &str, options: &SummaryOptions)
    -> Result<String, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Gemini,
    OpenAi,
}

impl Provider {
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("claude") {
            Provider::Anthropic
        } else if model.starts_with("gemini") {
            Provider::Gemini
        } else {
            Provider::OpenAi
        }
    }

    fn key_env_var(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Summarizer that talks to Anthropic, Gemini or OpenAI depending on the model name
#[derive(Debug, Clone)]
pub struct LlmSummarizer {
    client: reqwest::Client,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn request_summary(&self, transcript_text: &str, title: &str, options: &SummaryOptions) -> Result<String> {
        let model = options.model();
        let provider = Provider::for_model(model);
        let api_key = resolve_api_key(options, provider)?;
        let user_message = user_message(title, transcript_text);

        match provider {
            Provider::Anthropic => {
                self.summarize_anthropic(&api_key, model, options.system_prompt(), &user_message)
                    .await
            }
            Provider::Gemini => {
                self.summarize_gemini(&api_key, model, options.system_prompt(), &user_message)
                    .await
            }
            Provider::OpenAi => {
                self.summarize_openai(&api_key, model, options.system_prompt(), &user_message)
                    .await
            }
        }
    }

    async fn summarize_anthropic(&self, api_key: &str, model: &str, system: &str, user_message: &str) -> Result<String> {
        debug!("Summarizing via Anthropic API with model {model}");

        let body = serde_json::json!({
            "model": model,
            "max_tokens": 4096,
            "system": system,
            "messages": [
                {
                    "role": "user",
                    "content": user_message
                }
            ]
        });

        let resp = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Anthropic API returned {status}: {}", upstream_snippet(&body));
        }

        let json: serde_json::Value = resp.json().await?;
        extract_anthropic_text(&json)
    }

    async fn summarize_gemini(&self, api_key: &str, model: &str, system: &str, user_message: &str) -> Result<String> {
        debug!("Summarizing via Gemini API with model {model}");

        let body = serde_json::json!({
            "system_instruction": {
                "parts": [{ "text": system }]
            },
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": user_message }]
                }
            ]
        });

        let resp = self
            .client
            .post(format!("{GEMINI_BASE_URL}/{model}:generateContent"))
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Gemini API returned {status}: {}", upstream_snippet(&body));
        }

        let json: serde_json::Value = resp.json().await?;
        extract_gemini_text(&json)
    }

    async fn summarize_openai(&self, api_key: &str, model: &str, system: &str, user_message: &str) -> Result<String> {
        debug!("Summarizing via OpenAI API with model {model}");

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {
                    "role": "system",
                    "content": system
                },
                {
                    "role": "user",
                    "content": user_message
                }
            ]
        });

        let resp = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("OpenAI API returned {status}: {}", upstream_snippet(&body));
        }

        let json: serde_json::Value = resp.json().await?;
        extract_openai_text(&json)
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        transcript_text: &str,
        title: &str,
        options: &SummaryOptions,
    ) -> Result<String, PipelineError> {
        self.request_summary(transcript_text, title, options)
            .await
            .map_err(|e| PipelineError::SummarizationFailed(e.to_string()))
    }
}

fn resolve_api_key(options: &SummaryOptions, provider: Provider) -> Result<String> {
    if let Some(key) = non_empty(&options.api_key) {
        return Ok(key.to_string());
    }
    let var = provider.key_env_var();
    std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| eyre::eyre!("no API key supplied and {var} is not set"))
}

fn user_message(title: &str, transcript_text: &str) -> String {
    if title.is_empty() {
        format!("Summarize this video transcript:\n\n{transcript_text}")
    } else {
        format!("Summarize this transcript from the video \"{title}\":\n\n{transcript_text}")
    }
}

fn extract_anthropic_text(json: &serde_json::Value) -> Result<String> {
    if let Some(content) = json.get("content").and_then(|c| c.as_array()) {
        let text: String = content
            .iter()
            .filter_map(|block| {
                if block.get("type")?.as_str()? == "text" {
                    block.get("text")?.as_str().map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");
        if !text.is_empty() {
            return Ok(text);
        }
    }
    bail!("unexpected Anthropic API response format");
}

fn extract_gemini_text(json: &serde_json::Value) -> Result<String> {
    if let Some(parts) = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text")?.as_str())
            .collect::<Vec<_>>()
            .join("");
        if !text.is_empty() {
            return Ok(text);
        }
    }
    bail!("Gemini API response contained no text");
}

fn extract_openai_text(json: &serde_json::Value) -> Result<String> {
    if let Some(text) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
    {
        return Ok(text.to_string());
    }
    bail!("unexpected OpenAI API response format");
}
