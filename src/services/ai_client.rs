//! AI chat completion client
//!
//! Thin wrapper over an OpenAI-style /chat/completions endpoint. One
//! attempt per call with a hard timeout; callers treat any error as
//! "AI unavailable" and fall back to deterministic logic.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::AiConfig;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Chat completion client; cheap to clone
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    config: AiConfig,
}

impl ChatClient {
    pub fn new(config: AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled && !self.config.api_key.is_empty()
    }

    pub fn max_candidates(&self) -> usize {
        self.config.max_candidates
    }

    /// Single-attempt completion. Timeout and transport errors surface
    /// as `Error::AiService`; no retry here.
    pub async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f64) -> Result<String> {
        if !self.enabled() {
            return Err(Error::AiService("AI service disabled".into()));
        }

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::AiService(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::AiService(format!(
                "AI service returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::AiService(format!("Malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::AiService("Empty completion".into()))
    }
}

/// Extract the JSON object embedded in a completion: everything from the
/// first '{' to the last '}'. Models routinely wrap JSON in prose or
/// markdown fences.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
