// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! The external language-model boundary. One text prompt goes out per
//! question; whatever comes back is treated as untrusted, semi-structured
//! text for the processor to coerce.

use async_trait::async_trait;
use dotenvy::dotenv;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| Client::builder().build().expect("HTTP client"));

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("Malformed provider payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Network(e.to_string())
    }
}

/// The single seam the query processor depends on. Production code uses the
/// HTTP adapter; tests script this trait directly.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn generate_response(&self, prompt: &str) -> std::result::Result<String, LlmError>;
}

/// Environment-configured adapter speaking the Anthropic, Ollama and
/// OpenAI-compatible wire shapes, selected by endpoint.
#[derive(Clone, Debug)]
pub struct HttpLlmAdapter {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub api_version: String,
}

impl HttpLlmAdapter {
    pub fn anthropic() -> std::result::Result<Self, LlmError> {
        dotenv().ok();
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LlmError::Payload("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            endpoint: std::env::var("ANTHROPIC_ENDPOINT")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string()),
            api_key,
            model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string()),
            max_tokens: env_usize("ANTHROPIC_MAX_TOKENS", 4096),
            temperature: env_f32("ANTHROPIC_TEMPERATURE", 0.2),
            api_version: std::env::var("ANTHROPIC_API_VERSION")
                .unwrap_or_else(|_| "2023-06-01".to_string()),
        })
    }

    pub fn ollama(model: impl Into<String>) -> Self {
        dotenv().ok();
        Self {
            endpoint: std::env::var("OLLAMA_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:11434/api/generate".to_string()),
            api_key: String::new(),
            model: model.into(),
            max_tokens: env_usize("OLLAMA_MAX_TOKENS", 4096),
            temperature: env_f32("OLLAMA_TEMPERATURE", 0.2),
            api_version: String::new(),
        }
    }

    pub fn openai_compatible(model: impl Into<String>) -> Self {
        dotenv().ok();
        Self {
            endpoint: std::env::var("OPENAI_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:11434/v1/chat/completions".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: model.into(),
            max_tokens: env_usize("OPENAI_MAX_TOKENS", 4096),
            temperature: env_f32("OPENAI_TEMPERATURE", 0.2),
            api_version: String::new(),
        }
    }

    /// Provider inferred from the endpoint so one adapter type covers every
    /// configured backend.
    fn provider(&self) -> &'static str {
        if self.endpoint.contains("anthropic.com") {
            "anthropic"
        } else if self.endpoint.contains("/v1/chat/completions")
            || self.endpoint.contains("openai.com")
        {
            "openai"
        } else if self.endpoint.contains("11434") || self.endpoint.contains("ollama") {
            "ollama"
        } else {
            "anthropic"
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn generate_response(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        let client = &*HTTP_CLIENT;
        let provider = self.provider();

        let request = match provider {
            "ollama" => {
                let payload = json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                    "options": {
                        "temperature": self.temperature,
                        "num_predict": self.max_tokens
                    }
                });
                debug!(payload = ?payload, "sending request to Ollama API");
                client
                    .post(&self.endpoint)
                    .header("content-type", "application/json")
                    .json(&payload)
            }
            "openai" => {
                let payload = json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "messages": [{ "role": "user", "content": prompt }]
                });
                debug!(payload = ?payload, "sending request to OpenAI-compatible API");
                client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .header("content-type", "application/json")
                    .json(&payload)
            }
            _ => {
                let payload = json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "messages": [{ "role": "user", "content": prompt }]
                });
                debug!(payload = ?payload, "sending request to Anthropic API");
                client
                    .post(&self.endpoint)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", &self.api_version)
                    .header("content-type", "application/json")
                    .json(&payload)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        info!(%status, provider, "received response from LLM API");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response.json().await?;
        debug!(response_data = ?data, "raw API response");

        let content = match provider {
            "ollama" => data["response"].as_str(),
            "openai" => data["choices"][0]["message"]["content"].as_str(),
            _ => data["content"][0]["text"].as_str(),
        }
        .ok_or_else(|| {
            LlmError::Payload(format!("no completion text in {provider} response"))
        })?;

        Ok(content.to_string())
    }
}

/// Best-effort extraction of a JSON object from free-form model text: a
/// fenced ```json block wins, then the first balanced-brace span that parses.
pub fn extract_json(content: &str) -> Option<String> {
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            let block = content[start + 7..start + 7 + end].trim();
            if serde_json::from_str::<Value>(block).is_ok() {
                return Some(block.to_string());
            }
        }
    }

    let start_pos = content.find('{')?;
    let mut brace_count = 0;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, ch) in content[start_pos..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '"' => in_string = !in_string,
            '\\' if in_string => escape_next = true,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => {
                brace_count -= 1;
                if brace_count == 0 {
                    let candidate = &content[start_pos..=start_pos + i];
                    if serde_json::from_str::<Value>(candidate).is_ok() {
                        return Some(candidate.to_string());
                    }
                    break;
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json_block() {
        let text = "Here you go:\n```json\n{\"answer\": \"42\"}\n```\nDone.";
        assert_eq!(extract_json(text).unwrap(), "{\"answer\": \"42\"}");
    }

    #[test]
    fn extracts_first_balanced_object() {
        let text = "The result is {\"answer\": {\"mean\": 20.0}} as requested";
        let json = extract_json(text).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["answer"]["mean"], 20.0);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let text = r#"{"answer": "see {this}", "create_visualization": false}"#;
        assert_eq!(extract_json(text).unwrap(), text);
    }

    #[test]
    fn plain_prose_yields_none() {
        assert!(extract_json("not json").is_none());
        assert!(extract_json("an { unbalanced brace").is_none());
    }

    #[test]
    fn provider_is_inferred_from_endpoint() {
        let mut adapter = HttpLlmAdapter::ollama("llama3.2:latest");
        adapter.endpoint = "http://localhost:11434/api/generate".to_string();
        assert_eq!(adapter.provider(), "ollama");
        adapter.endpoint = "http://localhost:11434/v1/chat/completions".to_string();
        assert_eq!(adapter.provider(), "openai");
        adapter.endpoint = "https://api.anthropic.com/v1/messages".to_string();
        assert_eq!(adapter.provider(), "anthropic");
    }
}
