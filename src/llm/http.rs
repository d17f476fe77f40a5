use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::CompletionProvider;
use crate::error::CompletionError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Wire format spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `/chat/completions` (OpenAI, Perplexity, LM Studio, vLLM, ...).
    OpenAiCompatible,
    /// Anthropic `/v1/messages`.
    Anthropic,
}

impl ApiFlavor {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => ApiFlavor::Anthropic,
            _ => ApiFlavor::OpenAiCompatible,
        }
    }
}

/// Defaults used when a provider's environment variables are absent.
pub struct ProviderDefaults {
    pub base_url: &'static str,
    pub model: &'static str,
    pub flavor: ApiFlavor,
}

pub const GENERAL_DEFAULTS: ProviderDefaults = ProviderDefaults {
    base_url: "https://api.anthropic.com/v1",
    model: "claude-3-5-sonnet-20240620",
    flavor: ApiFlavor::Anthropic,
};

pub const SEARCH_DEFAULTS: ProviderDefaults = ProviderDefaults {
    base_url: "https://api.perplexity.ai",
    model: "llama-3.1-sonar-large-128k-online",
    flavor: ApiFlavor::OpenAiCompatible,
};

/// Single-attempt HTTP completion provider. Retries live in [`super::CompletionClient`].
pub struct LlmClient {
    client: reqwest::Client,
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    flavor: ApiFlavor,
}

impl LlmClient {
    /// Build a client from `{prefix}_BASE_URL`, `{prefix}_MODEL`, `{prefix}_API_KEY`,
    /// `{prefix}_API_FLAVOR` and `{prefix}_TIMEOUT_SECS`.
    pub fn from_env(prefix: &str, defaults: &ProviderDefaults) -> Result<Self> {
        let var = |suffix: &str| dotenv::var(format!("{}_{}", prefix, suffix)).ok();

        let base_url = var("BASE_URL").unwrap_or_else(|| defaults.base_url.to_string());
        let model = var("MODEL").unwrap_or_else(|| defaults.model.to_string());
        let flavor = var("API_FLAVOR")
            .map(|f| ApiFlavor::parse(&f))
            .unwrap_or(defaults.flavor);
        let api_key = var("API_KEY").filter(|k| !k.is_empty());
        let timeout_secs = var("TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            name: prefix.to_lowercase(),
            base_url,
            model,
            api_key,
            flavor,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if self.api_key.is_none() {
            self.api_key = api_key.filter(|k| !k.is_empty());
        }
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the request endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.flavor {
            ApiFlavor::OpenAiCompatible => {
                if base.ends_with("/chat/completions") {
                    base.to_string()
                } else {
                    format!("{}/chat/completions", base)
                }
            }
            ApiFlavor::Anthropic => {
                if base.ends_with("/messages") {
                    base.to_string()
                } else if base.ends_with("/v1") {
                    format!("{}/messages", base)
                } else {
                    format!("{}/v1/messages", base)
                }
            }
        }
    }

    async fn send(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError> {
        let messages = [Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        req = match (self.flavor, &self.api_key) {
            (ApiFlavor::Anthropic, Some(key)) => req
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            (ApiFlavor::Anthropic, None) => req.header("anthropic-version", ANTHROPIC_VERSION),
            (ApiFlavor::OpenAiCompatible, Some(key)) => {
                req.header("Authorization", format!("Bearer {}", key))
            }
            (ApiFlavor::OpenAiCompatible, None) => req,
        };

        let resp = req.send().await.map_err(classify_transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CompletionError::Fatal(format!("undecodable provider payload: {}", e)))?;

        let content = match self.flavor {
            ApiFlavor::OpenAiCompatible => json["choices"]
                .get(0)
                .and_then(|c| c["message"]["content"].as_str())
                .unwrap_or("")
                .to_string(),
            ApiFlavor::Anthropic => json["content"]
                .as_array()
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b["type"] == "text")
                        .filter_map(|b| b["text"].as_str())
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default(),
        };

        if content.trim().is_empty() {
            return Err(CompletionError::Transient("provider returned empty content".into()));
        }
        Ok(content)
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_once(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError> {
        self.send(prompt, max_tokens).await
    }
}

/// Map an HTTP error status to a retry class.
pub fn classify_status(status: StatusCode, body: &str) -> CompletionError {
    let snippet: String = body.chars().take(300).collect();
    let msg = format!("HTTP {}: {}", status.as_u16(), snippet);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
        // Anthropic "overloaded"
        || status.as_u16() == 529
    {
        CompletionError::Transient(msg)
    } else {
        CompletionError::Fatal(msg)
    }
}

fn classify_transport(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() || err.is_connect() || err.is_body() {
        CompletionError::Transient(err.to_string())
    } else {
        CompletionError::Fatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad body").is_transient());
    }

    #[test]
    fn test_flavor_parse() {
        assert_eq!(ApiFlavor::parse("Anthropic"), ApiFlavor::Anthropic);
        assert_eq!(ApiFlavor::parse("openai"), ApiFlavor::OpenAiCompatible);
        assert_eq!(ApiFlavor::parse(""), ApiFlavor::OpenAiCompatible);
    }

    fn client(base_url: &str, flavor: ApiFlavor) -> LlmClient {
        LlmClient {
            client: reqwest::Client::new(),
            name: "test".into(),
            base_url: base_url.into(),
            model: "m".into(),
            api_key: None,
            flavor,
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            client("https://api.perplexity.ai", ApiFlavor::OpenAiCompatible).endpoint(),
            "https://api.perplexity.ai/chat/completions"
        );
        assert_eq!(
            client("http://localhost:1234/v1/", ApiFlavor::OpenAiCompatible).endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.anthropic.com/v1", ApiFlavor::Anthropic).endpoint(),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            client("https://api.anthropic.com", ApiFlavor::Anthropic).endpoint(),
            "https://api.anthropic.com/v1/messages"
        );
    }
}
