pub mod http;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::CompletionError;
use retry::{with_retry, RetryPolicy};

pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// A remote text-completion capability: one prompt in, one text out, one attempt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete_once(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError>;
}

/// Completion capability with the shared retry policy applied.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError> {
        let provider = self.provider.clone();
        let text = with_retry(&self.policy, provider.name(), || {
            let provider = provider.clone();
            async move { provider.complete_once(prompt, max_tokens).await }
        })
        .await?;

        debug!(
            provider = self.provider.name(),
            prompt_len = prompt.len(),
            response_len = text.len(),
            "─── Completion ───"
        );
        for line in text.lines().take(40) {
            debug!("  │ {}", line);
        }
        Ok(text)
    }
}
