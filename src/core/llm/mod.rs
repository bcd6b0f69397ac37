//! Text-generation collaborator
//!
//! The analysis core only ever sees text coming back from a prompt. Providers
//! live behind the [`TextGenerator`] trait so the relationship classifier can
//! run against a real endpoint or a scripted stand-in.

mod providers;

pub use providers::{OpenAiCompatibleProvider, create_generator, strip_think_blocks};

use crate::config::LlmConfig;
use crate::error::Result;

/// Something that turns a prompt into text
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply of at most `max_output_tokens` tokens
    async fn generate(&self, prompt: &str, max_output_tokens: usize, temperature: f32) -> Result<String>;

    /// Get the provider name (e.g., "OpenAI-compatible")
    fn provider_name(&self) -> &str;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}

/// Prompt/reply token window shared by one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Tokens available to prompt and reply together
    pub max_prompt_tokens: usize,

    /// Ceiling on the reply alone
    pub max_output_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_prompt_tokens: usize, max_output_tokens: usize) -> Self {
        Self { max_prompt_tokens, max_output_tokens }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.max_prompt_tokens, config.max_output_tokens)
    }

    /// Rough token count: four characters per token
    pub fn estimate_tokens(text: &str) -> usize {
        text.chars().count() / 4
    }

    /// Reply tokens left once `prompt` is sent, one token held in reserve
    pub fn allowed_output(&self, prompt: &str) -> usize {
        let used = Self::estimate_tokens(prompt);
        self.max_prompt_tokens
            .saturating_sub(used)
            .saturating_sub(1)
            .min(self.max_output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_output_is_capped() {
        let budget = TokenBudget::new(28000, 3500);
        assert_eq!(budget.allowed_output("short prompt"), 3500);
    }

    #[test]
    fn test_allowed_output_shrinks_with_prompt() {
        let budget = TokenBudget::new(100, 3500);
        let prompt = "x".repeat(360); // 90 tokens
        assert_eq!(budget.allowed_output(&prompt), 9);
    }

    #[test]
    fn test_allowed_output_never_negative() {
        let budget = TokenBudget::new(10, 3500);
        assert_eq!(budget.allowed_output(&"x".repeat(4000)), 0);
    }
}
