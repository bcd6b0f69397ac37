use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{AtlasError, Result};
use super::TextGenerator;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_KEY_ENV: &str = "PYATLAS_API_KEY";

/// Factory function to create the text generator described by config
pub fn create_generator(config: &LlmConfig) -> Result<Box<dyn TextGenerator>> {
    if !config.enabled {
        return Err(AtlasError::Config("LLM integration is disabled".to_string()));
    }

    Ok(Box::new(OpenAiCompatibleProvider::new(config)?))
}

/// Chat-completions client for any OpenAI-compatible endpoint
pub struct OpenAiCompatibleProvider {
    model: String,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| AtlasError::Config(
                format!("API key required: set llm.api_key or {}", API_KEY_ENV)
            ))?;

        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            model: config.model.clone(),
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleProvider {
    async fn generate(&self, prompt: &str, max_output_tokens: usize, temperature: f32) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": max_output_tokens,
            "temperature": temperature
        });

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AtlasError::Generation(format!("Chat completion request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AtlasError::Generation(
                format!("Chat completion error {}: {}", status, error_text)
            ));
        }

        let response_data: serde_json::Value = response.json().await
            .map_err(|e| AtlasError::Generation(format!("Failed to parse chat completion: {}", e)))?;

        if let Some(usage) = response_data.get("usage") {
            debug!("Tokens used: {}", usage["total_tokens"]);
        }

        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AtlasError::Generation("Chat completion had no content".to_string()))?;

        Ok(strip_think_blocks(content))
    }

    fn provider_name(&self) -> &str {
        "OpenAI-compatible"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Drop `<think>...</think>` reasoning sections and surrounding whitespace.
pub fn strip_think_blocks(content: &str) -> String {
    match Regex::new(r"(?s)<think>.*?</think>") {
        Ok(re) => re.replace_all(content, "").trim().to_string(),
        Err(_) => content.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            enabled: true,
            model: "test-model".to_string(),
            api_key: Some("secret".to_string()),
            base_url: Some("http://localhost:8080/v1/".to_string()),
            max_prompt_tokens: 1000,
            max_output_tokens: 100,
        }
    }

    #[test]
    fn test_strip_think_blocks() {
        let reply = "<think>\nweighing options\n</think>\n{\"Engine\": \"aggregation\"}  ";
        assert_eq!(strip_think_blocks(reply), "{\"Engine\": \"aggregation\"}");
        assert_eq!(strip_think_blocks("a<think>x</think>b<think>y</think>c"), "abc");
    }

    #[test]
    fn test_disabled_config_is_rejected() {
        let mut config = config();
        config.enabled = false;
        assert!(matches!(create_generator(&config), Err(AtlasError::Config(_))));
    }

    #[test]
    fn test_endpoint_from_base_url() {
        let provider = OpenAiCompatibleProvider::new(&config()).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(provider.model_name(), "test-model");
    }
}
