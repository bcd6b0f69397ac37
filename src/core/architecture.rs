// src/core/architecture.rs - architecture label from project metadata
use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use super::heuristics::RepositoryHeuristics;
use super::llm::{TextGenerator, TokenBudget};

/// The architecture a project most likely follows, with the reasoning behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureVerdict {
    /// `None` when the reply could not be read as a verdict
    pub architecture: Option<String>,
    pub justification: String,
}

/// Labels a project's architecture from its module list and heuristics
pub struct ArchitectureRecognizer {
    generator: Arc<dyn TextGenerator>,
    budget: TokenBudget,
    temperature: f32,
}

impl ArchitectureRecognizer {
    pub fn new(generator: Arc<dyn TextGenerator>, budget: TokenBudget, temperature: f32) -> Self {
        Self { generator, budget, temperature }
    }

    pub fn build_prompt(modules: &[String], heuristics: &RepositoryHeuristics) -> Result<String> {
        let modules = serde_json::to_string_pretty(modules)?;
        let heuristics = serde_json::to_string_pretty(heuristics)?;

        Ok(format!(
            r#"You are a senior software architect.
Based on the module list and heuristics of a Python project below, decide which architectural
pattern the project follows.

Guidelines:
- Microservices: several Dockerfiles or docker-compose services, each with its own entrypoint
- Event-Driven: message brokers, event handlers or publish/subscribe modules
- Plugin: a core with dynamically loaded extensions or a plugins package
- Hexagonal: ports and adapters, a domain package isolated from infrastructure
- Layered: presentation, service and data access packages stacked on each other
- CQRS: separate command and query packages or models
- Modular Monolith: one deployable unit split into well separated feature modules
- Monolithic: one deployable unit without clear module boundaries
- Client-Server: a server package and a client package talking over a protocol
Be careful with libraries and frameworks: a reusable package without a deployable entrypoint is a
Library/Framework, not an application architecture.

Modules:
{modules}

Heuristics:
{heuristics}

Return only a JSON object of the form
{{"architecture": "<pattern name>", "justification": "<two or three sentences>"}}
"#
        ))
    }

    pub async fn recognize(&self, modules: &[String], heuristics: &RepositoryHeuristics) -> Result<ArchitectureVerdict> {
        let prompt = Self::build_prompt(modules, heuristics)?;
        let max_output = self.budget.allowed_output(&prompt);
        debug!("Architecture prompt: {} chars, {} reply tokens", prompt.len(), max_output);

        let reply = self.generator.generate(&prompt, max_output, self.temperature).await?;
        let verdict = parse_verdict(&reply);
        match &verdict.architecture {
            Some(architecture) => info!("Recognized architecture: {}", architecture),
            None => warn!("Architecture reply was not a verdict object"),
        }
        Ok(verdict)
    }
}

/// Read the first `{...}` span of a reply as a verdict. Anything else keeps
/// the whole reply as the justification.
pub fn parse_verdict(reply: &str) -> ArchitectureVerdict {
    let object = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            json5::from_str::<BTreeMap<String, serde_json::Value>>(&reply[start..=end]).ok()
        }
        _ => None,
    };

    let text = |object: &BTreeMap<String, serde_json::Value>, key: &str| {
        object.get(key).and_then(serde_json::Value::as_str).map(|s| s.trim().to_string())
    };

    match object {
        Some(object) if text(&object, "architecture").is_some() => ArchitectureVerdict {
            architecture: text(&object, "architecture"),
            justification: text(&object, "justification").unwrap_or_default(),
        },
        _ => ArchitectureVerdict {
            architecture: None,
            justification: reply.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str, _max_output_tokens: usize, _temperature: f32) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_prompt_carries_modules_and_heuristics() {
        let heuristics = RepositoryHeuristics {
            entrypoints: vec!["manage.py".to_string()],
            compose_services: vec!["api".to_string()],
            ..Default::default()
        };
        let prompt = ArchitectureRecognizer::build_prompt(&["billing".to_string(), "users".to_string()], &heuristics).unwrap();
        assert!(prompt.contains("\"billing\""));
        assert!(prompt.contains("\"manage.py\""));
        assert!(prompt.contains("\"compose_services\""));
        assert!(prompt.contains("Library/Framework"));
    }

    #[test]
    fn test_parse_verdict_object() {
        let verdict = parse_verdict("Sure!\n{\"architecture\": \"Layered\", \"justification\": \"Views call services.\"}");
        assert_eq!(verdict.architecture.as_deref(), Some("Layered"));
        assert_eq!(verdict.justification, "Views call services.");

        let relaxed = parse_verdict("{architecture: 'Plugin',}");
        assert_eq!(relaxed.architecture.as_deref(), Some("Plugin"));
        assert_eq!(relaxed.justification, "");
    }

    #[test]
    fn test_parse_verdict_falls_back_to_raw_text() {
        let verdict = parse_verdict("  Looks like a monolith.  ");
        assert_eq!(verdict.architecture, None);
        assert_eq!(verdict.justification, "Looks like a monolith.");

        let unlabeled = parse_verdict("{\"justification\": \"unsure\"}");
        assert_eq!(unlabeled.architecture, None);
        assert_eq!(unlabeled.justification, "{\"justification\": \"unsure\"}");
    }

    #[tokio::test]
    async fn test_recognize_uses_generator() {
        let recognizer = ArchitectureRecognizer::new(
            Arc::new(FixedGenerator(r#"{"architecture": "Microservices", "justification": "Two services."}"#)),
            TokenBudget::new(28000, 3500),
            0.1,
        );
        let verdict = recognizer.recognize(&["api".to_string()], &RepositoryHeuristics::default()).await.unwrap();
        assert_eq!(verdict.architecture.as_deref(), Some("Microservices"));
    }
}
