use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::RelationshipsConfig;
use crate::core::llm::{TextGenerator, TokenBudget};
use crate::error::ClassificationFailure;
use super::{RelationshipKind, RelationshipMap, merge_segments};

/// Asks the text generator how a class relates to the rest of the project,
/// one segment at a time
#[derive(Clone)]
pub struct RelationshipClassifier {
    generator: Arc<dyn TextGenerator>,
    known_classes: Arc<BTreeSet<String>>,
    budget: TokenBudget,
    concurrency: usize,
    max_attempts: usize,
    temperature: f32,
}

impl RelationshipClassifier {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        known_classes: BTreeSet<String>,
        budget: TokenBudget,
        settings: &RelationshipsConfig,
    ) -> Self {
        Self {
            generator,
            known_classes: Arc::new(known_classes),
            budget,
            concurrency: settings.concurrency.max(1),
            max_attempts: settings.max_attempts.max(1),
            temperature: settings.temperature,
        }
    }

    pub fn build_prompt(class_name: &str, segment: &str) -> String {
        format!(
            r#"You are an expert in software analysis and UML class diagrams.
The following code is a whole Python class or a fragment of one, preceded by the imports of its file.
Identify the relationships this class has with other classes of the same project. Ignore classes
from external or well-known libraries.

Use only these three relationship types:
- "inheritance": the class explicitly inherits from the other class (key = the PARENT class)
- "aggregation": the class creates and keeps instances of the other class, e.g. in its constructor
- "association": the class uses or references the other class through attributes, methods or parameters

Examples:
`class Dog(Animal):` gives {{"Animal": "inheritance"}}
`class Car: def __init__(self, engine: Engine):` gives {{"Engine": "aggregation"}}

Return only a JSON object mapping class names to relationship types and nothing else.

Name of the current class: {class_name}

Python class code:
{segment}
"#
        )
    }

    /// Classify one segment, retrying unusable replies.
    pub async fn classify_segment(
        &self,
        class_name: &str,
        index: usize,
        segment: &str,
    ) -> Result<RelationshipMap, ClassificationFailure> {
        let prompt = Self::build_prompt(class_name, segment);
        let max_output = self.budget.allowed_output(&prompt);
        let mut reason = String::new();

        for attempt in 1..=self.max_attempts {
            let outcome = match self.generator.generate(&prompt, max_output, self.temperature).await {
                Ok(reply) => parse_relationship_response(&reply),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(mut relationships) => {
                    relationships.retain(|target, _| target != class_name && self.known_classes.contains(target));
                    debug!("Segment {} of {}: {} relationship(s)", index, class_name, relationships.len());
                    return Ok(relationships);
                }
                Err(e) => {
                    warn!("Segment {} of {} attempt {}/{}: {}", index, class_name, attempt, self.max_attempts, e);
                    reason = e;
                }
            }
        }

        Err(ClassificationFailure {
            class_name: class_name.to_string(),
            segment: index,
            attempts: self.max_attempts,
            reason,
        })
    }

    /// Classify every segment on a bounded pool, then merge the results.
    pub async fn classify_class(&self, class_name: &str, segments: Vec<String>) -> RelationshipMap {
        if segments.is_empty() {
            return RelationshipMap::new();
        }

        let workers = self.concurrency.min(segments.len());
        info!("Classifying {} segment(s) of {} with {} worker(s)", segments.len(), class_name, workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (index, segment) in segments.into_iter().enumerate() {
            let classifier = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let class_name = class_name.to_string();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| ClassificationFailure {
                    class_name: class_name.clone(),
                    segment: index,
                    attempts: 0,
                    reason: e.to_string(),
                })?;
                classifier.classify_segment(&class_name, index, &segment).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Segment task of {} panicked: {}", class_name, e),
            }
        }

        merge_segments(outcomes)
    }
}

/// Pull the outermost `{...}` object out of a reply and read it as
/// class -> relationship kind. The object is read as JSON5, so single quotes,
/// bare keys and trailing commas are accepted. Entries with an unknown kind
/// are dropped.
pub fn parse_relationship_response(reply: &str) -> Result<RelationshipMap, String> {
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        return Err("no JSON object in reply".to_string());
    };
    if start >= end {
        return Err("no JSON object in reply".to_string());
    }

    let raw: BTreeMap<String, serde_json::Value> = json5::from_str(&reply[start..=end])
        .map_err(|e| format!("invalid JSON object: {}", e))?;

    let mut relationships = RelationshipMap::new();
    for (target, value) in raw {
        match value.as_str().map(str::parse::<RelationshipKind>) {
            Some(Ok(kind)) => relationships.record(target, kind),
            _ => debug!("Ignoring relationship {} -> {}", target, value),
        }
    }
    Ok(relationships)
}
