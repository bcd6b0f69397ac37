use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether the text-generation collaborator is used at all
    pub enabled: bool,

    /// Model name passed to the chat-completions endpoint
    pub model: String,

    /// API key (falls back to the PYATLAS_API_KEY environment variable)
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    pub base_url: Option<String>,

    /// Total token window shared by prompt and reply
    pub max_prompt_tokens: usize,

    /// Upper bound on tokens requested for one reply
    pub max_output_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Block and segment sizing
    pub splitting: SplittingConfig,

    /// Module-level graph aggregation
    pub modules: ModulesConfig,

    /// Important class ranking
    pub importance: ImportanceConfig,

    /// Relationship classification and merging
    pub relationships: RelationshipsConfig,

    /// LLM integration settings
    pub llm: LlmConfig,

    /// Architecture recognition
    #[serde(default)]
    pub architecture: ArchitectureConfig,

    /// Generated Markdown documentation
    #[serde(default)]
    pub docs: DocsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Checkout to analyze
    pub source_dir: PathBuf,

    /// Glob patterns excluded from analysis
    pub ignore_patterns: Vec<String>,

    /// Maximum file size to read (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplittingConfig {
    /// Target number of lines per analysis block
    pub max_block_length: usize,

    /// Maximum lines per class segment sent for relationship classification
    pub segment_max_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Number of leading directory segments forming a module key
    pub group_levels: usize,

    /// Modules kept before the rest collapse into "other"
    pub max_modules: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceConfig {
    /// How many classes the ranking keeps
    pub top_classes: usize,

    /// Skip files that look like tests
    pub exclude_tests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipsConfig {
    /// Worker pool size for segment classification
    pub concurrency: usize,

    /// Attempts per segment before it is dropped from the merge
    pub max_attempts: usize,

    /// Sampling temperature for classification prompts
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureConfig {
    /// Directory depth of the module list sent for recognition
    pub group_levels: usize,

    /// Modules kept in that list
    pub max_modules: usize,

    pub temperature: f32,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            group_levels: 8,
            max_modules: 300,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// Where block documentation, README and class descriptions are written
    pub output_dir: PathBuf,

    /// Target number of lines per documented block
    pub max_block_length: usize,

    /// Sampling temperature for block documentation
    pub temperature: f32,

    pub readme_temperature: f32,

    /// Sampling temperature for important class descriptions
    pub class_temperature: f32,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_docs"),
            max_block_length: 750,
            temperature: 0.0,
            readme_temperature: 0.7,
            class_temperature: 0.2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                source_dir: PathBuf::from("."),
                ignore_patterns: vec![
                    ".git/".to_string(),
                    "venv/".to_string(),
                    ".venv/".to_string(),
                    "__pycache__/".to_string(),
                ],
                max_file_size: 1024 * 1024, // 1MB
            },
            splitting: SplittingConfig {
                max_block_length: 400,
                segment_max_lines: 2500,
            },
            modules: ModulesConfig {
                group_levels: 1,
                max_modules: 10000,
            },
            importance: ImportanceConfig {
                top_classes: 10,
                exclude_tests: true,
            },
            relationships: RelationshipsConfig {
                concurrency: 5,
                max_attempts: 5,
                temperature: 0.0,
            },
            llm: LlmConfig {
                enabled: false,
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                base_url: None,
                max_prompt_tokens: 28000,
                max_output_tokens: 3500,
            },
            architecture: ArchitectureConfig::default(),
            docs: DocsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AtlasError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AtlasError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                let candidates = ["Pyatlas.toml", "pyatlas.toml", ".pyatlas.toml"];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.splitting.max_block_length == 0 {
            return Err(AtlasError::Config("splitting.max_block_length must be at least 1".to_string()));
        }
        if self.splitting.segment_max_lines == 0 {
            return Err(AtlasError::Config("splitting.segment_max_lines must be at least 1".to_string()));
        }
        if self.docs.max_block_length == 0 {
            return Err(AtlasError::Config("docs.max_block_length must be at least 1".to_string()));
        }
        if self.relationships.concurrency == 0 {
            return Err(AtlasError::Config("relationships.concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}
