// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context as _, Result};
use serde::Serialize;
use tracing::{info, warn, debug};

use crate::config::Config;
use super::{
    AnalysisBlock, AnalysisContext, AnalysisReport, ArchitectureRecognizer, ArchitectureVerdict,
    ClassDiagram, DirectoryReader, Documenter, ModuleGraph, RankedClass, ReadmeFacts,
    RelationshipClassifier, RelationshipMap, RepositoryHeuristics, TextGenerator, TokenBudget,
    DependencyGraph, collect_heuristics, group_modules, method_callers_diagram, segment_class,
    signature, split_file, write_documents,
};

/// Main orchestration engine for pyatlas
pub struct Engine {
    config: Config,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Engine {
    /// Create a new engine instance from a configuration file (or defaults)
    pub async fn new(config_path: Option<&Path>, source_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::load_or_default(config_path)?;
        if let Some(source_dir) = source_dir {
            config.project.source_dir = source_dir;
        }

        debug!("Loaded configuration: {:?}", config);
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: Config) -> Self {
        // Initialize the text generator if enabled
        let generator: Option<Arc<dyn TextGenerator>> = if config.llm.enabled {
            match super::llm::create_generator(&config.llm) {
                Ok(generator) => {
                    info!("Text generation enabled: {} ({})", generator.provider_name(), generator.model_name());
                    Some(Arc::from(generator))
                }
                Err(e) => {
                    warn!("Failed to initialize text generator: {}", e);
                    warn!("Continuing without relationship classification");
                    None
                }
            }
        } else {
            debug!("Text generation disabled");
            None
        };

        Self { config, generator }
    }

    /// Swap in a different text generator
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let target = path.unwrap_or_else(|| PathBuf::from("pyatlas.toml"));
        if target.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
        }
        Config::default().save(&target)?;
        info!("Wrote default configuration to {}", target.display());
        Ok(())
    }

    fn context(&self) -> Result<AnalysisContext> {
        let reader = DirectoryReader::from_config(&self.config.project);
        info!("Reading sources from {}", reader.root().display());
        Ok(AnalysisContext::from_reader(&reader)?)
    }

    /// Blocks of a single file
    pub fn split(&self, file: &Path) -> Result<Vec<AnalysisBlock>> {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let blocks = split_file(&file.to_string_lossy(), &text, self.config.splitting.max_block_length);
        info!("Split {} into {} block(s)", file.display(), blocks.len());
        Ok(blocks)
    }

    pub fn graph(&self) -> Result<DependencyGraph> {
        Ok(self.context()?.graph().clone())
    }

    pub fn modules(&self) -> Result<ModuleGraph> {
        let modules = &self.config.modules;
        Ok(self.context()?.module_graph(modules.group_levels, modules.max_modules))
    }

    pub fn rank(&self) -> Result<Vec<RankedClass>> {
        let importance = &self.config.importance;
        Ok(self.context()?.rank(importance.top_classes, importance.exclude_tests))
    }

    pub fn analyze(&self) -> Result<AnalysisReport> {
        let report = self.context()?.report(&self.config);
        info!(
            "Analysis complete: {} files, {} classes, {} modules",
            report.files.len(),
            report.graph.node_count(),
            report.modules.nodes.len()
        );
        Ok(report)
    }

    /// Relationships of one class to the other classes of the project
    pub async fn relationships(&self, class_name: &str) -> Result<RelationshipMap> {
        let context = self.context()?;
        let classifier = self.classifier(&context)?;
        let class = context.find_class(class_name)
            .with_context(|| format!("Class {} not found", class_name))?;
        Ok(self.classify(&context, &classifier, class_name, &class.source, &class.file).await)
    }

    /// PlantUML class diagram of the ranked classes. Without a text generator
    /// the diagram has class boxes only.
    pub async fn diagram(&self) -> Result<String> {
        let context = self.context()?;
        let classifier = match self.classifier(&context) {
            Ok(classifier) => Some(classifier),
            Err(e) => {
                warn!("Rendering diagram without relationships: {}", e);
                None
            }
        };

        let importance = &self.config.importance;
        let mut diagram = ClassDiagram::new();
        for ranked in context.rank(importance.top_classes, importance.exclude_tests) {
            let relationships = match &classifier {
                Some(classifier) => {
                    self.classify(&context, classifier, &ranked.name, &ranked.source, &ranked.file).await
                }
                None => RelationshipMap::new(),
            };
            diagram.add_class(&signature(&ranked.source), &relationships);
        }

        Ok(diagram.render()?)
    }

    /// PlantUML diagram of the classes calling `class_name.method_name`
    pub fn callers(&self, class_name: &str, method_name: &str) -> Result<String> {
        let context = self.context()?;
        Ok(method_callers_diagram(context.files(), class_name, method_name)?)
    }

    /// Deployment and packaging signals of the checkout
    pub fn heuristics(&self) -> Result<RepositoryHeuristics> {
        let reader = DirectoryReader::from_config(&self.config.project);
        Ok(collect_heuristics(&reader)?)
    }

    /// Architecture label from the module list and heuristics
    pub async fn architecture(&self) -> Result<ArchitectureVerdict> {
        let generator = self.generator("Architecture recognition")?;
        let context = self.context()?;
        let settings = &self.config.architecture;

        let modules = group_modules(context.files(), context.graph(), settings.group_levels, settings.max_modules);
        let heuristics = self.heuristics()?;
        info!("Recognizing architecture from {} module(s)", modules.len());

        let recognizer = ArchitectureRecognizer::new(generator, TokenBudget::from_config(&self.config.llm), settings.temperature);
        Ok(recognizer.recognize(&modules, &heuristics).await?)
    }

    /// Write block documentation for every file plus a README into
    /// `output_dir` (defaults to `docs.output_dir`). Returns the written paths.
    pub async fn docs(&self, output_dir: Option<PathBuf>) -> Result<Vec<PathBuf>> {
        let documenter = self.documenter()?;
        let context = self.context()?;
        let output_dir = output_dir.unwrap_or_else(|| self.config.docs.output_dir.clone());

        let documents = documenter.document_files(context.files()).await?;
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        write_documents(&output_dir, &documents)?;

        let entrypoints = self.heuristics()?.entrypoints;
        let facts = ReadmeFacts::gather(&self.config.project.source_dir, context.files(), entrypoints);
        let readme = documenter.readme(&facts).await?;
        let readme_path = output_dir.join("README.md");
        std::fs::write(&readme_path, readme)
            .with_context(|| format!("Failed to write {}", readme_path.display()))?;

        let mut written: Vec<PathBuf> = documents.iter().map(|doc| output_dir.join(&doc.path)).collect();
        written.push(readme_path);
        info!("Wrote {} document(s) to {}", written.len(), output_dir.display());
        Ok(written)
    }

    /// Markdown descriptions of the ranked classes
    pub async fn describe(&self) -> Result<String> {
        let documenter = self.documenter()?;
        let importance = &self.config.importance;
        let ranked = self.context()?.rank(importance.top_classes, importance.exclude_tests);
        Ok(documenter.describe_classes(&ranked).await?)
    }

    fn generator(&self, purpose: &str) -> Result<Arc<dyn TextGenerator>> {
        self.generator.clone()
            .with_context(|| format!("{} needs [llm] enabled = true", purpose))
    }

    fn documenter(&self) -> Result<Documenter> {
        Ok(Documenter::new(
            self.generator("Documentation")?,
            TokenBudget::from_config(&self.config.llm),
            &self.config.docs,
        ))
    }

    fn classifier(&self, context: &AnalysisContext) -> Result<RelationshipClassifier> {
        let generator = self.generator("Relationship classification")?;

        Ok(RelationshipClassifier::new(
            generator,
            context.known_classes(),
            TokenBudget::from_config(&self.config.llm),
            &self.config.relationships,
        ))
    }

    /// Classify one class declaration. `file` is the path that declares it,
    /// whose imports prefix every segment.
    async fn classify(
        &self,
        context: &AnalysisContext,
        classifier: &RelationshipClassifier,
        class_name: &str,
        class_source: &str,
        file: &str,
    ) -> RelationshipMap {
        let file_source = context.files().get(file).map(String::as_str).unwrap_or_default();

        let segments = segment_class(class_source, file_source, self.config.splitting.segment_max_lines);
        let relationships = classifier.classify_class(class_name, segments).await;
        info!("{} ({}): {} relationship(s)", class_name, file, relationships.len());
        relationships
    }

    /// Write a value as pretty JSON to a file, or stdout when no file is given
    pub fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        Self::emit_text(&json, output)
    }

    pub fn emit_text(text: &str, output: Option<&Path>) -> Result<()> {
        match output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {}", path.display());
            }
            None => println!("{}", text),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::core::RelationshipKind;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str, _max_output_tokens: usize, _temperature: f32) -> crate::error::Result<String> {
            Ok(self.0.to_string())
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Answers from what the prompt contains
    struct SegmentAwareGenerator;

    #[async_trait]
    impl TextGenerator for SegmentAwareGenerator {
        async fn generate(&self, prompt: &str, _max_output_tokens: usize, _temperature: f32) -> crate::error::Result<String> {
            if prompt.contains("return Cache()") {
                Ok(r#"{"Cache": "aggregation"}"#.to_string())
            } else {
                Ok(r#"{"Cache": "association"}"#.to_string())
            }
        }

        fn provider_name(&self) -> &str {
            "segment-aware"
        }

        fn model_name(&self) -> &str {
            "segment-aware"
        }
    }

    fn project() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("zoo")).unwrap();
        std::fs::write(dir.path().join("zoo/animal.py"), "class Animal:\n    def speak(self):\n        pass\n").unwrap();
        std::fs::write(
            dir.path().join("zoo/dog.py"),
            "from zoo.animal import Animal\n\nclass Dog(Animal):\n    def speak(self):\n        return 'woof'\n",
        ).unwrap();

        let mut config = Config::default();
        config.project.source_dir = dir.path().to_path_buf();
        (dir, config)
    }

    #[tokio::test]
    async fn test_relationships_require_generator() {
        let (_dir, config) = project();
        let engine = Engine::with_config(config);
        assert!(engine.relationships("Dog").await.is_err());
    }

    #[tokio::test]
    async fn test_relationships_with_generator() {
        let (_dir, config) = project();
        let engine = Engine::with_config(config)
            .with_generator(Arc::new(FixedGenerator(r#"{"Animal": "inheritance", "Dog": "association"}"#)));

        let relationships = engine.relationships("Dog").await.unwrap();
        assert_eq!(relationships.get("Animal"), Some(RelationshipKind::Inheritance));
        assert_eq!(relationships.len(), 1);

        let diagram = engine.diagram().await.unwrap();
        assert!(diagram.contains("Animal <|-- Dog : inheritance"));
    }

    #[tokio::test]
    async fn test_diagram_classifies_the_ranked_declaration() {
        let dir = tempfile::tempdir().unwrap();
        for (path, source) in [
            ("a/cache.py", "class Cache:\n    pass\n"),
            ("a/store.py", "class Store:\n    def load(self):\n        if self.ready:\n            return Cache()\n        return None\n"),
            ("z/store.py", "class Store:\n    pass\n"),
        ] {
            let target = dir.path().join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, source).unwrap();
        }

        let mut config = Config::default();
        config.project.source_dir = dir.path().to_path_buf();
        config.importance.top_classes = 1;
        let engine = Engine::with_config(config).with_generator(Arc::new(SegmentAwareGenerator));

        // The lookup by name resolves to the last declaration in path order
        let looked_up = engine.relationships("Store").await.unwrap();
        assert_eq!(looked_up.get("Cache"), Some(RelationshipKind::Association));

        // The diagram uses the top-ranked declaration's own source
        let diagram = engine.diagram().await.unwrap();
        assert!(diagram.contains("Store o-- Cache : aggregation"));
        assert!(!diagram.contains("association"));
    }

    #[test]
    fn test_heuristics_of_project() {
        let (dir, config) = project();
        std::fs::write(dir.path().join("cli.py"), "def main():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "attrs\n").unwrap();

        let heuristics = Engine::with_config(config).heuristics().unwrap();
        assert_eq!(heuristics.entrypoints, vec!["cli.py"]);
        assert_eq!(heuristics.dependencies, vec!["attrs"]);
    }

    #[tokio::test]
    async fn test_architecture_with_generator() {
        let (_dir, config) = project();
        assert!(Engine::with_config(config.clone()).architecture().await.is_err());

        let engine = Engine::with_config(config)
            .with_generator(Arc::new(FixedGenerator(r#"{"architecture": "Monolithic", "justification": "One package."}"#)));
        let verdict = engine.architecture().await.unwrap();
        assert_eq!(verdict.architecture.as_deref(), Some("Monolithic"));
        assert_eq!(verdict.justification, "One package.");
    }

    #[tokio::test]
    async fn test_docs_writes_blocks_and_readme() {
        let (dir, config) = project();
        let out = dir.path().join("out");
        let engine = Engine::with_config(config).with_generator(Arc::new(FixedGenerator("Generated.")));

        let written = engine.docs(Some(out.clone())).await.unwrap();
        assert_eq!(written.len(), 3);
        assert!(out.join("zoo/animal.py_doc.md").is_file());
        assert!(out.join("zoo/dog.py_doc.md").is_file());
        assert_eq!(std::fs::read_to_string(out.join("README.md")).unwrap(), "Generated.");

        let dog = std::fs::read_to_string(out.join("zoo/dog.py_doc.md")).unwrap();
        assert!(dog.contains("| Classes | Dog |"));
        assert!(dog.ends_with("Generated."));
    }

    #[tokio::test]
    async fn test_describe_ranked_classes() {
        let (_dir, config) = project();
        let engine = Engine::with_config(config).with_generator(Arc::new(FixedGenerator("# Class")));
        let markdown = engine.describe().await.unwrap();
        assert_eq!(markdown, "# Class\n\n# Class\n\n");
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let (dir, config) = project();
        let engine = Engine::with_config(config);
        let target = dir.path().join("pyatlas.toml");

        engine.init(Some(target.clone()), false).await.unwrap();
        assert!(Config::load(&target).is_ok());
        assert!(engine.init(Some(target.clone()), false).await.is_err());
        assert!(engine.init(Some(target), true).await.is_ok());
    }

    #[test]
    fn test_emit_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/graph.json");
        Engine::emit_json(&vec!["Animal"], Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "[\n  \"Animal\"\n]");
    }
}
