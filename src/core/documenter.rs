// src/core/documenter.rs - Markdown documentation written by the text generator
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::{debug, info, warn};

use crate::config::DocsConfig;
use crate::error::Result;
use super::classes::{extract_classes, signature};
use super::importance::RankedClass;
use super::llm::{TextGenerator, TokenBudget};
use super::splitter::{AnalysisBlock, split_file};

const BLOCK_HEADER_TEMPLATE: &str = r#"# Documentation context

## File: `{{ path }}`

| Entity | Names |
|--------|-------|
| Classes | {% if classes %}{{ classes | join(sep=", ") }}{% else %}none{% endif %} |
| Functions | {% if functions %}{{ functions | join(sep=", ") }}{% else %}none{% endif %} |

## Line range

- Start: {{ start }}
- End: {{ end }}

---

# Generated documentation

"#;

/// Which prompt a block is documented with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// The block declares at least one class
    Classes,
    /// Module-level functions only
    Functions,
    /// Neither, e.g. imports and constants
    Code,
}

impl PromptKind {
    pub fn of(block: &AnalysisBlock) -> Self {
        if !block.classes.is_empty() {
            PromptKind::Classes
        } else if !block.functions.is_empty() {
            PromptKind::Functions
        } else {
            PromptKind::Code
        }
    }
}

/// One Markdown file to write, relative to the docs output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDocument {
    pub path: PathBuf,
    pub markdown: String,
}

/// What the README prompt knows about a project
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadmeFacts {
    pub pyproject: Option<String>,
    pub files: Vec<String>,
    pub total_lines: usize,
    pub total_classes: usize,
    pub entrypoints: Vec<String>,
    /// First line of the license file
    pub license: Option<String>,
}

impl ReadmeFacts {
    pub fn gather(root: &Path, files: &BTreeMap<String, String>, entrypoints: Vec<String>) -> Self {
        let pyproject = std::fs::read_to_string(root.join("pyproject.toml")).ok();
        let license = ["LICENSE", "LICENSE.txt"].iter()
            .find_map(|name| std::fs::read_to_string(root.join(name)).ok())
            .and_then(|text| text.lines().next().map(str::to_string));

        Self {
            pyproject,
            files: files.keys().cloned().collect(),
            total_lines: files.values().map(|text| text.matches('\n').count() + 1).sum(),
            total_classes: files.values().map(|text| extract_classes(text).len()).sum(),
            entrypoints,
            license,
        }
    }
}

/// Writes block documentation, a project README and descriptions of the
/// most important classes
pub struct Documenter {
    generator: Arc<dyn TextGenerator>,
    budget: TokenBudget,
    settings: DocsConfig,
}

impl Documenter {
    pub fn new(generator: Arc<dyn TextGenerator>, budget: TokenBudget, settings: &DocsConfig) -> Self {
        Self {
            generator,
            budget,
            settings: settings.clone(),
        }
    }

    pub fn block_prompt(kind: PromptKind, code: &str) -> String {
        let instructions = match kind {
            PromptKind::Classes => r###"Document the classes and functions of the following Python code.
Use exactly this structure for every class:

## <ClassName>
### Overview
One or two sentences on what the class is for.
### Attributes
A bullet list of attributes with their meaning.
### Methods
For every method: its purpose, parameters and return value.
### Use cases
A short usage example in a ```python block.
### Notes
Anything a maintainer should know, e.g. side effects or error handling.

Document module-level functions after the classes with the same Overview, Parameters and
Use cases headings. Finish with a "## Summary" section of at most three sentences."###,
            PromptKind::Functions => r###"Document the functions of the following Python code.
Use exactly this structure for every function:

## <function_name>
### Overview
One or two sentences on what the function does.
### Parameters
A bullet list of parameters with their types and meaning, then the return value.
### Use cases
A short usage example in a ```python block.
### Notes
Anything a maintainer should know, e.g. side effects or error handling.

Finish with a "## Summary" section of at most three sentences."###,
            PromptKind::Code => r#"Briefly describe what the following Python code does: its imports, constants
and top-level statements. Answer in at most one short paragraph of Markdown."#,
        };

        format!(
            "You are an expert technical writer documenting a Python project in Markdown.\n{}\n\nCode:\n```python\n{}\n```\n",
            instructions, code
        )
    }

    /// The Markdown header placed above a block's generated text
    pub fn context_header(path: &str, block: &AnalysisBlock) -> Result<String> {
        let mut context = Context::new();
        context.insert("path", path);
        context.insert("classes", &block.classes);
        context.insert("functions", &block.functions);
        context.insert("start", &(block.line_range.0 + 1));
        context.insert("end", &(block.line_range.1 + 1));
        Ok(Tera::one_off(BLOCK_HEADER_TEMPLATE, &context, false)?)
    }

    /// Header plus generated text. A failed generation leaves a note in the
    /// document instead of failing the run.
    pub async fn document_block(&self, path: &str, block: &AnalysisBlock) -> Result<String> {
        let header = Self::context_header(path, block)?;
        let prompt = Self::block_prompt(PromptKind::of(block), &block.text());
        let max_output = self.budget.allowed_output(&prompt);

        let body = match self.generator.generate(&prompt, max_output, self.settings.temperature).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Documentation of {} lines {}-{} failed: {}", path, block.line_range.0 + 1, block.line_range.1 + 1, e);
                format!("_Documentation could not be generated: {}_\n", e)
            }
        };
        Ok(header + &body)
    }

    /// Documents of one file. A file split into several blocks gets a
    /// `<stem>_docs` folder with one `_part<N>` document per block.
    pub async fn document_file(&self, path: &str, text: &str) -> Result<Vec<BlockDocument>> {
        let blocks = split_file(path, text, self.settings.max_block_length);
        let source = Path::new(path);
        let file_name = source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let parent = source.parent().map(Path::to_path_buf).unwrap_or_default();

        let folder = if blocks.len() > 1 {
            let stem = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            parent.join(format!("{}_docs", stem))
        } else {
            parent
        };

        let mut documents = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let suffix = if blocks.len() > 1 { format!("_part{}", index + 1) } else { String::new() };
            documents.push(BlockDocument {
                path: folder.join(format!("{}_doc{}.md", file_name, suffix)),
                markdown: self.document_block(path, block).await?,
            });
        }
        debug!("Documented {} in {} part(s)", path, documents.len());
        Ok(documents)
    }

    pub async fn document_files(&self, files: &BTreeMap<String, String>) -> Result<Vec<BlockDocument>> {
        let mut documents = Vec::new();
        for (path, text) in files {
            info!("Documenting {}", path);
            documents.extend(self.document_file(path, text).await?);
        }
        Ok(documents)
    }

    pub fn readme_prompt(facts: &ReadmeFacts) -> String {
        let files: String = facts.files.iter().map(|path| format!("- `{}`\n", path)).collect();
        let entrypoints = if facts.entrypoints.is_empty() {
            "No entrypoint scripts".to_string()
        } else {
            facts.entrypoints.join(", ")
        };

        format!(
            r#"You are a technical writer producing clear, user-friendly README files for Python projects.
Using the information below, write a well-structured README.md in Markdown. Give a concise
overview of what the project is, what it is used for and how to get started with it.

## pyproject.toml content
{pyproject}

## File structure
{files}
## Code metrics
- Python files: **{file_count}**
- Lines of code: **{lines}**
- Classes: **{classes}**

## Entrypoints
{entrypoints}

## License
{license}
"#,
            pyproject = facts.pyproject.as_deref().unwrap_or("No pyproject.toml found."),
            files = files,
            file_count = facts.files.len(),
            lines = facts.total_lines,
            classes = facts.total_classes,
            entrypoints = entrypoints,
            license = facts.license.as_deref().unwrap_or("No LICENSE file"),
        )
    }

    pub async fn readme(&self, facts: &ReadmeFacts) -> Result<String> {
        let prompt = Self::readme_prompt(facts);
        let max_output = self.budget.allowed_output(&prompt);
        self.generator.generate(&prompt, max_output, self.settings.readme_temperature).await
    }

    pub fn class_prompt(class: &RankedClass) -> String {
        let methods: String = signature(&class.source).methods.iter()
            .map(|method| format!("- {}\n", method.name))
            .collect();
        let methods = if methods.is_empty() { "- none\n".to_string() } else { methods };

        format!(
            r#"You are an expert in software code analysis.
Analyze the following class:

# {name} (Index: {importance:.4})

**File:** {file}

### Methods
{methods}
### Metrics
- Methods defined: {method_count}
- Classes depending on this class (in-degree): {dependents}
  (0 means no other project class uses it, although it may depend on others)
- Complexity and size are already part of the index

Based on its methods, calls and dependents, explain why this class matters.
The answer must follow this template exactly:

# {name}

## Description
- One or two sentences on the main functionality of the class

## Usage
```python
# Example of basic use of the class
```

## Importance
- Why the class is important for the project
"#,
            name = class.name,
            importance = class.importance,
            file = class.file,
            methods = methods,
            method_count = class.metrics.methods,
            dependents = class.dependents,
        )
    }

    /// One Markdown document describing every ranked class, in rank order
    pub async fn describe_classes(&self, classes: &[RankedClass]) -> Result<String> {
        let mut markdown = String::new();
        for class in classes {
            let prompt = Self::class_prompt(class);
            let max_output = self.budget.allowed_output(&prompt);
            let description = self.generator.generate(&prompt, max_output, self.settings.class_temperature).await?;
            info!("Described {} ({})", class.name, class.file);
            markdown.push_str(description.trim());
            markdown.push_str("\n\n");
        }
        Ok(markdown)
    }
}

/// Write documents under `output_dir`, creating folders as needed
pub fn write_documents(output_dir: &Path, documents: &[BlockDocument]) -> Result<()> {
    for document in documents {
        let target = output_dir.join(&document.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &document.markdown)?;
        debug!("Wrote {}", target.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use crate::error::AtlasError;
    use crate::core::importance::rank_classes;
    use crate::core::dependency_graph::build_graph;

    /// Replies with a fixed text and keeps every prompt it was sent
    struct RecordingGenerator {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self { reply, prompts: Mutex::new(Vec::new()) })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str, _max_output_tokens: usize, _temperature: f32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }

        fn provider_name(&self) -> &str {
            "recording"
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str, _max_output_tokens: usize, _temperature: f32) -> Result<String> {
            Err(AtlasError::Generation("rate limited".to_string()))
        }

        fn provider_name(&self) -> &str {
            "failing"
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn documenter(generator: Arc<dyn TextGenerator>, max_block_length: usize) -> Documenter {
        let settings = DocsConfig { max_block_length, ..DocsConfig::default() };
        Documenter::new(generator, TokenBudget::new(28000, 3500), &settings)
    }

    const ZOO: &str = "import os\n\n\nclass Animal:\n    def speak(self):\n        pass\n\n\ndef feed(animal):\n    return animal\n";

    #[test]
    fn test_prompt_kind_follows_block_contents() {
        let blocks = split_file("zoo.py", ZOO, 4);
        let kinds: Vec<PromptKind> = blocks.iter().map(PromptKind::of).collect();
        assert_eq!(kinds, vec![PromptKind::Classes, PromptKind::Functions]);

        let constants = split_file("settings.py", "import os\n\nDEBUG = True\n", 750);
        assert_eq!(PromptKind::of(&constants[0]), PromptKind::Code);
    }

    #[test]
    fn test_class_only_block_uses_class_prompt() {
        let blocks = split_file("zoo.py", "class Animal:\n    pass\n", 750);
        assert_eq!(PromptKind::of(&blocks[0]), PromptKind::Classes);
    }

    #[test]
    fn test_context_header_lists_entities() {
        let blocks = split_file("zoo/animal.py", ZOO, 750);
        let header = Documenter::context_header("zoo/animal.py", &blocks[0]).unwrap();
        assert!(header.contains("## File: `zoo/animal.py`"));
        assert!(header.contains("| Classes | Animal |"));
        assert!(header.contains("| Functions | feed |"));
        assert!(header.contains("- Start: 1"));
    }

    #[tokio::test]
    async fn test_single_block_file_is_one_document() {
        let generator = RecordingGenerator::new("Animal speaks.");
        let docs = documenter(generator.clone(), 750);

        let documents = docs.document_file("zoo/animal.py", ZOO).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].path, PathBuf::from("zoo/animal.py_doc.md"));
        assert!(documents[0].markdown.ends_with("Animal speaks."));
        assert!(generator.prompts()[0].contains("## <ClassName>"));
    }

    #[tokio::test]
    async fn test_split_file_gets_parts_folder() {
        let generator = RecordingGenerator::new("text");
        let docs = documenter(generator.clone(), 4);

        let documents = docs.document_file("zoo/animal.py", ZOO).await.unwrap();
        assert!(documents.len() > 1);
        assert_eq!(documents[0].path, PathBuf::from("zoo/animal_docs/animal.py_doc_part1.md"));
        assert_eq!(documents[1].path, PathBuf::from("zoo/animal_docs/animal.py_doc_part2.md"));
        assert_eq!(generator.prompts().len(), documents.len());
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_a_note() {
        let docs = documenter(Arc::new(FailingGenerator), 750);
        let documents = docs.document_file("feed.py", "def feed():\n    pass\n").await.unwrap();
        assert!(documents[0].markdown.contains("_Documentation could not be generated: Text generation error: rate limited_"));
    }

    #[tokio::test]
    async fn test_readme_prompt_carries_facts() {
        let temp = assert_fs::TempDir::new().unwrap();
        std::fs::write(temp.path().join("LICENSE"), "MIT License\n\nCopyright\n").unwrap();
        let files: BTreeMap<String, String> = [("zoo/animal.py".to_string(), ZOO.to_string())].into_iter().collect();

        let facts = ReadmeFacts::gather(temp.path(), &files, vec!["cli.py".to_string()]);
        assert_eq!(facts.total_lines, 11);
        assert_eq!(facts.total_classes, 1);
        assert_eq!(facts.license.as_deref(), Some("MIT License"));
        assert!(facts.pyproject.is_none());

        let generator = RecordingGenerator::new("# Zoo");
        let readme = documenter(generator.clone(), 750).readme(&facts).await.unwrap();
        assert_eq!(readme, "# Zoo");
        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("- `zoo/animal.py`"));
        assert!(prompt.contains("No pyproject.toml found."));
        assert!(prompt.contains("cli.py"));
    }

    #[tokio::test]
    async fn test_describe_classes_in_rank_order() {
        let files: BTreeMap<String, String> = [
            ("zoo/animal.py", "class Animal:\n    def speak(self):\n        pass\n"),
            ("zoo/dog.py", "class Dog(Animal):\n    def speak(self):\n        return 'woof'\n    def fetch(self):\n        pass\n"),
        ]
        .iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect();
        let ranked = rank_classes(&files, &build_graph(&files), 2, true);

        let generator = RecordingGenerator::new("  # Described  ");
        let markdown = documenter(generator.clone(), 750).describe_classes(&ranked).await.unwrap();
        assert_eq!(markdown, "# Described\n\n# Described\n\n");

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains(&format!("# {} (Index:", ranked[0].name)));
        let dog = prompts.iter().find(|p| p.contains("# Dog (Index:")).unwrap();
        assert!(dog.contains("- speak\n- fetch\n"));
    }

    #[test]
    fn test_write_documents_creates_folders() {
        let temp = assert_fs::TempDir::new().unwrap();
        let documents = vec![BlockDocument {
            path: PathBuf::from("zoo/animal_docs/animal.py_doc_part1.md"),
            markdown: "# part".to_string(),
        }];
        write_documents(temp.path(), &documents).unwrap();
        let written = std::fs::read_to_string(temp.path().join("zoo/animal_docs/animal.py_doc_part1.md")).unwrap();
        assert_eq!(written, "# part");
    }
}
