use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ProjectConfig;
use crate::error::{AtlasError, Result};
use super::languages::is_python_path;

/// Source of the file snapshot one analysis run works on
pub trait RepositoryReader: Send + Sync {
    /// Relative path -> file text
    fn read_files(&self) -> Result<BTreeMap<String, String>>;
}

/// A source file with its content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the project root, `/`-separated
    pub path: String,

    pub text: String,

    /// SHA-256 of the text, hex encoded
    pub content_hash: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            content_hash: content_hash(&text),
            text,
        }
    }
}

/// Calculate SHA256 hash of content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Reads the Python files of a local checkout
pub struct DirectoryReader {
    root: PathBuf,
    ignore_patterns: Vec<String>,
    max_file_size: usize,
}

impl DirectoryReader {
    pub fn new<P: AsRef<Path>>(root: P, ignore_patterns: Vec<String>, max_file_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ignore_patterns,
            max_file_size,
        }
    }

    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(&config.source_dir, config.ignore_patterns.clone(), config.max_file_size)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the checkout and read every eligible `.py` file, sorted by path.
    pub fn read_sources(&self) -> Result<Vec<SourceFile>> {
        let mut sources = Vec::new();
        for entry in self.walk()? {
            let path = entry.path();
            let relative = self.relative_path(path);
            if !is_python_path(&relative) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len() as usize).unwrap_or(0);
            if size > self.max_file_size {
                debug!("Skipping {} ({} bytes exceeds limit)", relative, size);
                continue;
            }

            match std::fs::read_to_string(path) {
                Ok(text) => sources.push(SourceFile::new(relative, text)),
                Err(e) => warn!("Skipping unreadable file {}: {}", relative, e),
            }
        }

        sources.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Read {} Python files from {}", sources.len(), self.root.display());
        Ok(sources)
    }

    /// Relative paths of every file the walk visits, whatever the language
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files: Vec<String> = self.walk()?
            .iter()
            .map(|entry| self.relative_path(entry.path()))
            .collect();
        files.sort();
        Ok(files)
    }

    fn walk(&self) -> Result<Vec<ignore::DirEntry>> {
        if !self.root.is_dir() {
            return Err(AtlasError::FileSystem(
                format!("Source directory {} does not exist", self.root.display())
            ));
        }

        let mut overrides = OverrideBuilder::new(&self.root);
        for pattern in &self.ignore_patterns {
            overrides.add(&format!("!{}", pattern))
                .map_err(|e| AtlasError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
        }
        let overrides = overrides.build()
            .map_err(|e| AtlasError::Config(e.to_string()))?;

        // Use ignore crate to respect .gitignore and custom patterns
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .overrides(overrides)
            .build();

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| AtlasError::FileSystem(e.to_string()))?;
            if entry.path().is_file() {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

impl RepositoryReader for DirectoryReader {
    fn read_files(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read_sources()?
            .into_iter()
            .map(|source| (source.path, source.text))
            .collect())
    }
}

/// A fixed in-memory snapshot
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: BTreeMap<String, String>,
}

impl MemoryReader {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }
}

impl RepositoryReader for MemoryReader {
    fn read_files(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.files.clone())
    }
}
