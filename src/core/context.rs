// src/core/context.rs - per-run analysis state
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use super::classes::{ClassFact, class_facts};
use super::dependency_graph::{DependencyGraph, build_graph, known_classes};
use super::importance::{RankedClass, importance_scores, rank_classes};
use super::languages::is_python_path;
use super::modules::{ModuleAggregator, ModuleGraph};
use super::reader::{RepositoryReader, content_hash};
use super::splitter::{AnalysisBlock, split_file};

/// One analysis run: an immutable file snapshot and the class graph built
/// from it. Everything derived later reads from here.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    files: BTreeMap<String, String>,
    graph: DependencyGraph,
}

/// Blocks of one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub content_hash: String,
    pub blocks: Vec<AnalysisBlock>,
}

/// Everything a run produces, ready to serialize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub project: String,
    pub generated_at: String,
    pub files: Vec<FileReport>,
    pub graph: DependencyGraph,
    pub modules: ModuleGraph,
    pub importance: BTreeMap<String, f64>,
    pub top_classes: Vec<RankedClass>,
}

impl AnalysisContext {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        let graph = build_graph(&files);
        info!(
            "Built class graph: {} classes, {} edges from {} files",
            graph.node_count(),
            graph.edge_count(),
            files.len()
        );
        Self { files, graph }
    }

    pub fn from_reader(reader: &dyn RepositoryReader) -> Result<Self> {
        Ok(Self::new(reader.read_files()?))
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn known_classes(&self) -> std::collections::BTreeSet<String> {
        known_classes(&self.files)
    }

    pub fn blocks(&self, max_block_length: usize) -> BTreeMap<String, Vec<AnalysisBlock>> {
        self.files.iter()
            .map(|(path, text)| (path.clone(), split_file(path, text, max_block_length)))
            .collect()
    }

    /// Every class of every Python file, in path then document order
    pub fn class_facts(&self) -> Vec<ClassFact> {
        self.files.iter()
            .filter(|(path, _)| is_python_path(path))
            .flat_map(|(path, text)| class_facts(path, text))
            .collect()
    }

    /// The declaration used for a class name. Names declared more than once
    /// resolve to the last file in path order.
    pub fn find_class(&self, name: &str) -> Option<ClassFact> {
        self.class_facts().into_iter().rev().find(|fact| fact.name == name)
    }

    pub fn rank(&self, top_n: usize, exclude_tests: bool) -> Vec<RankedClass> {
        rank_classes(&self.files, &self.graph, top_n, exclude_tests)
    }

    pub fn importance(&self, exclude_tests: bool) -> BTreeMap<String, f64> {
        importance_scores(&self.files, &self.graph, exclude_tests)
    }

    pub fn module_graph(&self, group_levels: usize, max_modules: usize) -> ModuleGraph {
        ModuleAggregator::new(group_levels, max_modules).aggregate(&self.files, &self.graph)
    }

    pub fn report(&self, config: &Config) -> AnalysisReport {
        let blocks = self.blocks(config.splitting.max_block_length);
        let files = blocks.into_iter()
            .map(|(path, blocks)| FileReport {
                content_hash: content_hash(&self.files[&path]),
                path,
                blocks,
            })
            .collect();

        let modules = self.module_graph(config.modules.group_levels, config.modules.max_modules);
        debug!("Module graph: {} nodes, {} edges", modules.nodes.len(), modules.edges.len());

        AnalysisReport {
            project: config.project.name.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            files,
            graph: self.graph.clone(),
            modules,
            importance: self.importance(config.importance.exclude_tests),
            top_classes: self.rank(config.importance.top_classes, config.importance.exclude_tests),
        }
    }
}
