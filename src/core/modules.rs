// src/core/modules.rs - Directory-level view of the class graph
use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classes::class_names;
use super::dependency_graph::DependencyGraph;

/// Module key that absorbs everything past the module cap
pub const OTHER_MODULE: &str = "other";

/// Module nodes and the edges between them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleGraph {
    /// Sorted, with "other" last when present
    pub nodes: Vec<String>,
    /// Sorted and free of self-loops
    pub edges: Vec<(String, String)>,
}

/// Module key of a file: its directory cut to the first `group_levels`
/// segments. Files at the root map to the empty key.
pub fn module_key(path: &str, group_levels: usize) -> String {
    let normalized = path.replace('\\', "/");
    let directory = match normalized.rfind('/') {
        Some(index) => &normalized[..index],
        None => "",
    };
    group_directory(directory, group_levels)
}

fn group_directory(directory: &str, group_levels: usize) -> String {
    let parts: Vec<&str> = directory.split('/').collect();
    let grouped = parts[..group_levels.min(parts.len())].join("/");
    if grouped.is_empty() {
        parts[0].to_string()
    } else {
        grouped
    }
}

/// Collapses the class graph into a module graph
pub struct ModuleAggregator {
    group_levels: usize,
    max_modules: usize,
}

impl ModuleAggregator {
    pub fn new(group_levels: usize, max_modules: usize) -> Self {
        Self { group_levels, max_modules }
    }

    pub fn aggregate(&self, files: &BTreeMap<String, String>, graph: &DependencyGraph) -> ModuleGraph {
        let mut groups: BTreeSet<String> = files.keys()
            .map(|path| module_key(path, self.group_levels))
            .collect();

        // Later files win for class names declared more than once
        let mut class_to_group: BTreeMap<String, String> = BTreeMap::new();
        for (path, source) in files {
            let group = module_key(path, self.group_levels);
            for name in class_names(source) {
                class_to_group.insert(name, group.clone());
            }
        }

        let mut module_edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (source, target) in graph.edges() {
            let (Some(from), Some(to)) = (class_to_group.get(source), class_to_group.get(target)) else {
                continue;
            };
            if from != to {
                module_edges.entry(from.clone()).or_default().insert(to.clone());
            }
        }
        groups.extend(module_edges.keys().cloned());

        let degree = |group: &String| -> usize {
            let outgoing = module_edges.get(group).map_or(0, BTreeSet::len);
            let incoming = module_edges.values().filter(|targets| targets.contains(group)).count();
            outgoing + incoming
        };

        let kept: BTreeSet<String> = if groups.len() > self.max_modules {
            let mut by_degree: Vec<(usize, &String)> = groups.iter().map(|g| (degree(g), g)).collect();
            by_degree.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
            by_degree.into_iter()
                .take(self.max_modules)
                .map(|(_, group)| group.clone())
                .collect()
        } else {
            groups.clone()
        };

        let collapsed = kept.len() < groups.len();
        let project = |group: &String| -> String {
            if kept.contains(group) { group.clone() } else { OTHER_MODULE.to_string() }
        };

        let edges: BTreeSet<(String, String)> = module_edges.iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from, to)))
            .map(|(from, to)| (project(from), project(to)))
            .filter(|(from, to)| from != to)
            .collect();

        let mut nodes: Vec<String> = kept.into_iter().collect();
        if collapsed {
            nodes.push(OTHER_MODULE.to_string());
        }

        debug!("Module graph: {} modules, {} edges", nodes.len(), edges.len());
        ModuleGraph {
            nodes,
            edges: edges.into_iter().collect(),
        }
    }
}

/// Sorted module keys of the collection, "other" last when the cap applies.
pub fn group_modules(
    files: &BTreeMap<String, String>,
    graph: &DependencyGraph,
    group_levels: usize,
    max_modules: usize,
) -> Vec<String> {
    ModuleAggregator::new(group_levels, max_modules).aggregate(files, graph).nodes
}
