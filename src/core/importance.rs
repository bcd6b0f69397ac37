// src/core/importance.rs - Importance index and class ranking
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classes::extract_classes;
use super::dependency_graph::DependencyGraph;
use super::languages::is_python_path;
use super::metrics::ClassMetrics;

const METHOD_WEIGHT: f64 = 0.25;
const CALL_WEIGHT: f64 = 0.15;
const LOC_WEIGHT: f64 = 0.10;
const ATTRIBUTE_WEIGHT: f64 = 0.10;
const COMPLEXITY_WEIGHT: f64 = 0.10;
const DEPENDENTS_WEIGHT: f64 = 0.30;

const DEPENDENTS_EXPONENT: f64 = 1.5;
const LOC_SCALE: f64 = 10.0;

/// Weighted importance of a measured class, rounded to two decimals.
///
/// The dependents share is raised to 1.5 so the score concentrates on the
/// few classes most of the project leans on.
pub fn importance_index(metrics: &ClassMetrics, dependents: usize, total_classes: usize) -> f64 {
    let share = dependents as f64 / total_classes.max(1) as f64;
    let norm_dependents = share.powf(DEPENDENTS_EXPONENT);
    let normalized_loc = metrics.lines as f64 / LOC_SCALE;

    let index = METHOD_WEIGHT * metrics.methods as f64
        + CALL_WEIGHT * metrics.calls as f64
        + LOC_WEIGHT * normalized_loc
        + ATTRIBUTE_WEIGHT * metrics.attributes as f64
        + COMPLEXITY_WEIGHT * metrics.complexity as f64
        + DEPENDENTS_WEIGHT * norm_dependents;

    round2(index)
}

/// Importance of a class source given its in-degree.
pub fn score(class_source: &str, dependents: usize, total_classes: usize) -> f64 {
    importance_index(&ClassMetrics::compute(class_source), dependents, total_classes)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether a path looks like test code: under a `tests/` directory, or named
/// `test_*` / `*_test.py`.
pub fn is_test_path(path: &str) -> bool {
    let lower = path.replace('\\', "/").to_lowercase();
    let basename = lower.rsplit('/').next().unwrap_or_default();

    lower.starts_with("tests/")
        || lower.contains("/tests/")
        || basename.starts_with("test_")
        || basename.ends_with("_test.py")
}

/// A class together with its importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub name: String,
    pub file: String,
    pub importance: f64,
    pub dependents: usize,
    pub metrics: ClassMetrics,
    pub source: String,
}

/// Score every class of every Python file, most important first.
///
/// Ties keep name order, then file order.
pub fn score_classes(files: &BTreeMap<String, String>, graph: &DependencyGraph, exclude_tests: bool) -> Vec<RankedClass> {
    let total_classes = graph.node_count();
    let in_degrees = graph.in_degrees();
    let mut ranked = Vec::new();

    for (path, source) in files {
        if !is_python_path(path) || (exclude_tests && is_test_path(path)) {
            continue;
        }

        for class in extract_classes(source) {
            let dependents = in_degrees.get(&class.name).copied().unwrap_or(0);
            let metrics = ClassMetrics::compute(&class.source);
            let importance = importance_index(&metrics, dependents, total_classes);
            debug!("Importance of {} ({}): {}", class.name, path, importance);

            ranked.push(RankedClass {
                name: class.name,
                file: path.clone(),
                importance,
                dependents,
                metrics,
                source: class.source,
            });
        }
    }

    ranked.sort_by(|a, b| {
        b.importance.total_cmp(&a.importance)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.file.cmp(&b.file))
    });
    ranked
}

/// The `top_n` most important classes.
pub fn rank_classes(
    files: &BTreeMap<String, String>,
    graph: &DependencyGraph,
    top_n: usize,
    exclude_tests: bool,
) -> Vec<RankedClass> {
    let mut ranked = score_classes(files, graph, exclude_tests);
    ranked.truncate(top_n);
    ranked
}

/// Class name -> importance over all classes. A name declared more than once
/// keeps its highest score.
pub fn importance_scores(files: &BTreeMap<String, String>, graph: &DependencyGraph, exclude_tests: bool) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    // Sorted descending, so the first entry per name is its maximum
    for class in score_classes(files, graph, exclude_tests) {
        scores.entry(class.name).or_insert(class.importance);
    }
    scores
}
