// src/core/splitter.rs
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use tracing::warn;
use tree_sitter::Node;

use crate::error::ParseFailure;
use super::languages::{self, ParsedSource, line_span, named_children, definition_of};

/// A contiguous run of source lines plus what is declared inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisBlock {
    /// The original source lines, unmodified
    pub lines: Vec<String>,

    /// Classes whose whole declaration lies inside the block
    pub classes: BTreeSet<String>,

    /// Module-level functions whose whole declaration lies inside the block
    pub functions: BTreeSet<String>,

    /// 0-based inclusive line range
    pub line_range: (usize, usize),
}

impl AnalysisBlock {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn has_declarations(&self) -> bool {
        !self.classes.is_empty() || !self.functions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Class,
    Function,
}

/// Line span of a class or function that must never straddle two blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedInterval {
    pub name: String,
    pub kind: DeclarationKind,
    /// 0-based first line of the `class`/`def` keyword
    pub start: usize,
    /// 0-based inclusive last line of the body
    pub end: usize,
    /// Declared directly at module level (not inside a class or function)
    pub module_level: bool,
}

impl ProtectedInterval {
    fn lies_within(&self, start: usize, end: usize) -> bool {
        self.start >= start && self.end <= end
    }
}

/// Split Python source into blocks of roughly `max_block_length` lines.
///
/// A block only closes on a line outside every protected interval, so it may
/// run long to keep a class or function whole. Unparsable input comes back as
/// a single block without metadata.
pub fn split(source: &str, max_block_length: usize) -> Vec<AnalysisBlock> {
    match protected_intervals(source) {
        Ok(intervals) => split_into_blocks(source, &intervals, max_block_length),
        Err(failure) => {
            warn!("Splitting without structure: {}", failure);
            vec![whole_source_block(source)]
        }
    }
}

/// Split any file: Python goes through the structural splitter, everything
/// else is kept as one block.
pub fn split_file(path: &str, source: &str, max_block_length: usize) -> Vec<AnalysisBlock> {
    if languages::is_python_path(path) {
        split(source, max_block_length)
    } else {
        vec![whole_source_block(source)]
    }
}

/// Every class and function span in the source, nested ones included.
pub fn protected_intervals(source: &str) -> Result<Vec<ProtectedInterval>, ParseFailure> {
    let parsed = languages::parse_python(source)?;
    let mut intervals = Vec::new();
    collect_intervals(&parsed, parsed.root(), true, &mut intervals);
    Ok(intervals)
}

fn collect_intervals(parsed: &ParsedSource, node: Node, module_level: bool, out: &mut Vec<ProtectedInterval>) {
    for child in named_children(node) {
        let child = definition_of(child);
        let kind = match child.kind() {
            "class_definition" => Some(DeclarationKind::Class),
            "function_definition" => Some(DeclarationKind::Function),
            _ => None,
        };

        match kind {
            Some(kind) => {
                if let Some(name) = child.child_by_field_name("name") {
                    let (start, end) = line_span(child);
                    out.push(ProtectedInterval {
                        name: parsed.node_text(name).to_string(),
                        kind,
                        start,
                        end,
                        module_level,
                    });
                }
                collect_intervals(parsed, child, false, out);
            }
            None => collect_intervals(parsed, child, module_level, out),
        }
    }
}

fn split_into_blocks(source: &str, intervals: &[ProtectedInterval], max_block_length: usize) -> Vec<AnalysisBlock> {
    let lines: Vec<&str> = source.lines().collect();

    let mut protected = vec![false; lines.len()];
    for interval in intervals {
        let end = interval.end.min(lines.len().saturating_sub(1));
        for flag in protected.iter_mut().take(end + 1).skip(interval.start) {
            *flag = true;
        }
    }

    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut block_start = 0;

    for (line_num, line) in lines.iter().enumerate() {
        current.push((*line).to_string());

        if current.len() >= max_block_length && !protected[line_num] {
            blocks.push(build_block(std::mem::take(&mut current), intervals, block_start, line_num));
            block_start = line_num + 1;
        }
    }

    if !current.is_empty() {
        blocks.push(build_block(current, intervals, block_start, lines.len() - 1));
    }

    blocks
}

fn build_block(lines: Vec<String>, intervals: &[ProtectedInterval], start: usize, end: usize) -> AnalysisBlock {
    let mut classes = BTreeSet::new();
    let mut functions = BTreeSet::new();

    for interval in intervals.iter().filter(|i| i.lies_within(start, end)) {
        match interval.kind {
            DeclarationKind::Class => {
                classes.insert(interval.name.clone());
            }
            DeclarationKind::Function if interval.module_level => {
                functions.insert(interval.name.clone());
            }
            DeclarationKind::Function => {}
        }
    }

    AnalysisBlock {
        lines,
        classes,
        functions,
        line_range: (start, end),
    }
}

fn whole_source_block(source: &str) -> AnalysisBlock {
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    let end = lines.len().saturating_sub(1);

    AnalysisBlock {
        lines,
        classes: BTreeSet::new(),
        functions: BTreeSet::new(),
        line_range: (0, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"import os

CONSTANT = 1


def helper(x):
    value = x + 1
    return value


class Service:
    retries = 3

    def __init__(self, client):
        self.client = client

    def run(self):
        for item in range(10):
            if item:
                self.client.send(item)
        return True

    class Config:
        debug = False


def main():
    Service(None).run()
"#;

    fn assert_partition(source: &str, blocks: &[AnalysisBlock]) {
        let original: Vec<&str> = source.lines().collect();
        let rebuilt: Vec<&str> = blocks.iter()
            .flat_map(|b| b.lines.iter().map(String::as_str))
            .collect();
        assert_eq!(rebuilt, original);

        let mut expected_start = 0;
        for block in blocks {
            assert_eq!(block.line_range.0, expected_start);
            assert_eq!(block.line_range.1 + 1 - block.line_range.0, block.len());
            expected_start = block.line_range.1 + 1;
        }
        assert_eq!(expected_start, original.len());
    }

    fn assert_no_split(source: &str, blocks: &[AnalysisBlock]) {
        for interval in protected_intervals(source).unwrap() {
            for block in blocks {
                let (start, end) = block.line_range;
                let overlaps = interval.start <= end && start <= interval.end;
                if overlaps {
                    assert!(
                        interval.start >= start && interval.end <= end,
                        "{} ({}..{}) split by block {}..{}",
                        interval.name, interval.start, interval.end, start, end
                    );
                }
            }
        }
    }

    #[test]
    fn test_blocks_partition_source_for_every_length() {
        for max in 1..40 {
            let blocks = split(SAMPLE, max);
            assert_partition(SAMPLE, &blocks);
            assert_no_split(SAMPLE, &blocks);
        }
    }

    #[test]
    fn test_block_grows_to_keep_class_whole() {
        let blocks = split(SAMPLE, 12);
        let class_block = blocks.iter()
            .find(|b| b.classes.contains("Service"))
            .expect("Service block");

        assert!(class_block.len() > 12);
        assert!(class_block.classes.contains("Config"));
        assert!(!class_block.functions.contains("run"));
    }

    #[test]
    fn test_metadata_lists_module_level_functions_only() {
        let blocks = split(SAMPLE, 1000);
        assert_eq!(blocks.len(), 1);

        let block = &blocks[0];
        let functions: Vec<&str> = block.functions.iter().map(String::as_str).collect();
        let classes: Vec<&str> = block.classes.iter().map(String::as_str).collect();
        assert_eq!(functions, vec!["helper", "main"]);
        assert_eq!(classes, vec!["Config", "Service"]);
        assert_eq!(block.line_range, (0, SAMPLE.lines().count() - 1));
    }

    #[test]
    fn test_trailing_partial_block_is_emitted() {
        let source = "a = 1\nb = 2\nc = 3\nd = 4\ne = 5\n";
        let blocks = split(source, 2);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].lines, vec!["e = 5".to_string()]);
        assert_eq!(blocks[2].line_range, (4, 4));
    }

    #[test]
    fn test_parse_failure_returns_single_block() {
        let source = "class Broken(:\n    pass\nx = 1\n";
        let blocks = split(source, 1);
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].has_declarations());
        assert_eq!(blocks[0].text(), "class Broken(:\n    pass\nx = 1");
        assert_eq!(blocks[0].line_range, (0, 2));
    }

    #[test]
    fn test_empty_source_yields_no_blocks() {
        assert!(split("", 10).is_empty());
    }

    #[test]
    fn test_non_python_file_is_one_block() {
        let blocks = split_file("docs/readme.md", "# Title\n\nclass text\n", 1);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 3);
    }

    #[test]
    fn test_decorated_function_interval_starts_at_def() {
        let intervals = protected_intervals("@cache\ndef f():\n    return 1\n").unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!((intervals[0].start, intervals[0].end), (1, 2));
        assert!(intervals[0].module_level);
    }
}
