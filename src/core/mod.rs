// src/core/mod.rs
mod engine;
mod reader;
mod context;
mod splitter;
mod classes;
mod dependency_graph;
mod metrics;
mod importance;
mod modules;
mod relationships;
mod diagram;
mod heuristics;
mod architecture;
mod documenter;
mod llm;

// Language-specific parsers
mod languages;

pub use reader::{RepositoryReader, DirectoryReader, MemoryReader, SourceFile, content_hash};
pub use context::{AnalysisContext, AnalysisReport, FileReport};
pub use splitter::{AnalysisBlock, DeclarationKind, ProtectedInterval, split, split_file, protected_intervals};
pub use classes::{
    ClassDefinition, ClassSignature, MethodSignature, ClassFact,
    extract_classes, try_extract_classes, class_names, signature, class_facts
};
pub use dependency_graph::{
    DependencyGraph, ReferenceKind, ClassReference, build_graph, class_references, known_classes
};
pub use metrics::ClassMetrics;
pub use importance::{RankedClass, importance_index, score, is_test_path, score_classes, rank_classes, importance_scores};
pub use modules::{ModuleGraph, ModuleAggregator, OTHER_MODULE, module_key, group_modules};
pub use relationships::{
    RelationshipKind, RelationshipMap, RelationshipClassifier, merge_segments,
    parse_relationship_response, find_imports, segment_class
};
pub use diagram::{ClassDiagram, method_callers, method_callers_diagram};
pub use heuristics::{
    RepositoryHeuristics, PyprojectInsights, CiSignals, ENTRYPOINT_NAMES, collect_heuristics,
    compose_services, parse_requirements, parse_setup_cfg_requires, parse_pyproject
};
pub use architecture::{ArchitectureRecognizer, ArchitectureVerdict, parse_verdict};
pub use documenter::{Documenter, BlockDocument, PromptKind, ReadmeFacts, write_documents};
pub use llm::{TextGenerator, TokenBudget, OpenAiCompatibleProvider, create_generator, strip_think_blocks};
pub use languages::{PythonParser, ParsedSource, parse_python, is_python_path};

// Export the main engine
pub use engine::Engine;
