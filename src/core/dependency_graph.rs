// src/core/dependency_graph.rs - Class-level dependency graph
use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::error::ParseFailure;
use super::classes::{self, class_nodes};
use super::languages::{self, ParsedSource, decorators_of, descendants, named_children};

/// Directed graph over declared class names
///
/// Every edge target is a node, edges are deduplicated and a class never
/// points at itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph with the given nodes and no edges
    pub fn with_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node);
        }
        graph
    }

    pub fn add_node(&mut self, name: impl Into<String>) {
        self.adjacency.entry(name.into()).or_default();
    }

    /// Add `source -> target`. Returns false for self-edges, unknown targets
    /// and edges that already exist.
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        if source == target || !self.adjacency.contains_key(target) {
            return false;
        }
        self.adjacency.entry(source.to_string())
            .or_default()
            .insert(target.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adjacency.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum()
    }

    /// Classes `name` refers to (outgoing edges)
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.adjacency.get(name)
    }

    /// Classes referring to `name` (incoming edges)
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.adjacency.iter()
            .filter(|(_, targets)| targets.contains(name))
            .map(|(source, _)| source.as_str())
            .collect()
    }

    pub fn in_degree(&self, name: &str) -> usize {
        self.adjacency.values()
            .filter(|targets| targets.contains(name))
            .count()
    }

    /// In-degree of every node, zero included
    pub fn in_degrees(&self) -> BTreeMap<String, usize> {
        let mut degrees: BTreeMap<String, usize> = self.adjacency.keys()
            .map(|name| (name.clone(), 0))
            .collect();

        for target in self.adjacency.values().flatten() {
            if let Some(count) = degrees.get_mut(target) {
                *count += 1;
            }
        }
        degrees
    }

    /// All edges in (source, target) order
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.adjacency.iter().flat_map(|(source, targets)| {
            targets.iter().map(move |target| (source.as_str(), target.as_str()))
        })
    }
}

/// Syntactic construct that produced a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `class B(A)` or `class B(mod.A)`
    Inheritance,
    /// `@A` on the class or any of its methods
    Decorator,
    /// `A(...)`
    Instantiation,
    /// `A.method(...)`
    MethodCall,
    /// `x: A` on a parameter or variable
    Annotation,
    /// `def f() -> A`
    ReturnAnnotation,
    /// `isinstance(x, A)` or `isinstance(x, (A, B))`
    IsInstance,
    /// `raise A(...)`
    Raise,
    /// `except A`
    Except,
}

/// One reference from a class to another known class
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassReference {
    pub source: String,
    pub target: String,
    pub kind: ReferenceKind,
}

/// Every class name declared anywhere in the collection.
pub fn known_classes(files: &BTreeMap<String, String>) -> BTreeSet<String> {
    files.values()
        .flat_map(|source| classes::class_names(source))
        .collect()
}

/// Build the class dependency graph of a file collection.
///
/// Resolution is purely syntactic: names are matched against the known class
/// set through the file's import aliases, without following shadowing or
/// dynamic dispatch. Classes sharing a name across files share one node.
pub fn build_graph(files: &BTreeMap<String, String>) -> DependencyGraph {
    let known = known_classes(files);
    let mut graph = DependencyGraph::with_nodes(known.iter().cloned());

    for (path, source) in files {
        match class_references(source, &known) {
            Ok(references) => {
                for reference in references {
                    graph.add_edge(&reference.source, &reference.target);
                }
            }
            Err(failure) => warn!("Skipping {} in dependency scan: {}", path, failure),
        }
    }

    debug!("Dependency graph: {} classes, {} edges", graph.node_count(), graph.edge_count());
    graph
}

/// References from each class declared in `source` to other known classes.
pub fn class_references(source: &str, known: &BTreeSet<String>) -> Result<Vec<ClassReference>, ParseFailure> {
    let parsed = languages::parse_python(source)?;
    let aliases = import_aliases(&parsed, known);

    let mut scan = ReferenceScan {
        parsed: &parsed,
        known,
        aliases: &aliases,
        found: BTreeSet::new(),
    };

    for class in class_nodes(parsed.root()) {
        let Some(name) = class.child_by_field_name("name") else {
            continue;
        };
        let name = parsed.node_text(name).to_string();
        scan.scan_class(&name, class);
    }

    Ok(scan.found.into_iter().collect())
}

/// Local name -> class name for the file's top-level imports of known classes.
fn import_aliases(parsed: &ParsedSource, known: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut aliases = BTreeMap::new();

    for statement in named_children(parsed.root()) {
        match statement.kind() {
            "import_statement" => {}
            "import_from_statement" => {
                let Some(module) = statement.child_by_field_name("module_name") else {
                    continue;
                };
                // `from . import X` names modules, not classes
                if module.kind() == "relative_import"
                    && !named_children(module).iter().any(|n| n.kind() == "dotted_name")
                {
                    continue;
                }
            }
            _ => continue,
        }

        let mut cursor = statement.walk();
        for imported in statement.children_by_field_name("name", &mut cursor) {
            let (path, alias) = match imported.kind() {
                "aliased_import" => (
                    imported.child_by_field_name("name"),
                    imported.child_by_field_name("alias"),
                ),
                _ => (Some(imported), None),
            };
            let Some(path) = path else { continue };

            let class_name = parsed.node_text(path).rsplit('.').next().unwrap_or_default();
            if !known.contains(class_name) {
                continue;
            }
            let local = alias.map(|a| parsed.node_text(a)).unwrap_or(class_name);
            aliases.insert(local.to_string(), class_name.to_string());
        }
    }

    aliases
}

struct ReferenceScan<'a> {
    parsed: &'a ParsedSource,
    known: &'a BTreeSet<String>,
    aliases: &'a BTreeMap<String, String>,
    found: BTreeSet<ClassReference>,
}

impl<'a> ReferenceScan<'a> {
    fn scan_class(&mut self, class_name: &str, class: Node) {
        if let Some(bases) = class.child_by_field_name("superclasses") {
            for base in named_children(bases) {
                if let Some(name) = self.name_or_receiver(base) {
                    self.record(class_name, name, ReferenceKind::Inheritance);
                }
            }
        }

        let mut nodes = Vec::new();
        for decorator in decorators_of(class) {
            nodes.extend(descendants(decorator));
        }
        nodes.extend(descendants(class));

        for node in nodes {
            match node.kind() {
                "call" => self.scan_call(class_name, node),
                "decorator" => {
                    if let Some(name) = self.decorator_target(node) {
                        self.record(class_name, name, ReferenceKind::Decorator);
                    }
                }
                "typed_parameter" | "typed_default_parameter" | "assignment" => {
                    if let Some(name) = node.child_by_field_name("type").and_then(|t| self.type_name(t)) {
                        self.record(class_name, name, ReferenceKind::Annotation);
                    }
                }
                "function_definition" => {
                    if let Some(name) = node.child_by_field_name("return_type").and_then(|t| self.type_name(t)) {
                        self.record(class_name, name, ReferenceKind::ReturnAnnotation);
                    }
                }
                "raise_statement" => {
                    let raised = named_children(node).into_iter().next()
                        .filter(|n| n.kind() == "call")
                        .and_then(|call| call.child_by_field_name("function"))
                        .and_then(|function| self.name_or_receiver(function));
                    if let Some(name) = raised {
                        self.record(class_name, name, ReferenceKind::Raise);
                    }
                }
                "except_clause" => {
                    if let Some(name) = self.caught_type(node) {
                        self.record(class_name, name, ReferenceKind::Except);
                    }
                }
                _ => {}
            }
        }
    }

    fn scan_call(&mut self, class_name: &str, call: Node) {
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };

        let parsed = self.parsed;
        match function.kind() {
            "identifier" => {
                let name = parsed.node_text(function);
                if name == "isinstance" {
                    self.scan_isinstance(class_name, call);
                } else {
                    self.record(class_name, name, ReferenceKind::Instantiation);
                }
            }
            "attribute" => {
                if let Some(receiver) = self.receiver(function) {
                    self.record(class_name, receiver, ReferenceKind::MethodCall);
                }
            }
            _ => {}
        }
    }

    fn scan_isinstance(&mut self, class_name: &str, call: Node) {
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let positional: Vec<Node> = named_children(arguments)
            .into_iter()
            .filter(|arg| arg.kind() != "keyword_argument")
            .collect();
        let Some(&checked) = positional.get(1) else {
            return;
        };

        let candidates = match checked.kind() {
            "identifier" => vec![checked],
            "tuple" => named_children(checked),
            _ => Vec::new(),
        };
        let parsed = self.parsed;
        for candidate in candidates.into_iter().filter(|n| n.kind() == "identifier") {
            let name = parsed.node_text(candidate);
            self.record(class_name, name, ReferenceKind::IsInstance);
        }
    }

    /// `A` for `@A`, `@A.x` and `@A(...)`
    fn decorator_target(&self, decorator: Node) -> Option<&'a str> {
        let expression = named_children(decorator).into_iter().next()?;
        match expression.kind() {
            "call" => self.name_or_receiver(expression.child_by_field_name("function")?),
            _ => self.name_or_receiver(expression),
        }
    }

    fn caught_type(&self, clause: Node) -> Option<&'a str> {
        let mut caught = named_children(clause).into_iter().next()?;
        if caught.kind() == "as_pattern" {
            caught = named_children(caught).into_iter().next()?;
        }
        (caught.kind() == "identifier").then(|| self.parsed.node_text(caught))
    }

    /// Plain identifier inside a `type` annotation node
    fn type_name(&self, annotation: Node) -> Option<&'a str> {
        let inner = if annotation.kind() == "type" {
            named_children(annotation).into_iter().next()?
        } else {
            annotation
        };
        (inner.kind() == "identifier").then(|| self.parsed.node_text(inner))
    }

    /// `A` for `A`, or the receiver `A` of `A.x`
    fn name_or_receiver(&self, node: Node) -> Option<&'a str> {
        match node.kind() {
            "identifier" => Some(self.parsed.node_text(node)),
            "attribute" => self.receiver(node),
            _ => None,
        }
    }

    fn receiver(&self, attribute: Node) -> Option<&'a str> {
        let object = attribute.child_by_field_name("object")?;
        (object.kind() == "identifier").then(|| self.parsed.node_text(object))
    }

    fn record(&mut self, source: &str, name: &str, kind: ReferenceKind) {
        let target = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        if target == source || !self.known.contains(target) {
            return;
        }
        self.found.insert(ClassReference {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        });
    }
}
