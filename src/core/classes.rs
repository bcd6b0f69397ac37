// src/core/classes.rs
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::ParseFailure;
use super::languages::{
    self, ParsedSource, descendants, direct_definitions, line_span, named_children
};

/// A class declaration as it appears in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,

    /// The declaration's lines, cut from the original text
    pub source: String,

    /// 0-based inclusive line range
    pub line_range: (usize, usize),
}

/// Name and parameters of a method, receiver excluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub parameters: Vec<String>,
}

/// Members of one class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSignature {
    pub name: String,
    pub attributes: BTreeSet<String>,
    /// Declaration order
    pub methods: Vec<MethodSignature>,
}

impl ClassSignature {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// Everything the analysis knows about one declared class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFact {
    pub name: String,
    pub file: String,
    pub attributes: BTreeSet<String>,
    pub methods: Vec<MethodSignature>,
    pub source: String,
    pub line_range: (usize, usize),
}

/// All classes in the source, nested ones included, in document order.
/// Malformed source yields nothing.
pub fn extract_classes(source: &str) -> Vec<ClassDefinition> {
    try_extract_classes(source).unwrap_or_default()
}

pub fn try_extract_classes(source: &str) -> Result<Vec<ClassDefinition>, ParseFailure> {
    let parsed = languages::parse_python(source)?;
    let lines: Vec<&str> = source.lines().collect();

    Ok(class_nodes(parsed.root())
        .into_iter()
        .filter_map(|node| {
            let name = parsed.node_text(node.child_by_field_name("name")?).to_string();
            let (start, end) = line_span(node);
            let end = end.min(lines.len().saturating_sub(1));
            Some(ClassDefinition {
                name,
                source: lines[start..=end].join("\n"),
                line_range: (start, end),
            })
        })
        .collect())
}

/// Names of every class declared in the source.
pub fn class_names(source: &str) -> BTreeSet<String> {
    extract_classes(source).into_iter().map(|c| c.name).collect()
}

/// Members of the first top-level class in `class_source`.
/// Malformed source, or source without a class, yields an empty signature.
pub fn signature(class_source: &str) -> ClassSignature {
    let Ok(parsed) = languages::parse_python(class_source) else {
        return ClassSignature::default();
    };

    match first_class(&parsed) {
        Some(class) => class_signature(&parsed, class),
        None => ClassSignature::default(),
    }
}

/// Facts for every class of one file.
pub fn class_facts(path: &str, source: &str) -> Vec<ClassFact> {
    extract_classes(source)
        .into_iter()
        .map(|definition| {
            let sig = signature(&definition.source);
            ClassFact {
                name: definition.name,
                file: path.to_string(),
                attributes: sig.attributes,
                methods: sig.methods,
                source: definition.source,
                line_range: definition.line_range,
            }
        })
        .collect()
}

pub(crate) fn class_nodes(root: Node) -> Vec<Node> {
    descendants(root)
        .into_iter()
        .filter(|node| node.kind() == "class_definition")
        .collect()
}

pub(crate) fn first_class<'t>(parsed: &'t ParsedSource) -> Option<Node<'t>> {
    direct_definitions(parsed.root(), "class_definition").into_iter().next()
}

pub(crate) fn class_signature(parsed: &ParsedSource, class: Node) -> ClassSignature {
    let name = class.child_by_field_name("name")
        .map(|n| parsed.node_text(n).to_string())
        .unwrap_or_default();

    let methods = direct_methods(class)
        .into_iter()
        .filter_map(|method| {
            let name = parsed.node_text(method.child_by_field_name("name")?).to_string();
            Some(MethodSignature {
                name,
                parameters: parameter_names(parsed, method),
            })
        })
        .collect();

    ClassSignature {
        name,
        attributes: class_attributes(parsed, class),
        methods,
    }
}

/// Function declarations directly in the class body (decorated ones included).
pub(crate) fn direct_methods(class: Node) -> Vec<Node> {
    class.child_by_field_name("body")
        .map(|body| direct_definitions(body, "function_definition"))
        .unwrap_or_default()
}

/// Names assigned in the class body plus `self.X` targets inside its methods.
pub(crate) fn class_attributes(parsed: &ParsedSource, class: Node) -> BTreeSet<String> {
    let mut attributes = BTreeSet::new();

    if let Some(body) = class.child_by_field_name("body") {
        for statement in named_children(body) {
            if statement.kind() != "expression_statement" {
                continue;
            }
            for expr in named_children(statement) {
                let mut assignment = Some(expr);
                while let Some(node) = assignment.filter(|n| n.kind() == "assignment") {
                    if node.child_by_field_name("right").is_some() {
                        if let Some(left) = node.child_by_field_name("left").filter(|l| l.kind() == "identifier") {
                            attributes.insert(parsed.node_text(left).to_string());
                        }
                    }
                    assignment = node.child_by_field_name("right");
                }
            }
        }
    }

    for method in direct_methods(class) {
        for node in descendants(method) {
            if node.kind() != "assignment" {
                continue;
            }
            if let Some(name) = node.child_by_field_name("left").and_then(|left| self_attribute(parsed, left)) {
                attributes.insert(name.to_string());
            }
        }
    }

    attributes
}

/// `X` for a `self.X` target.
fn self_attribute<'a>(parsed: &'a ParsedSource, target: Node) -> Option<&'a str> {
    if target.kind() != "attribute" {
        return None;
    }
    let object = target.child_by_field_name("object")?;
    if object.kind() != "identifier" || parsed.node_text(object) != "self" {
        return None;
    }
    target.child_by_field_name("attribute").map(|attr| parsed.node_text(attr))
}

/// Plain parameter names of a function; splats and a leading receiver are skipped.
pub(crate) fn parameter_names(parsed: &ParsedSource, function: Node) -> Vec<String> {
    let Some(parameters) = function.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut names = Vec::new();
    for param in named_children(parameters) {
        let name_node = match param.kind() {
            "identifier" => Some(param),
            "typed_parameter" => named_children(param)
                .into_iter()
                .next()
                .filter(|n| n.kind() == "identifier"),
            "default_parameter" | "typed_default_parameter" => param.child_by_field_name("name"),
            _ => None,
        };
        if let Some(node) = name_node {
            names.push(parsed.node_text(node).to_string());
        }
    }

    if matches!(names.first().map(String::as_str), Some("self") | Some("cls")) {
        names.remove(0);
    }
    names
}
