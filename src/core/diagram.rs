// src/core/diagram.rs - PlantUML text for class diagrams
use std::collections::{BTreeMap, BTreeSet};
use serde::Serialize;
use tera::{Context, Tera};
use tree_sitter::Node;

use crate::error::Result;
use super::classes::{ClassSignature, MethodSignature, direct_methods};
use super::languages::{self, ParsedSource, descendants, direct_definitions, named_children};
use super::relationships::RelationshipMap;

const DIAGRAM_TEMPLATE: &str = "@startuml
{% for entry in classes %}class {{ entry.name }} {
{% for member in entry.members %}    + {{ member }}
{% endfor %}}
{% endfor %}{% for line in relations %}{{ line }}
{% endfor %}@enduml
";

#[derive(Debug, Clone, Serialize)]
struct DiagramClass {
    name: String,
    members: Vec<String>,
}

/// Deterministic PlantUML class diagram
#[derive(Debug, Clone, Default)]
pub struct ClassDiagram {
    classes: BTreeMap<String, Vec<String>>,
    relations: BTreeSet<String>,
}

impl ClassDiagram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class box with its public methods and its relationship lines.
    pub fn add_class(&mut self, signature: &ClassSignature, relationships: &RelationshipMap) {
        let members = signature.methods.iter()
            .filter(|method| is_diagram_method(&method.name))
            .map(format_method)
            .collect();
        self.classes.insert(signature.name.clone(), members);
        self.relations.extend(relationships.plantuml_lines(&signature.name));
    }

    /// Add a class box with preformatted members, merging with an existing box.
    pub fn add_members(&mut self, class: &str, members: impl IntoIterator<Item = String>) {
        let entry = self.classes.entry(class.to_string()).or_default();
        for member in members {
            if !entry.contains(&member) {
                entry.push(member);
            }
        }
    }

    pub fn add_relation(&mut self, line: impl Into<String>) {
        self.relations.insert(line.into());
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.relations.is_empty()
    }

    /// Render `@startuml ... @enduml`: class boxes by name, then relations.
    pub fn render(&self) -> Result<String> {
        let classes: Vec<DiagramClass> = self.classes.iter()
            .map(|(name, members)| DiagramClass {
                name: name.clone(),
                members: members.clone(),
            })
            .collect();

        let mut context = Context::new();
        context.insert("classes", &classes);
        context.insert("relations", &self.relations);

        Ok(Tera::one_off(DIAGRAM_TEMPLATE, &context, false)?)
    }
}

/// Dunders other than `__init__` and `_private` helpers stay off the diagram.
fn is_diagram_method(name: &str) -> bool {
    if name.starts_with("__") && name.ends_with("__") {
        return name == "__init__";
    }
    !name.starts_with('_')
}

fn format_method(method: &MethodSignature) -> String {
    format!("{}({})", method.name, method.parameters.join(", "))
}

/// Who calls `class_name.method_name`: every top-level class with a method
/// calling it through a `self.x` attribute built from the class (directly or
/// through a factory whose name mentions it) or through a parameter annotated
/// with the class.
pub fn method_callers(files: &BTreeMap<String, String>, class_name: &str, method_name: &str) -> BTreeMap<String, BTreeSet<String>> {
    let mut callers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for source in files.values() {
        let Ok(parsed) = languages::parse_python(source) else {
            continue;
        };

        for class in direct_definitions(parsed.root(), "class_definition") {
            let Some(caller) = class.child_by_field_name("name").map(|n| parsed.node_text(n)) else {
                continue;
            };
            let methods = direct_methods(class);
            let held = held_attributes(&parsed, &methods, class_name);

            for method in &methods {
                let params = annotated_parameters(&parsed, *method, class_name);
                if calls_through(&parsed, *method, method_name, &held, &params) {
                    if let Some(name) = method.child_by_field_name("name") {
                        callers.entry(caller.to_string())
                            .or_default()
                            .insert(parsed.node_text(name).to_string());
                    }
                }
            }
        }
    }

    callers
}

/// Diagram of [`method_callers`]
pub fn method_callers_diagram(files: &BTreeMap<String, String>, class_name: &str, method_name: &str) -> Result<String> {
    let mut diagram = ClassDiagram::new();
    diagram.add_members(class_name, [format!("{}()", method_name)]);

    for (caller, methods) in method_callers(files, class_name, method_name) {
        diagram.add_members(&caller, methods.iter().map(|m| format!("{}()", m)));
        diagram.add_relation(format!("{} --> {} : calls {}()", caller, class_name, method_name));
    }

    diagram.render()
}

/// `self.x = ClassName(...)` or `self.x = factory.make_classname(...)` in a
/// method's top-level statements.
fn held_attributes(parsed: &ParsedSource, methods: &[Node], class_name: &str) -> BTreeSet<String> {
    let lowered = class_name.to_lowercase();
    let mut held = BTreeSet::new();

    for method in methods {
        let Some(body) = method.child_by_field_name("body") else {
            continue;
        };
        for statement in named_children(body) {
            let Some(assignment) = named_children(statement).into_iter().find(|n| n.kind() == "assignment") else {
                continue;
            };
            let (Some(left), Some(right)) = (
                assignment.child_by_field_name("left"),
                assignment.child_by_field_name("right"),
            ) else {
                continue;
            };
            let Some(attribute) = self_attribute_name(parsed, left) else {
                continue;
            };
            let Some(function) = right.child_by_field_name("function").filter(|_| right.kind() == "call") else {
                continue;
            };

            let builds_class = match function.kind() {
                "identifier" => parsed.node_text(function) == class_name,
                "attribute" => function.child_by_field_name("attribute")
                    .map_or(false, |name| parsed.node_text(name).to_lowercase().contains(&lowered)),
                _ => false,
            };
            if builds_class {
                held.insert(attribute.to_string());
            }
        }
    }

    held
}

/// Parameters of one method annotated with exactly `class_name`.
fn annotated_parameters(parsed: &ParsedSource, method: Node, class_name: &str) -> BTreeSet<String> {
    let mut params = BTreeSet::new();
    let Some(parameters) = method.child_by_field_name("parameters") else {
        return params;
    };

    for param in named_children(parameters) {
        let annotated = param.child_by_field_name("type")
            .and_then(|t| named_children(t).into_iter().next())
            .map_or(false, |t| t.kind() == "identifier" && parsed.node_text(t) == class_name);
        if !annotated {
            continue;
        }
        let name = match param.kind() {
            "typed_default_parameter" => param.child_by_field_name("name"),
            _ => named_children(param).into_iter().next(),
        };
        if let Some(name) = name.filter(|n| n.kind() == "identifier") {
            params.insert(parsed.node_text(name).to_string());
        }
    }

    params
}

fn calls_through(
    parsed: &ParsedSource,
    method: Node,
    method_name: &str,
    held: &BTreeSet<String>,
    params: &BTreeSet<String>,
) -> bool {
    descendants(method).into_iter()
        .filter(|node| node.kind() == "call")
        .filter_map(|call| call.child_by_field_name("function"))
        .filter(|function| function.kind() == "attribute")
        .filter(|function| {
            function.child_by_field_name("attribute")
                .map_or(false, |name| parsed.node_text(name) == method_name)
        })
        .filter_map(|function| function.child_by_field_name("object"))
        .any(|object| match object.kind() {
            "attribute" => self_attribute_name(parsed, object).map_or(false, |name| held.contains(name)),
            "identifier" => params.contains(parsed.node_text(object)),
            _ => false,
        })
}

fn self_attribute_name<'a>(parsed: &'a ParsedSource, node: Node) -> Option<&'a str> {
    if node.kind() != "attribute" {
        return None;
    }
    let object = node.child_by_field_name("object")?;
    if object.kind() != "identifier" || parsed.node_text(object) != "self" {
        return None;
    }
    node.child_by_field_name("attribute").map(|name| parsed.node_text(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classes::signature;
    use crate::core::relationships::RelationshipKind;

    #[test]
    fn test_render_class_diagram() {
        let sig = signature(
            "class Car(Vehicle):\n    def __init__(self, engine):\n        self.engine = engine\n    def __repr__(self):\n        return ''\n    def _tune(self):\n        pass\n    def drive(self, speed, road):\n        pass\n",
        );
        let relationships: RelationshipMap = [
            ("Vehicle".to_string(), RelationshipKind::Inheritance),
            ("Engine".to_string(), RelationshipKind::Aggregation),
        ]
        .into_iter()
        .collect();

        let mut diagram = ClassDiagram::new();
        diagram.add_class(&sig, &relationships);
        diagram.add_class(&signature("class Engine:\n    def start(self):\n        pass\n"), &RelationshipMap::new());

        let expected = "@startuml
class Car {
    + __init__(engine)
    + drive(speed, road)
}
class Engine {
    + start()
}
Car o-- Engine : aggregation
Vehicle <|-- Car : inheritance
@enduml
";
        assert_eq!(diagram.render().unwrap(), expected);
    }

    #[test]
    fn test_method_callers() {
        let files: BTreeMap<String, String> = [
            ("billing.py", "class Billing:\n    def __init__(self, factory):\n        self.repo = Repository()\n        self.cache = factory.make_repository()\n    def charge(self):\n        self.repo.save(1)\n    def refund(self):\n        self.cache.save(2)\n    def audit(self):\n        self.other.save(3)\n"),
            ("report.py", "class Report:\n    def export(self, repo: Repository):\n        repo.save(4)\n    def render(self, repo):\n        repo.save(5)\n"),
        ]
        .iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect();

        let callers = method_callers(&files, "Repository", "save");
        let billing: Vec<&str> = callers["Billing"].iter().map(String::as_str).collect();
        let report: Vec<&str> = callers["Report"].iter().map(String::as_str).collect();
        assert_eq!(billing, vec!["charge", "refund"]);
        assert_eq!(report, vec!["export"]);

        let diagram = method_callers_diagram(&files, "Repository", "save").unwrap();
        assert!(!diagram.contains("render()"));
        assert!(diagram.contains("Billing --> Repository : calls save()"));
        assert!(diagram.contains("class Repository {\n    + save()\n}"));
    }

    #[test]
    fn test_annotation_only_counts_in_its_own_method() {
        let files: BTreeMap<String, String> = [(
            "views.py".to_string(),
            "class View:\n    def show(self, store: Store):\n        return 1\n    def draw(self, store):\n        store.load()\n    def paint(self, store: Store):\n        store.load()\n".to_string(),
        )]
        .into_iter()
        .collect();

        let callers = method_callers(&files, "Store", "load");
        let view: Vec<&str> = callers["View"].iter().map(String::as_str).collect();
        assert_eq!(view, vec!["paint"]);
    }
}
