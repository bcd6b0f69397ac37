use tree_sitter::{Node, Parser, Tree};

use crate::error::{AtlasError, ParseFailure, Result};

/// Python-specific parser using Tree-sitter
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let python_language = tree_sitter_python::language();
        parser.set_language(&python_language)
            .map_err(|e| AtlasError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self { parser })
    }

    /// Parse dedented source into a syntax tree.
    ///
    /// Any ERROR or MISSING node makes the whole parse a failure, mirroring a
    /// strict compiler front end rather than tree-sitter's error recovery.
    pub fn parse(&mut self, source: &str) -> std::result::Result<ParsedSource, ParseFailure> {
        let text = dedent(source);
        let tree = self.parser.parse(&text, None)
            .ok_or_else(|| ParseFailure::new(1, "parser produced no tree"))?;

        if tree.root_node().has_error() {
            let line = first_error_line(tree.root_node()).unwrap_or(1);
            return Err(ParseFailure::new(line, "invalid Python syntax"));
        }

        Ok(ParsedSource { text, tree })
    }
}

/// Parse Python source with a throwaway parser.
pub fn parse_python(source: &str) -> std::result::Result<ParsedSource, ParseFailure> {
    let mut parser = PythonParser::new()
        .map_err(|e| ParseFailure::new(1, e.to_string()))?;
    parser.parse(source)
}

/// A successfully parsed source text together with its tree.
pub struct ParsedSource {
    text: String,
    tree: Tree,
}

impl ParsedSource {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// The dedented text the tree was built from
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn node_text(&self, node: Node) -> &str {
        &self.text[node.byte_range()]
    }
}

/// 0-based inclusive line span of a node.
///
/// Tree-sitter may end a node at column 0 of the following row; that row is
/// not part of the declaration.
pub fn line_span(node: Node) -> (usize, usize) {
    let start = node.start_position().row;
    let end = node.end_position();
    let end_row = if end.column == 0 && end.row > start { end.row - 1 } else { end.row };
    (start, end_row)
}

/// All named nodes under `node` (inclusive), in document order.
pub fn descendants<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut cursor = node.walk();

    'outer: loop {
        let current = cursor.node();
        if current.is_named() {
            out.push(current);
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'outer;
            }
            if !cursor.goto_parent() {
                break 'outer;
            }
        }
    }

    out
}

/// Named children, comments excluded.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Unwrap `decorated_definition` to the class or function it decorates.
pub fn definition_of(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

/// Decorators attached to a class or function definition.
pub fn decorators_of(definition: Node) -> Vec<Node> {
    match definition.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => named_children(parent)
            .into_iter()
            .filter(|child| child.kind() == "decorator")
            .collect(),
        _ => Vec::new(),
    }
}

/// Class and function definitions sitting directly in a block or module,
/// with decorators unwrapped.
pub fn direct_definitions<'t>(container: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    named_children(container)
        .into_iter()
        .map(definition_of)
        .filter(|node| node.kind() == kind)
        .collect()
}

/// Remove the whitespace prefix shared by every non-blank line.
///
/// Whitespace-only lines are emptied; the number of lines never changes, so
/// row numbers in the dedented text match the original text.
pub fn dedent(text: &str) -> String {
    let mut margin: Option<&str> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = &line[..line.len() - line.trim_start_matches(|c: char| c == ' ' || c == '\t').len()];
        margin = Some(match margin {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }

    let margin = margin.unwrap_or("");
    let mut out = String::with_capacity(text.len());

    for segment in text.split_inclusive('\n') {
        let body = segment.trim_end_matches(|c: char| c == '\n' || c == '\r');
        let ending = &segment[body.len()..];

        if body.trim().is_empty() {
            out.push_str(ending);
        } else {
            out.push_str(&body[margin.len()..]);
            out.push_str(ending);
        }
    }

    out
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a.bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}

fn first_error_line(root: Node) -> Option<usize> {
    let mut cursor = root.walk();

    'outer: loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'outer;
            }
            if !cursor.goto_parent() {
                break 'outer;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent_keeps_line_count() {
        let source = "    class A:\n\n        x = 1\n    \n";
        let dedented = dedent(source);
        assert_eq!(dedented, "class A:\n\n    x = 1\n\n");
        assert_eq!(dedented.lines().count(), source.lines().count());
    }

    #[test]
    fn test_dedent_without_margin_is_identity() {
        let source = "class A:\n    pass\n";
        assert_eq!(dedent(source), source);
    }

    #[test]
    fn test_parse_failure_reports_line() {
        let failure = parse_python("x = 1\ndef broken(:\n    pass\n").err().unwrap();
        assert_eq!(failure.line, 2);
    }

    #[test]
    fn test_indented_class_parses() {
        let parsed = parse_python("    class Inner:\n        def f(self):\n            return 1\n").unwrap();
        let classes: Vec<_> = descendants(parsed.root())
            .into_iter()
            .filter(|n| n.kind() == "class_definition")
            .collect();
        assert_eq!(classes.len(), 1);
        assert_eq!(line_span(classes[0]), (0, 2));
    }

    #[test]
    fn test_decorators_are_found_through_parent() {
        let parsed = parse_python("@dataclass\n@register\nclass A:\n    pass\n").unwrap();
        let class = direct_definitions(parsed.root(), "class_definition")[0];
        assert_eq!(decorators_of(class).len(), 2);
        assert_eq!(line_span(class), (2, 3));
    }
}
