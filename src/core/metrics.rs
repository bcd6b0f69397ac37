// src/core/metrics.rs
use serde::{Deserialize, Serialize};

use super::classes::{class_attributes, direct_methods, first_class};
use super::languages::{self, descendants};

/// Node kinds that open a new path through the code
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
];

/// Syntactic size and shape of one class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Function declarations directly in the class body
    pub methods: usize,
    /// Call expressions anywhere in the source
    pub calls: usize,
    pub attributes: usize,
    /// 1 + branching constructs
    pub complexity: usize,
    /// Newline count + 1
    pub lines: usize,
}

impl ClassMetrics {
    /// Measure a class source. Unparsable source measures as all zeros.
    pub fn compute(class_source: &str) -> Self {
        let Ok(parsed) = languages::parse_python(class_source) else {
            return Self::default();
        };

        let nodes = descendants(parsed.root());
        let calls = nodes.iter().filter(|n| n.kind() == "call").count();
        let branches = nodes.iter().filter(|n| BRANCH_KINDS.contains(&n.kind())).count();

        let (methods, attributes) = match first_class(&parsed) {
            Some(class) => (direct_methods(class).len(), class_attributes(&parsed, class).len()),
            None => (0, 0),
        };

        Self {
            methods,
            calls,
            attributes,
            complexity: 1 + branches,
            lines: class_source.matches('\n').count() + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: &str = r#"class Service:
    retries = 3

    def __init__(self, client):
        self.client = client
        self.log = make_logger()

    def run(self, items):
        for item in items:
            if item.ready:
                self.client.send(item)
            elif item.stale:
                continue
        while self.pending():
            try:
                with self.lock:
                    self.flush()
            except Exception:
                pass

        def nested():
            return 1
        return nested()
"#;

    #[test]
    fn test_counts_each_metric() {
        let metrics = ClassMetrics::compute(SERVICE);
        assert_eq!(metrics.methods, 2);
        assert_eq!(metrics.calls, 5);
        assert_eq!(metrics.attributes, 3);
        // for, if, elif, while, try, with
        assert_eq!(metrics.complexity, 7);
        assert_eq!(metrics.lines, SERVICE.matches('\n').count() + 1);
    }

    #[test]
    fn test_trivial_class() {
        let metrics = ClassMetrics::compute("class Animal:\n    pass");
        assert_eq!(metrics, ClassMetrics {
            methods: 0,
            calls: 0,
            attributes: 0,
            complexity: 1,
            lines: 2,
        });
    }

    #[test]
    fn test_parse_failure_is_all_zero() {
        assert_eq!(ClassMetrics::compute("class Broken(:\n    pass\n"), ClassMetrics::default());
    }
}
