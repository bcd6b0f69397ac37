//! Language front ends.
//!
//! Python is the only language with structural support; everything else is
//! treated as opaque text by the splitter.

mod python;

pub use python::{
    PythonParser, ParsedSource, parse_python, descendants, named_children,
    definition_of, decorators_of, direct_definitions, line_span
};

/// File extensions handled by the Python front end
pub const PYTHON_EXTENSIONS: &[&str] = &["py"];

/// Whether a path names a Python source file
pub fn is_python_path(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| PYTHON_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}
