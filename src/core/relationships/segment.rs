use tracing::debug;

use crate::core::classes::first_class;
use crate::core::languages::{self, definition_of, line_span, named_children};

/// Unique `import` / `from` lines of a file, in order of appearance.
pub fn find_imports(source: &str) -> Vec<String> {
    let mut imports: Vec<String> = Vec::new();
    for line in source.lines() {
        let stripped = line.trim();
        if (stripped.starts_with("import ") || stripped.starts_with("from "))
            && !imports.iter().any(|seen| seen == line)
        {
            imports.push(line.to_string());
        }
    }
    imports
}

/// Cut a class into segments of at most `max_lines` lines for classification.
///
/// Segments break only between methods: the class header opens the first
/// segment, whole methods are packed greedily and whatever follows the last
/// method closes it. A single method longer than the limit becomes its own
/// oversized segment. Source that does not parse, or a class without
/// methods, is cut into fixed-size chunks instead. Every segment is prefixed
/// with the import lines of `file_source`.
pub fn segment_class(class_source: &str, file_source: &str, max_lines: usize) -> Vec<String> {
    let max_lines = max_lines.max(1);
    let lines: Vec<&str> = class_source.lines().collect();

    let segments = if lines.len() <= max_lines {
        vec![class_source.to_string()]
    } else {
        match method_starts(class_source) {
            Some((starts, last_end)) if !starts.is_empty() => pack_methods(&lines, &starts, last_end, max_lines),
            _ => {
                debug!("Falling back to fixed-size segments");
                lines.chunks(max_lines).map(|chunk| chunk.join("\n")).collect()
            }
        }
    };

    let imports = find_imports(file_source).join("\n");
    if imports.is_empty() {
        return segments;
    }
    segments.into_iter()
        .map(|segment| {
            if segment.contains(&imports) {
                segment
            } else {
                format!("{}\n\n{}", imports, segment)
            }
        })
        .collect()
}

/// First line of every direct method (decorators included) and the last line
/// of the final one.
fn method_starts(class_source: &str) -> Option<(Vec<usize>, usize)> {
    let parsed = languages::parse_python(class_source).ok()?;
    let class = first_class(&parsed)?;
    let body = class.child_by_field_name("body")?;

    let spans: Vec<(usize, usize)> = named_children(body)
        .into_iter()
        .filter(|child| definition_of(*child).kind() == "function_definition")
        .map(line_span)
        .collect();

    let last_end = spans.last().map_or(0, |span| span.1);
    Some((spans.into_iter().map(|span| span.0).collect(), last_end))
}

fn pack_methods(lines: &[&str], starts: &[usize], last_end: usize, max_lines: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = lines[..starts[0]].to_vec();
    while current.last().is_some_and(|line| line.trim().is_empty()) {
        current.pop();
    }

    let tail_start = (last_end + 1).min(lines.len());
    for (i, &start) in starts.iter().enumerate() {
        // each method owns the blank lines and class-level statements up to the next one
        let end = starts.get(i + 1).copied().unwrap_or(tail_start);
        let method = &lines[start..end];

        if current.len() + method.len() <= max_lines {
            current.extend_from_slice(method);
        } else {
            if !current.is_empty() {
                segments.push(current.join("\n"));
            }
            current = method.to_vec();
        }
    }

    let tail = &lines[tail_start..];
    if !tail.is_empty() {
        if current.len() + tail.len() <= max_lines {
            current.extend_from_slice(tail);
        } else {
            if !current.is_empty() {
                segments.push(current.join("\n"));
            }
            current = tail.to_vec();
        }
    }

    if !current.is_empty() {
        segments.push(current.join("\n"));
    }
    segments
}
