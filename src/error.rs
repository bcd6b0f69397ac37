use thiserror::Error;

/// Main error type for pyatlas operations
#[derive(Error, Debug)]
pub enum AtlasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    Classification(#[from] ClassificationFailure),

    #[error("Text generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),
}

/// Source text that could not be parsed into a clean syntax tree.
///
/// Always recovered by the component that hit it; the affected file or class
/// degrades to an empty result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse failure at line {line}: {message}")]
pub struct ParseFailure {
    /// 1-based line of the first syntax error
    pub line: usize,
    pub message: String,
}

impl ParseFailure {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// A segment whose relationship guess could not be turned into a usable map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("classification of segment {segment} for {class_name} failed after {attempts} attempt(s): {reason}")]
pub struct ClassificationFailure {
    pub class_name: String,
    pub segment: usize,
    pub attempts: usize,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, AtlasError>;
