//! Structural analysis of Python source collections: structure-preserving
//! splitting, class dependency graphs, importance ranking, module grouping
//! and relationship classification.

pub mod config;
pub mod core;
pub mod error;

pub use config::Config;
pub use error::{AtlasError, Result};
