use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use pyatlas::core::Engine;

#[derive(Parser)]
#[command(name = "pyatlas")]
#[command(about = "Structural analysis for Python codebases")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Checkout to analyze (overrides project.source_dir)
    #[arg(short, long, global = true)]
    pub source: Option<PathBuf>,

    /// Write results to this file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default pyatlas.toml
    Init {
        /// Target file (defaults to ./pyatlas.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Split one file into structure-preserving blocks
    Split {
        /// File to split
        file: PathBuf,
    },

    /// Class dependency graph
    Graph,

    /// Module-level dependency graph
    Modules,

    /// Most important classes
    Rank,

    /// Full analysis report
    Analyze,

    /// Relationships of one class to the rest of the project
    Relationships {
        /// Class name
        class: String,
    },

    /// PlantUML class diagram of the most important classes
    Diagram,

    /// PlantUML diagram of the classes calling a method
    Callers {
        /// Class declaring the method
        class: String,

        /// Method name
        method: String,
    },

    /// Deployment and packaging signals (Dockerfiles, CI, dependencies)
    Heuristics,

    /// Most likely architectural pattern of the project
    Architecture,

    /// Markdown documentation for every block plus a README
    Docs {
        /// Output directory (defaults to docs.output_dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Markdown descriptions of the most important classes
    Describe,
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        let output = self.output.as_deref();
        match self.command {
            Commands::Init { path, force } => {
                engine.init(path, force).await
            }
            Commands::Split { file } => {
                Engine::emit_json(&engine.split(&file)?, output)
            }
            Commands::Graph => {
                Engine::emit_json(&engine.graph()?, output)
            }
            Commands::Modules => {
                Engine::emit_json(&engine.modules()?, output)
            }
            Commands::Rank => {
                Engine::emit_json(&engine.rank()?, output)
            }
            Commands::Analyze => {
                Engine::emit_json(&engine.analyze()?, output)
            }
            Commands::Relationships { class } => {
                Engine::emit_json(&engine.relationships(&class).await?, output)
            }
            Commands::Diagram => {
                Engine::emit_text(&engine.diagram().await?, output)
            }
            Commands::Callers { class, method } => {
                Engine::emit_text(&engine.callers(&class, &method)?, output)
            }
            Commands::Heuristics => {
                Engine::emit_json(&engine.heuristics()?, output)
            }
            Commands::Architecture => {
                Engine::emit_json(&engine.architecture().await?, output)
            }
            Commands::Docs { out_dir } => {
                let written = engine.docs(out_dir).await?;
                let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
                Engine::emit_json(&paths, output)
            }
            Commands::Describe => {
                Engine::emit_text(&engine.describe().await?, output)
            }
        }
    }
}
