// src/core/heuristics.rs - deployment and packaging signals of a checkout
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AtlasError, Result};
use super::reader::DirectoryReader;

/// Root-level scripts that usually start a Python application
pub const ENTRYPOINT_NAMES: [&str; 3] = ["manage.py", "cli.py", "__main__.py"];

const MAX_DOCKERFILE_DIRS: usize = 20;
const MAX_COMPOSE_SERVICES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiSignals {
    pub github_actions: bool,
    pub travis: bool,
}

/// What `pyproject.toml` declares about packaging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyprojectInsights {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub scripts: BTreeMap<String, String>,
    pub build_backend: Option<String>,
    pub build_requires: Vec<String>,
    /// Tables under `[tool]`, e.g. `poetry` or `pytest`
    pub tools: Vec<String>,
}

/// Cheap facts about how a project is built and deployed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHeuristics {
    pub entrypoints: Vec<String>,
    pub dockerfile: bool,
    pub docker_compose: bool,
    /// Directories holding a Dockerfile, `.` for the root
    pub dockerfiles: Vec<String>,
    pub dockerfile_count: usize,
    pub compose_services: Vec<String>,
    pub compose_service_count: usize,
    pub ci: CiSignals,
    pub dependencies: Vec<String>,
    pub pyproject: Option<PyprojectInsights>,
}

/// Collect heuristics for the checkout `reader` walks
pub fn collect_heuristics(reader: &DirectoryReader) -> Result<RepositoryHeuristics> {
    let root = reader.root();
    let files = reader.list_files()?;

    let entrypoints = ENTRYPOINT_NAMES.iter()
        .filter(|name| root.join(name).is_file())
        .map(|name| name.to_string())
        .collect();

    let dockerfile_dirs: Vec<String> = files.iter()
        .filter_map(|path| match path.rsplit_once('/') {
            Some((dir, "Dockerfile")) => Some(dir.to_string()),
            None if path == "Dockerfile" => Some(".".to_string()),
            _ => None,
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let compose_path = root.join("docker-compose.yml");
    let services = if compose_path.is_file() {
        compose_services(&std::fs::read_to_string(&compose_path)?)
    } else {
        Vec::new()
    };

    let mut dependencies = BTreeSet::new();
    for name in requirement_files(root)? {
        let text = std::fs::read_to_string(root.join(&name))?;
        dependencies.extend(parse_requirements(&text));
    }
    let setup_cfg = root.join("setup.cfg");
    if setup_cfg.is_file() {
        dependencies.extend(parse_setup_cfg_requires(&std::fs::read_to_string(setup_cfg)?));
    }

    let pyproject_path = root.join("pyproject.toml");
    let pyproject = if pyproject_path.is_file() {
        match parse_pyproject(&std::fs::read_to_string(&pyproject_path)?) {
            Ok(insights) => Some(insights),
            Err(e) => {
                warn!("Ignoring pyproject.toml: {}", e);
                None
            }
        }
    } else {
        None
    };

    let heuristics = RepositoryHeuristics {
        entrypoints,
        dockerfile: root.join("Dockerfile").is_file(),
        docker_compose: compose_path.is_file(),
        dockerfile_count: dockerfile_dirs.len(),
        dockerfiles: dockerfile_dirs.into_iter().take(MAX_DOCKERFILE_DIRS).collect(),
        compose_service_count: services.len(),
        compose_services: services.into_iter().take(MAX_COMPOSE_SERVICES).collect(),
        ci: CiSignals {
            github_actions: root.join(".github/workflows").is_dir(),
            travis: root.join(".travis.yml").is_file(),
        },
        dependencies: dependencies.into_iter().collect(),
        pyproject,
    };
    debug!("Heuristics for {}: {:?}", root.display(), heuristics);
    Ok(heuristics)
}

/// Service names of a docker-compose file, in file order. Unreadable YAML
/// yields no services.
pub fn compose_services(text: &str) -> Vec<String> {
    let document: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(document) => document,
        Err(e) => {
            warn!("Ignoring malformed docker-compose.yml: {}", e);
            return Vec::new();
        }
    };

    document.get("services")
        .and_then(serde_yaml::Value::as_mapping)
        .map(|services| services.keys().filter_map(|key| key.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Requirement lines with comments, blanks and pip options removed
pub fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .map(str::to_string)
        .collect()
}

/// `install_requires` of the `[options]` section, one entry per line or
/// comma-separated on the key line
pub fn parse_setup_cfg_requires(text: &str) -> Vec<String> {
    let mut requires = Vec::new();
    let mut in_options = false;
    let mut in_requires = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_options = trimmed == "[options]";
            in_requires = false;
            continue;
        }
        if !in_options || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let continuation = line.starts_with(|c: char| c.is_whitespace());
        if in_requires && continuation {
            requires.extend(split_requirement_list(trimmed));
            continue;
        }

        in_requires = false;
        if let Some((key, value)) = trimmed.split_once('=') {
            if key.trim() == "install_requires" {
                in_requires = true;
                requires.extend(split_requirement_list(value));
            }
        }
    }

    requires
}

fn split_requirement_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

fn requirement_files(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.starts_with("requirements") && name.ends_with(".txt") && entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Read the packaging tables of a `pyproject.toml`. PEP 621 and Poetry
/// layouts are both understood.
pub fn parse_pyproject(text: &str) -> Result<PyprojectInsights> {
    let document: toml::Table = toml::from_str(text)
        .map_err(|e| AtlasError::Config(format!("pyproject.toml: {}", e)))?;

    let project = document.get("project").and_then(toml::Value::as_table);
    let tool = document.get("tool").and_then(toml::Value::as_table);
    let poetry = tool.and_then(|tool| tool.get("poetry")).and_then(toml::Value::as_table);
    let build = document.get("build-system").and_then(toml::Value::as_table);

    let string_at = |table: Option<&toml::Table>, key: &str| {
        table.and_then(|t| t.get(key)).and_then(toml::Value::as_str).map(str::to_string)
    };

    let mut dependencies = string_list(project.and_then(|p| p.get("dependencies")));
    if let Some(poetry_deps) = poetry.and_then(|p| p.get("dependencies")).and_then(toml::Value::as_table) {
        dependencies.extend(poetry_deps.keys().filter(|name| *name != "python").cloned());
    }

    let mut scripts = BTreeMap::new();
    for table in [project, poetry] {
        if let Some(entries) = table.and_then(|t| t.get("scripts")).and_then(toml::Value::as_table) {
            for (name, target) in entries {
                if let Some(target) = target.as_str() {
                    scripts.insert(name.clone(), target.to_string());
                }
            }
        }
    }

    Ok(PyprojectInsights {
        name: string_at(project, "name").or_else(|| string_at(poetry, "name")),
        description: string_at(project, "description").or_else(|| string_at(poetry, "description")),
        dependencies,
        scripts,
        build_backend: string_at(build, "build-backend"),
        build_requires: string_list(build.and_then(|b| b.get("requires"))),
        tools: tool.map(|tool| tool.keys().cloned().collect()).unwrap_or_default(),
    })
}

fn string_list(value: Option<&toml::Value>) -> Vec<String> {
    value.and_then(toml::Value::as_array)
        .map(|items| items.iter().filter_map(toml::Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
