//! `.zeileproj` bundles.
//!
//! A bundle is a directory holding `Code/Project.json`, the `.zeile` phases
//! listed there, and an optional `Assets/` folder.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Locale, ProjectConfig, ProjectMetadata};
use crate::processor::BuildOptions;

pub const BUNDLE_EXTENSION: &str = "zeileproj";
pub const CODE_DIR: &str = "Code";
pub const ASSETS_DIR: &str = "Assets";
pub const CONFIG_FILE: &str = "Project.json";

const STARTER_PHASE: &str = "Main.zeile";
const STARTER_SOURCE: &str = "narrate(\"Once upon a time...\")\n";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{0} is not a .zeileproj bundle")]
    NotABundle(PathBuf),
    #[error("missing project configuration {0}")]
    MissingConfig(PathBuf),
    #[error("invalid project configuration {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("code phase '{0}' is listed in the project but its file is missing")]
    MissingPhase(String),
    #[error("code phase '{0}' is listed more than once")]
    DuplicatePhase(String),
    #[error("'{0}' is not a valid file name")]
    InvalidName(String),
    #[error("{0} already exists")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A loaded project bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        if !path.is_dir() || path.extension().is_none_or(|ext| ext != BUNDLE_EXTENSION) {
            return Err(ProjectError::NotABundle(path.to_path_buf()));
        }
        let config_path = path.join(CODE_DIR).join(CONFIG_FILE);
        let json = match fs::read_to_string(&config_path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ProjectError::MissingConfig(config_path));
            }
            Err(e) => return Err(e.into()),
        };
        let config: ProjectConfig =
            serde_json::from_str(&json).map_err(|source| ProjectError::Config {
                path: config_path.clone(),
                source,
            })?;
        let mut seen = HashSet::new();
        for phase in &config.code_phases {
            validate_file_name(phase)?;
            if !seen.insert(phase.as_str()) {
                return Err(ProjectError::DuplicatePhase(phase.clone()));
            }
        }
        debug!(project = %config.metadata.project_name, phases = config.code_phases.len(), "loaded project");
        Ok(Self {
            root: path.to_path_buf(),
            config,
        })
    }

    /// Scaffolds `<parent>/<name>.zeileproj` with one starter phase.
    pub fn create(parent: &Path, name: &str, locale: Locale) -> Result<Self, ProjectError> {
        validate_file_name(name)?;
        let root = parent.join(format!("{name}.{BUNDLE_EXTENSION}"));
        if root.exists() {
            return Err(ProjectError::AlreadyExists(root));
        }
        fs::create_dir_all(root.join(CODE_DIR))?;
        fs::create_dir_all(root.join(ASSETS_DIR))?;
        fs::write(root.join(CODE_DIR).join(STARTER_PHASE), STARTER_SOURCE)?;

        let project = Self {
            root,
            config: ProjectConfig {
                metadata: ProjectMetadata {
                    locale,
                    project_name: name.to_string(),
                    ..ProjectMetadata::default()
                },
                code_phases: vec![STARTER_PHASE.to_string()],
            },
        };
        project.save()?;
        info!(path = %project.root.display(), "created project");
        Ok(project)
    }

    /// Writes the configuration back to `Code/Project.json`.
    pub fn save(&self) -> Result<(), ProjectError> {
        let path = self.config_path();
        let json = serde_json::to_string_pretty(&self.config)
            .map_err(|source| ProjectError::Config {
                path: path.clone(),
                source,
            })?;
        fs::write(path, json + "\n")?;
        Ok(())
    }

    /// Appends a new phase file at the end of the link order.
    pub fn add_phase(&mut self, file_name: &str, source: &str) -> Result<(), ProjectError> {
        validate_file_name(file_name)?;
        let path = self.code_dir().join(file_name);
        if path.exists() || self.config.code_phases.iter().any(|p| p == file_name) {
            return Err(ProjectError::AlreadyExists(path));
        }
        fs::write(&path, source)?;
        self.config.code_phases.push(file_name.to_string());
        self.save()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.config.metadata.project_name
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ProjectMetadata {
        &self.config.metadata
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join(CODE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.code_dir().join(CONFIG_FILE)
    }

    /// The asset folder, if the bundle has one.
    pub fn asset_dir(&self) -> Option<PathBuf> {
        let dir = self.root.join(ASSETS_DIR);
        dir.is_dir().then_some(dir)
    }

    /// `(file name, source)` of every phase in link order.
    pub fn read_phases(&self) -> Result<Vec<(String, String)>, ProjectError> {
        let code_dir = self.code_dir();
        self.config
            .code_phases
            .iter()
            .map(|name| match fs::read_to_string(code_dir.join(name)) {
                Ok(source) => Ok((name.clone(), source)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Err(ProjectError::MissingPhase(name.clone()))
                }
                Err(e) => Err(e.into()),
            })
            .collect()
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            metadata: self.config.metadata.clone(),
            asset_folder: self.asset_dir(),
        }
    }
}

pub(crate) fn validate_file_name(name: &str) -> Result<(), ProjectError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(ProjectError::InvalidName(name.to_string()));
    }
    Ok(())
}
