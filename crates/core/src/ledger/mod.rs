//! Dependency manifests: reading declared packages and appending new ones
//!
//! Three formats are supported (requirements.txt, Pipfile, Poetry's
//! pyproject.toml). Each only ever gains lines: existing entries are never
//! rewritten, and every line simple-deploy adds carries [`ADDED_BY_MARKER`].

mod pipfile;
mod poetry;
mod requirements_txt;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::context::{DependencyManager, DeploymentContext};
use crate::error::Result;
use crate::files;

/// Trailing comment identifying lines written by simple-deploy
pub const ADDED_BY_MARKER: &str = "# Added by simple-deploy.";

/// Normalize a package name: lowercase, with runs of `-`, `_`, `.` collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_separator = true;
            continue;
        }
        if pending_separator && !normalized.is_empty() {
            normalized.push('-');
        }
        pending_separator = false;
        normalized.extend(c.to_lowercase());
    }
    normalized
}

/// Read the package names declared in a manifest, without version specifiers.
pub fn read_requirements(manager: DependencyManager, path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    match manager {
        DependencyManager::RequirementsTxt => Ok(requirements_txt::parse(&contents)),
        DependencyManager::Pipenv => pipfile::parse(&contents),
        DependencyManager::Poetry => poetry::parse(&contents),
    }
}

/// A dependency manifest plus the names it already declares.
#[derive(Debug, Clone)]
pub struct DependencyLedger {
    manager: DependencyManager,
    path: PathBuf,
    requirements: Vec<String>,
}

impl DependencyLedger {
    pub fn new(manager: DependencyManager, path: PathBuf, requirements: Vec<String>) -> Self {
        let mut ledger = Self {
            manager,
            path,
            requirements: Vec::new(),
        };
        for name in requirements {
            ledger.remember(&name);
        }
        ledger
    }

    /// Load a ledger by reading the manifest at `path`.
    pub fn load(manager: DependencyManager, path: PathBuf) -> Result<Self> {
        let requirements = read_requirements(manager, &path)?;
        Ok(Self::new(manager, path, requirements))
    }

    pub fn from_context(context: &DeploymentContext) -> Self {
        Self::new(
            context.dependency_manager,
            context.manifest_path().to_path_buf(),
            context.requirements.clone(),
        )
    }

    pub fn manager(&self) -> DependencyManager {
        self.manager
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    /// Whether `name` is declared under any version constraint.
    pub fn is_present(&self, name: &str) -> bool {
        let wanted = normalize_name(name);
        self.requirements.iter().any(|existing| *existing == wanted)
    }

    /// Make sure `name` is declared, appending it with `version_constraint` if it is not.
    ///
    /// Returns `true` when the manifest was changed.
    pub fn ensure_package(&mut self, name: &str, version_constraint: &str) -> Result<bool> {
        if self.is_present(name) {
            info!("  Found {} in {}", name, self.manager.manifest_file_name());
            return Ok(false);
        }

        let contents = fs::read_to_string(&self.path)?;
        let updated = match self.manager {
            DependencyManager::RequirementsTxt => {
                requirements_txt::append(&contents, name, version_constraint)
            }
            DependencyManager::Pipenv => pipfile::append(&contents, name, version_constraint),
            DependencyManager::Poetry => poetry::append(&contents, name, version_constraint)?,
        };
        files::write_atomic(&self.path, &updated)?;

        self.remember(name);
        info!("  Added {} to {}", name, self.manager.manifest_file_name());
        Ok(true)
    }

    fn remember(&mut self, name: &str) {
        let normalized = normalize_name(name);
        if !normalized.is_empty() && !self.requirements.contains(&normalized) {
            self.requirements.push(normalized);
        }
    }
}
