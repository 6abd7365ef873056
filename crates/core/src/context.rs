//! The deployment context handed to a platform adapter
//!
//! The context is assembled in stages by [`ContextBuilder`]: inspection,
//! git clearance, and plugin resolution each contribute their part, and
//! `validate()` freezes the result. Nothing mutates a [`DeploymentContext`]
//! after it has been built.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::platforms::Platform;

/// How the project declares its dependencies. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyManager {
    /// Plain `requirements.txt`
    RequirementsTxt,
    /// Lockfile-based `Pipfile`
    Pipenv,
    /// Declarative `pyproject.toml` with a `[tool.poetry]` table
    Poetry,
}

impl DependencyManager {
    pub fn manifest_file_name(&self) -> &'static str {
        match self {
            DependencyManager::RequirementsTxt => "requirements.txt",
            DependencyManager::Pipenv => "Pipfile",
            DependencyManager::Poetry => "pyproject.toml",
        }
    }

    /// Suffix used to pick a template variant for this manager
    pub fn template_variant(&self) -> &'static str {
        match self {
            DependencyManager::RequirementsTxt => "req_txt",
            DependencyManager::Pipenv => "pipenv",
            DependencyManager::Poetry => "poetry",
        }
    }
}

/// Locations of every manifest the project could use, whether or not it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub requirements_txt: PathBuf,
    pub pipfile: PathBuf,
    pub pyproject_toml: PathBuf,
}

impl ManifestPaths {
    pub fn under(git_root: &Path) -> Self {
        Self {
            requirements_txt: git_root.join("requirements.txt"),
            pipfile: git_root.join("Pipfile"),
            pyproject_toml: git_root.join("pyproject.toml"),
        }
    }

    pub fn for_manager(&self, manager: DependencyManager) -> &Path {
        match manager {
            DependencyManager::RequirementsTxt => &self.requirements_txt,
            DependencyManager::Pipenv => &self.pipfile,
            DependencyManager::Poetry => &self.pyproject_toml,
        }
    }
}

/// Execution mode switches from the command line and config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionFlags {
    /// Create resources, commit, and push instead of only configuring files
    pub automate_all: bool,
    pub ignore_unclean_git: bool,
    pub no_logging: bool,
    /// Skip every remote call; only for the unit test harness
    pub unit_testing: bool,
    /// Answer confirmations automatically; only for the e2e harness
    pub e2e_testing: bool,
}

impl ExecutionFlags {
    /// Whether prompts are answered without waiting for the operator
    pub fn auto_confirm(&self) -> bool {
        self.unit_testing || self.e2e_testing
    }
}

/// Everything the project inspector learned from the local tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectInspection {
    pub local_project_name: String,
    pub project_root: PathBuf,
    pub git_root: PathBuf,
    /// True when `.git` lives in the parent of the project root
    pub nested: bool,
    pub settings_path: PathBuf,
    pub dependency_manager: DependencyManager,
    pub manifests: ManifestPaths,
    /// Package names already declared, without version specifiers
    pub requirements: Vec<String>,
}

impl ProjectInspection {
    pub fn manifest_path(&self) -> &Path {
        self.manifests.for_manager(self.dependency_manager)
    }
}

/// How the git safety gate was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitClearance {
    /// The working tree only held changes simple-deploy made itself
    Clean,
    /// The check was skipped with --ignore-unclean-git
    Overridden,
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct DeploymentContext {
    pub local_project_name: String,
    /// Name requested by the operator; adapters may still be assigned another by the platform
    pub deployed_project_name: Option<String>,
    pub region: Option<String>,
    pub project_root: PathBuf,
    pub git_root: PathBuf,
    pub nested: bool,
    pub settings_path: PathBuf,
    pub dependency_manager: DependencyManager,
    pub manifests: ManifestPaths,
    pub requirements: Vec<String>,
    /// The run's log directory did not exist before this run
    pub log_dir_created: bool,
    pub git_clearance: GitClearance,
    pub platform: Platform,
    pub flags: ExecutionFlags,
}

impl DeploymentContext {
    pub fn manifest_path(&self) -> &Path {
        self.manifests.for_manager(self.dependency_manager)
    }

    pub fn automate_all(&self) -> bool {
        self.flags.automate_all
    }

    pub fn unit_testing(&self) -> bool {
        self.flags.unit_testing
    }

    /// Directory holding the settings module, e.g. `<project_root>/blog`
    pub fn settings_dir(&self) -> &Path {
        self.settings_path.parent().unwrap_or(&self.project_root)
    }
}

/// Type state for a context still being assembled
pub struct Unvalidated;

/// Type state for a context whose required fields have been checked
pub struct Validated;

/// Staged builder for [`DeploymentContext`].
pub struct ContextBuilder<State = Unvalidated> {
    flags: ExecutionFlags,
    deployed_project_name: Option<String>,
    region: Option<String>,
    inspection: Option<ProjectInspection>,
    git_clearance: Option<GitClearance>,
    platform: Option<Platform>,
    log_dir_created: bool,
    _phantom: PhantomData<State>,
}

impl ContextBuilder<Unvalidated> {
    pub fn new(flags: ExecutionFlags) -> Self {
        Self {
            flags,
            deployed_project_name: None,
            region: None,
            inspection: None,
            git_clearance: None,
            platform: None,
            log_dir_created: false,
            _phantom: PhantomData,
        }
    }

    pub fn with_deployed_project_name(mut self, name: Option<String>) -> Self {
        self.deployed_project_name = name;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_inspection(mut self, inspection: ProjectInspection) -> Self {
        self.inspection = Some(inspection);
        self
    }

    pub fn with_git_clearance(mut self, clearance: GitClearance) -> Self {
        self.git_clearance = Some(clearance);
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_log_dir_created(mut self, created: bool) -> Self {
        self.log_dir_created = created;
        self
    }

    /// Check every required field and transition to the validated state.
    pub fn validate(self) -> Result<ContextBuilder<Validated>> {
        let inspection = self
            .inspection
            .as_ref()
            .ok_or_else(|| Error::InvalidContext("project has not been inspected".into()))?;

        if inspection.local_project_name.trim().is_empty() {
            return Err(Error::InvalidContext(
                "local project name could not be determined".into(),
            ));
        }
        if !inspection.settings_path.is_file() {
            return Err(Error::InvalidContext(format!(
                "settings file {} does not exist",
                inspection.settings_path.display()
            )));
        }
        if !inspection.manifest_path().is_file() {
            return Err(Error::InvalidContext(format!(
                "dependency manifest {} does not exist",
                inspection.manifest_path().display()
            )));
        }
        if self.git_clearance.is_none() {
            return Err(Error::InvalidContext(
                "git working tree has not been checked".into(),
            ));
        }
        if self.platform.is_none() {
            return Err(Error::InvalidContext("no platform plugin resolved".into()));
        }
        for (label, value) in [
            ("deployed project name", &self.deployed_project_name),
            ("region", &self.region),
        ] {
            if let Some(value) = value {
                if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                    return Err(Error::InvalidContext(format!(
                        "{label} `{value}` must be a single word"
                    )));
                }
            }
        }

        Ok(ContextBuilder {
            flags: self.flags,
            deployed_project_name: self.deployed_project_name,
            region: self.region,
            inspection: self.inspection,
            git_clearance: self.git_clearance,
            platform: self.platform,
            log_dir_created: self.log_dir_created,
            _phantom: PhantomData,
        })
    }
}

impl ContextBuilder<Validated> {
    /// Freeze the context. Only reachable through `validate()`.
    pub fn build(self) -> DeploymentContext {
        let (Some(inspection), Some(git_clearance), Some(platform)) =
            (self.inspection, self.git_clearance, self.platform)
        else {
            unreachable!("validate() guarantees inspection, clearance, and platform");
        };

        DeploymentContext {
            local_project_name: inspection.local_project_name,
            deployed_project_name: self.deployed_project_name,
            region: self.region,
            project_root: inspection.project_root,
            git_root: inspection.git_root,
            nested: inspection.nested,
            settings_path: inspection.settings_path,
            dependency_manager: inspection.dependency_manager,
            manifests: inspection.manifests,
            requirements: inspection.requirements,
            log_dir_created: self.log_dir_created,
            git_clearance,
            platform,
            flags: self.flags,
        }
    }
}
