//! Read-only inspection of the local Django project and its repository

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::context::{DependencyManager, ManifestPaths, ProjectInspection};
use crate::error::{Error, Result};
use crate::ledger;

/// Suffix stripped from `ROOT_URLCONF` to get the local project name
pub const URLCONF_SUFFIX: &str = ".urls";

static SETTINGS_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"DJANGO_SETTINGS_MODULE["']\s*,\s*["']([\w.]+)["']"#).expect("valid regex")
});

static ROOT_URLCONF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*ROOT_URLCONF\s*=\s*["']([\w.]+)["']"#).expect("valid regex")
});

/// Detect which dependency manager a repository uses.
pub trait DependencyManagerDetector {
    fn detect(git_root: &Path) -> Option<DependencyManager>;
}

pub struct DefaultDependencyManagerDetector;

impl DependencyManagerDetector for DefaultDependencyManagerDetector {
    fn detect(git_root: &Path) -> Option<DependencyManager> {
        let manifests = ManifestPaths::under(git_root);

        // Most specific format first: a Pipfile project often still carries a requirements.txt
        if manifests.pipfile.is_file() {
            return Some(DependencyManager::Pipenv);
        }

        if manifests.pyproject_toml.is_file() && has_poetry_table(&manifests.pyproject_toml) {
            return Some(DependencyManager::Poetry);
        }

        if manifests.requirements_txt.is_file() {
            return Some(DependencyManager::RequirementsTxt);
        }

        None
    }
}

fn has_poetry_table(pyproject: &Path) -> bool {
    fs::read_to_string(pyproject)
        .map(|contents| contents.lines().any(|line| line.trim() == "[tool.poetry]"))
        .unwrap_or(false)
}

/// Find the repository root: the project root itself, or its immediate parent.
///
/// Returns the git root and whether the layout is nested.
pub fn find_git_root(project_root: &Path) -> Option<(PathBuf, bool)> {
    if project_root.join(".git").exists() {
        return Some((project_root.to_path_buf(), false));
    }
    let parent = project_root.parent()?;
    if parent.join(".git").exists() {
        return Some((parent.to_path_buf(), true));
    }
    None
}

/// Locate the settings module named in `manage.py`.
pub fn find_settings_path(project_root: &Path) -> Result<PathBuf> {
    let manage_py = project_root.join("manage.py");
    let source = fs::read_to_string(&manage_py).map_err(|_| {
        Error::ProjectStructure(format!(
            "could not read {}. Run simple-deploy from the directory that contains manage.py.",
            manage_py.display()
        ))
    })?;

    let module = SETTINGS_MODULE_RE
        .captures(&source)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            Error::ProjectStructure(format!(
                "{} does not set DJANGO_SETTINGS_MODULE",
                manage_py.display()
            ))
        })?;
    debug!("Settings module: {}", module);

    let relative: PathBuf = module.split('.').collect();
    let as_file = project_root.join(&relative).with_extension("py");
    if as_file.is_file() {
        return Ok(as_file);
    }
    let as_package = project_root.join(&relative).join("__init__.py");
    if as_package.is_file() {
        return Ok(as_package);
    }

    Err(Error::ProjectStructure(format!(
        "settings module `{module}` was not found under {}",
        project_root.display()
    )))
}

/// Derive the local project name from the settings' `ROOT_URLCONF`.
pub fn local_project_name(settings_source: &str) -> Option<String> {
    let urlconf = ROOT_URLCONF_RE.captures(settings_source)?.get(1)?.as_str();
    let name = urlconf.strip_suffix(URLCONF_SUFFIX).unwrap_or(urlconf);
    Some(name.to_string())
}

/// Inspect the project rooted at `project_root`.
pub fn inspect(project_root: &Path) -> Result<ProjectInspection> {
    info!("Inspecting project at {}", project_root.display());

    let (git_root, nested) =
        find_git_root(project_root).ok_or_else(|| Error::NoGitRepository {
            project_root: project_root.to_path_buf(),
        })?;
    if nested {
        info!("Found .git/ in the parent directory; using a nested layout");
    }

    let settings_path = find_settings_path(project_root)?;
    let settings_source = fs::read_to_string(&settings_path)?;
    let local_project_name = local_project_name(&settings_source).ok_or_else(|| {
        Error::ProjectStructure(format!(
            "could not find ROOT_URLCONF in {}",
            settings_path.display()
        ))
    })?;
    info!("Local project name: {}", local_project_name);

    let dependency_manager = DefaultDependencyManagerDetector::detect(&git_root)
        .ok_or_else(|| Error::NoDependencyManagerDetected {
            git_root: git_root.clone(),
        })?;
    info!(
        "Dependency management system: {}",
        dependency_manager.manifest_file_name()
    );

    let manifests = ManifestPaths::under(&git_root);
    let requirements =
        ledger::read_requirements(dependency_manager, manifests.for_manager(dependency_manager))?;
    debug!("Existing requirements: {:?}", requirements);

    Ok(ProjectInspection {
        local_project_name,
        project_root: project_root.to_path_buf(),
        git_root,
        nested,
        settings_path,
        dependency_manager,
        manifests,
        requirements,
    })
}
