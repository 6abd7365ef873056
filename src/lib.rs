//! Fixtures for the integration tests: a sample Django project in a
//! temporary directory, its git repository, and a fake Python environment
//! with platform plugins installed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;

/// Python environment directory created inside the sample project
pub const VENV_DIR: &str = "venv";

const MANAGE_PY: &str = r#"#!/usr/bin/env python
"""Django's command-line utility for administrative tasks."""
import os
import sys


def main():
    os.environ.setdefault("DJANGO_SETTINGS_MODULE", "blog.settings")
    from django.core.management import execute_from_command_line

    execute_from_command_line(sys.argv)


if __name__ == "__main__":
    main()
"#;

const SETTINGS_PY: &str = r#"from pathlib import Path

BASE_DIR = Path(__file__).resolve().parent.parent

SECRET_KEY = "django-insecure-sample-project-key"

DEBUG = True

ALLOWED_HOSTS = []

INSTALLED_APPS = [
    "blogs",
    "django_simple_deploy",
    "django.contrib.admin",
    "django.contrib.auth",
    "django.contrib.contenttypes",
    "django.contrib.sessions",
    "django.contrib.messages",
    "django.contrib.staticfiles",
]

ROOT_URLCONF = "blog.urls"

WSGI_APPLICATION = "blog.wsgi.application"

DATABASES = {
    "default": {
        "ENGINE": "django.db.backends.sqlite3",
        "NAME": BASE_DIR / "db.sqlite3",
    }
}

STATIC_URL = "static/"
"#;

const URLS_PY: &str = r#"from django.contrib import admin
from django.urls import path

urlpatterns = [
    path("admin/", admin.site.urls),
]
"#;

const WSGI_PY: &str = r#"import os

from django.core.wsgi import get_wsgi_application

os.environ.setdefault("DJANGO_SETTINGS_MODULE", "blog.settings")

application = get_wsgi_application()
"#;

const REQUIREMENTS_TXT: &str = "asgiref==3.8.1\nDjango==5.0.6\nsqlparse==0.5.0\n";

const PIPFILE: &str = r#"[[source]]
url = "https://pypi.org/simple"
verify_ssl = true
name = "pypi"

[packages]
django = "==5.0.6"

[dev-packages]

[requires]
python_version = "3.12"
"#;

const PYPROJECT_TOML: &str = r#"[tool.poetry]
name = "blog"
version = "0.1.0"
description = "Sample blog"
authors = ["Sample Author <author@example.com>"]

[tool.poetry.dependencies]
python = "^3.12"
Django = "5.0.6"

[build-system]
requires = ["poetry-core"]
build-backend = "poetry.core.masonry.api"
"#;

const GITIGNORE: &str = "__pycache__/\n*.pyc\ndb.sqlite3\nvenv/\n";

/// Dependency manifest the sample project declares its packages in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manifest {
    RequirementsTxt,
    Pipfile,
    Poetry,
}

impl Manifest {
    pub const ALL: [Manifest; 3] = [Manifest::RequirementsTxt, Manifest::Pipfile, Manifest::Poetry];

    pub fn file_name(self) -> &'static str {
        match self {
            Manifest::RequirementsTxt => "requirements.txt",
            Manifest::Pipfile => "Pipfile",
            Manifest::Poetry => "pyproject.toml",
        }
    }

    fn contents(self) -> &'static str {
        match self {
            Manifest::RequirementsTxt => REQUIREMENTS_TXT,
            Manifest::Pipfile => PIPFILE,
            Manifest::Poetry => PYPROJECT_TOML,
        }
    }
}

/// A Django project named `blog` in a temporary directory.
pub struct SampleProject {
    _dir: TempDir,
    root: PathBuf,
}

impl SampleProject {
    /// Write the project with a `.git` directory marker but no real repository.
    pub fn new(manifest: Manifest) -> Result<Self> {
        let project = Self::scaffold(manifest)?;
        fs::create_dir_all(project.root.join(".git"))?;
        Ok(project)
    }

    /// Write the project and commit it to a real git repository.
    pub fn with_git(manifest: Manifest) -> Result<Self> {
        let project = Self::scaffold(manifest)?;
        project.git(&["init", "--quiet"])?;
        project.commit_all("Initial commit.")?;
        Ok(project)
    }

    fn scaffold(manifest: Manifest) -> Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path().canonicalize()?;
        let project = Self { _dir: dir, root };

        project.write("manage.py", MANAGE_PY)?;
        project.write("blog/__init__.py", "")?;
        project.write("blog/settings.py", SETTINGS_PY)?;
        project.write("blog/urls.py", URLS_PY)?;
        project.write("blog/wsgi.py", WSGI_PY)?;
        project.write(manifest.file_name(), manifest.contents())?;
        project.write(".gitignore", GITIGNORE)?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.path(relative);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Install a fake distribution into the sample project's virtual environment.
    ///
    /// Returns the virtual environment's directory.
    pub fn install_plugin(&self, distribution: &str) -> Result<PathBuf> {
        let site_packages = self.site_packages();
        let dist_info = site_packages.join(format!("{}-1.0.0.dist-info", distribution.replace('-', "_")));
        fs::create_dir_all(&dist_info)?;
        fs::write(
            dist_info.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {distribution}\nVersion: 1.0.0\n"),
        )?;
        Ok(self.path(VENV_DIR))
    }

    pub fn site_packages(&self) -> PathBuf {
        self.path(VENV_DIR).join("lib").join("python3.12").join("site-packages")
    }

    /// Run git in the project root and return its stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(["-c", "user.name=Sample Author", "-c", "user.email=author@example.com"])
            .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
            .args(args)
            .current_dir(&self.root)
            .output()
            .context("Failed to run git")?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "--all"])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    /// Files `git status --porcelain` reports.
    pub fn git_status(&self) -> Result<String> {
        self.git(&["status", "--porcelain"])
    }

    /// Log files written under `simple_deploy_logs/`.
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.path("simple_deploy_logs");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut logs: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
            .collect();
        logs.sort();
        Ok(logs)
    }
}

/// Whether git is installed; tests that need a real repository skip without it.
pub fn git_available() -> bool {
    which::which("git").is_ok()
}
