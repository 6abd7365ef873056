//! Optional project configuration file
//!
//! `.simple-deploy.toml` (or `simple-deploy.toml`) is looked up from the
//! project root towards the filesystem root; the first one found wins.
//! Command line flags take precedence over every key in it.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use simple_deploy_core::{ExecutionFlags, Platform, RunOptions};

use crate::cli::Cli;

pub const CONFIG_FILE_NAMES: &[&str] = &[".simple-deploy.toml", "simple-deploy.toml"];

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub platform: Option<String>,
    pub deployed_project_name: Option<String>,
    pub region: Option<String>,
    pub automate_all: bool,
    pub no_logging: bool,
    pub ignore_unclean_git: bool,
}

/// Find the nearest config file at or above `start`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Load the nearest config file, or defaults when there is none.
pub fn load(project_root: &Path) -> Result<FileConfig> {
    let Some(path) = find_config_file(project_root) else {
        return Ok(FileConfig::default());
    };
    debug!("Loading config from {}", path.display());
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Combine command line flags with the config file into options for one run.
pub fn merge(cli: &Cli, file: FileConfig, project_root: PathBuf) -> Result<RunOptions> {
    let platform = cli
        .platform
        .clone()
        .or(file.platform)
        .map(|name| Platform::from_str(&name))
        .transpose()?;

    let flags = ExecutionFlags {
        automate_all: cli.automate_all || file.automate_all,
        ignore_unclean_git: cli.ignore_unclean_git || file.ignore_unclean_git,
        no_logging: cli.no_logging || file.no_logging,
        unit_testing: cli.unit_testing,
        e2e_testing: cli.e2e_testing,
    };

    Ok(RunOptions {
        project_root,
        platform,
        deployed_project_name: cli.deployed_project_name.clone().or(file.deployed_project_name),
        region: cli.region.clone().or(file.region),
        flags,
        log_dir_created: false,
    })
}
