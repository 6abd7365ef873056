use std::io;
use std::path::PathBuf;

/// Errors that can occur while configuring or deploying a project.
///
/// Every message names the precondition that failed and what to do about it,
/// since the operator is expected to fix the condition and run the tool again.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- environment ---
    #[error(
        "Could not find a .git/ directory in {project_root} or in its parent.\n\
         Initialize a repository with `git init` (and commit your project) before running simple-deploy."
    )]
    NoGitRepository { project_root: PathBuf },

    #[error(
        "Could not find a requirements.txt file, Pipfile, or pyproject.toml with a [tool.poetry] table in {git_root}.\n\
         Declare your project's dependencies with one of these before running simple-deploy."
    )]
    NoDependencyManagerDetected { git_root: PathBuf },

    #[error("Unexpected project layout: {0}")]
    ProjectStructure(String),

    #[error(
        "The {platform} CLI (`{program}`) does not seem to be installed.\n\
         Install it, make sure it is on your PATH, and run simple-deploy again."
    )]
    CliNotInstalled { platform: String, program: String },

    #[error(
        "You are not logged in to the {platform} CLI.\n\
         Run `{login_command}`, then run simple-deploy again."
    )]
    CliNotAuthenticated {
        platform: String,
        login_command: String,
    },

    // --- safety ---
    #[error(
        "Your git working tree has uncommitted changes that simple-deploy did not make.\n\
         Commit or stash them (`git status` shows what changed), or rerun with --ignore-unclean-git \
         if you are certain it is safe to proceed."
    )]
    UncleanGit,

    // --- ambiguity ---
    #[error(
        "No platform plugin is installed.\n\
         Install exactly one of the officially supported plugins: {supported}.\n\
         For example: `pip install dsd-flyio`"
    )]
    NoPluginInstalled { supported: String },

    #[error(
        "More than one platform plugin is installed: {found}.\n\
         Uninstall all but the one you want to deploy with (`pip uninstall <plugin>`), then run simple-deploy again."
    )]
    AmbiguousPlugins { found: String },

    #[error(
        "The installed plugin `{name}` is not supported by this version of simple-deploy.\n\
         Supported plugins: {supported}."
    )]
    UnsupportedPlugin { name: String, supported: String },

    #[error(
        "You asked to deploy to {requested}, but the installed plugin targets {installed}.\n\
         Install the plugin for {requested} (and uninstall {installed}), or drop --platform."
    )]
    PlatformMismatch { requested: String, installed: String },

    #[error("{0}")]
    NoEligibleApp(String),

    #[error("{0}")]
    AmbiguousResource(String),

    // --- resource creation ---
    #[error(
        "{message}\n\n\
         The platform reported:\n{raw_error}\n\n\
         Resources that were already created remotely have not been removed: {left_in_place}."
    )]
    ResourceCreation {
        message: String,
        raw_error: String,
        left_in_place: String,
    },

    // --- consent ---
    #[error("{0}")]
    ConsentRequired(String),

    // --- plumbing ---
    #[error("Invalid deployment configuration: {0}")]
    InvalidContext(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Could not parse TOML: {0}")]
    Toml(#[from] toml_edit::TomlError),

    #[error("Could not parse JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for simple-deploy operations
pub type Result<T> = std::result::Result<T, Error>;
