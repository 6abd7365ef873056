//! Platform adapters and the protocol that drives them
//!
//! Each supported platform is a variant of [`Adapter`] wrapping a struct that
//! implements [`PlatformAdapter`]. [`run_protocol`] walks an adapter through
//! the fixed sequence of stages; adapters only decide what each stage means
//! for their platform.

pub mod fly;
pub mod heroku;
pub mod platformsh;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tera::Context;
use tracing::{info, warn};

use crate::command::{CommandOutput, CommandRunner, ShellCommand};
use crate::context::DeploymentContext;
use crate::error::{Error, Result};
use crate::files;
use crate::ledger::{normalize_name, DependencyLedger};
use crate::logging;
use crate::messages::{self, COMMIT_MESSAGE};
use crate::orchestrator::{Outcome, SELF_PACKAGE};
use crate::prompt::Prompter;
use crate::templates::Templates;

pub use fly::FlyAdapter;
pub use heroku::HerokuAdapter;
pub use platformsh::PlatformShAdapter;

/// Remote app name used when remote calls are disabled for unit testing
pub const UNIT_TEST_APP_NAME: &str = "my-app";

/// A hosting platform simple-deploy can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    FlyIo,
    Heroku,
    PlatformSh,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::FlyIo, Platform::Heroku, Platform::PlatformSh];

    /// Value accepted by `--platform`
    pub fn key(&self) -> &'static str {
        match self {
            Platform::FlyIo => "fly_io",
            Platform::Heroku => "heroku",
            Platform::PlatformSh => "platform_sh",
        }
    }

    /// Python distribution providing support for this platform
    pub fn plugin_name(&self) -> &'static str {
        match self {
            Platform::FlyIo => "dsd-flyio",
            Platform::Heroku => "dsd-heroku",
            Platform::PlatformSh => "dsd-platformsh",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::FlyIo => "Fly.io",
            Platform::Heroku => "Heroku",
            Platform::PlatformSh => "Platform.sh",
        }
    }

    /// The platform's command line client
    pub fn cli_program(&self) -> &'static str {
        match self {
            Platform::FlyIo => "fly",
            Platform::Heroku => "heroku",
            Platform::PlatformSh => "platform",
        }
    }

    pub fn from_plugin_name(name: &str) -> Option<Self> {
        let name = normalize_name(name);
        Self::ALL.into_iter().find(|p| p.plugin_name() == name)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace(['-', '.'], "_");
        if let Some(platform) = Self::ALL.into_iter().find(|p| p.key() == key) {
            return Ok(platform);
        }
        match key.as_str() {
            "flyio" | "fly" => Ok(Platform::FlyIo),
            "platformsh" => Ok(Platform::PlatformSh),
            _ => {
                let keys: Vec<&str> = Self::ALL.iter().map(Platform::key).collect();
                Err(Error::ConfigError(format!(
                    "unknown platform `{s}`; expected one of {}",
                    keys.join(", ")
                )))
            }
        }
    }
}

/// Whether the protocol continues after an optional confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// What happened to a file the adapter is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Already present with the expected content
    Found,
    Generated,
    /// Existing content replaced with the operator's permission
    Replaced,
    /// Existing content left alone at the operator's request
    Kept,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileStatus::Found => "found",
            FileStatus::Generated => "generated",
            FileStatus::Replaced => "replaced",
            FileStatus::Kept => "kept",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// How an existing settings block is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingBlock {
    /// Leave the file as it is
    Keep,
    /// Ask before replacing everything from the marker to the end of the file
    OfferReplace,
}

/// Everything an adapter may touch while running its stages.
pub struct Session<'a> {
    pub context: &'a DeploymentContext,
    pub runner: &'a mut dyn CommandRunner,
    pub prompter: &'a mut dyn Prompter,
    pub ledger: &'a mut DependencyLedger,
    pub templates: &'a Templates,
    pub files: Vec<FileChange>,
}

impl<'a> Session<'a> {
    pub fn new(
        context: &'a DeploymentContext,
        runner: &'a mut dyn CommandRunner,
        prompter: &'a mut dyn Prompter,
        ledger: &'a mut DependencyLedger,
        templates: &'a Templates,
    ) -> Self {
        Self {
            context,
            runner,
            prompter,
            ledger,
            templates,
            files: Vec::new(),
        }
    }

    /// Run a captured command; commands default to running in the git root.
    pub fn run_quick(&mut self, command: ShellCommand) -> Result<CommandOutput> {
        let command = self.in_git_root(command);
        self.runner.run_quick(&command)
    }

    /// Run a streamed command; commands default to running in the git root.
    pub fn run_slow(&mut self, command: ShellCommand, skip_logging: bool) -> Result<CommandOutput> {
        let command = self.in_git_root(command);
        self.runner.run_slow(&command, skip_logging)
    }

    fn in_git_root(&self, command: ShellCommand) -> ShellCommand {
        if command.working_dir.is_some() {
            command
        } else {
            command.with_working_dir(&self.context.git_root)
        }
    }

    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        self.prompter.confirm(question)
    }

    /// Add simple-deploy to the manifest and keep its log directory out of git.
    ///
    /// The first write of every run; nothing before it touches the project.
    pub fn register_self(&mut self) -> Result<()> {
        if !self.context.flags.no_logging {
            let gitignore = self.context.git_root.join(".gitignore");
            if logging::ensure_ignore_entry(&gitignore)? {
                messages::emit(format!("  Added {} to .gitignore", logging::LOG_DIR_NAME));
            }
        }
        self.ledger.ensure_package(SELF_PACKAGE, "")?;
        Ok(())
    }

    /// Every settings and platform file this run handled, with what happened to it.
    pub fn file_summary(&self) -> Option<String> {
        if self.files.is_empty() {
            return None;
        }
        let mut summary = String::from("Files handled in this run:");
        for change in &self.files {
            summary.push_str(&format!(
                "\n  {} ({})",
                self.display_path(&change.path),
                change.status
            ));
        }
        Some(summary)
    }

    /// Fail with a platform-specific message unless the CLI is installed and answers.
    pub fn ensure_cli(&mut self, platform: Platform, version_args: &[&str]) -> Result<()> {
        let program = platform.cli_program();
        let not_installed = || Error::CliNotInstalled {
            platform: platform.display_name().to_string(),
            program: program.to_string(),
        };

        if !self.runner.program_available(program) {
            return Err(not_installed());
        }
        match self.run_quick(ShellCommand::new(program).args(version_args.iter().copied())) {
            Ok(output) if output.success() => {
                info!("{} CLI: {}", platform, output.stdout.trim());
                Ok(())
            }
            _ => Err(not_installed()),
        }
    }

    /// Run an auth check; `not_authenticated` inspects stderr for the platform's login error.
    pub fn check_auth(
        &mut self,
        platform: Platform,
        command: ShellCommand,
        not_authenticated: fn(&str) -> bool,
        login_command: &str,
    ) -> Result<CommandOutput> {
        let output = self.run_quick(command.clone())?;
        if not_authenticated(&output.stderr) {
            return Err(Error::CliNotAuthenticated {
                platform: platform.display_name().to_string(),
                login_command: login_command.to_string(),
            });
        }
        if !output.success() {
            return Err(command_error(&command, &output));
        }
        Ok(output)
    }

    /// Path of `path` relative to the git root, for messages.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.context.git_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Project root relative to the git root with a trailing `/`, or empty.
    pub fn app_dir(&self) -> String {
        let relative = self
            .context
            .project_root
            .strip_prefix(&self.context.git_root)
            .unwrap_or(Path::new(""));
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!("{}/", parts.join("/"))
        }
    }

    /// Template values shared by every platform.
    pub fn template_context(&self, deployed_project_name: &str) -> Context {
        let mut context = Context::new();
        context.insert("django_project_name", &self.context.local_project_name);
        context.insert("deployed_project_name", deployed_project_name);
        context.insert("app_dir", &self.app_dir());
        context
    }

    /// Render `template` to `path` unless the file is already there.
    ///
    /// A file with different content is only replaced with permission;
    /// refusing aborts the run.
    pub fn write_platform_file(
        &mut self,
        path: &Path,
        template: &str,
        context: &Context,
    ) -> Result<FileStatus> {
        let rendered = self.templates.render(template, context)?;
        let display = self.display_path(path);

        let status = if path.exists() {
            let existing = fs::read_to_string(path)?;
            if existing == rendered {
                messages::emit(format!("  Found existing {display}"));
                FileStatus::Found
            } else {
                let question = format!(
                    "{display} already exists and differs from the file simple-deploy would write.\n\
                     Replace it?"
                );
                if !self.confirm(&question)? {
                    return Err(Error::ConsentRequired(format!(
                        "Leaving {display} untouched. Move it aside or allow simple-deploy to replace it, \
                         then run simple-deploy again."
                    )));
                }
                files::write_atomic(path, &rendered)?;
                messages::emit(format!("  Replaced {display}"));
                FileStatus::Replaced
            }
        } else {
            files::write_atomic(path, &rendered)?;
            messages::emit(format!("  Generated {display}"));
            FileStatus::Generated
        };

        self.files.push(FileChange {
            path: path.to_path_buf(),
            status,
        });
        Ok(status)
    }

    /// Wrap the current settings and a platform block rendered from `template`.
    pub fn apply_settings_block(
        &mut self,
        marker: &str,
        template: &str,
        mut context: Context,
        existing: ExistingBlock,
    ) -> Result<FileStatus> {
        let path = self.context.settings_path.clone();
        let display = self.display_path(&path);
        let current = fs::read_to_string(&path)?;
        let offset = marker_offset(&current, marker);

        let prefix = match (offset, existing) {
            (None, _) => current.as_str(),
            (Some(_), ExistingBlock::Keep) => {
                messages::emit(format!("  Found {marker:?} block in {display}"));
                return Ok(self.record(path, FileStatus::Found));
            }
            (Some(start), ExistingBlock::OfferReplace) => &current[..start],
        };

        context.insert("current_settings", &settings_prefix(prefix));
        let rendered = self.templates.render(template, &context)?;
        if rendered == current {
            messages::emit(format!("  Found {marker:?} block in {display}"));
            return Ok(self.record(path, FileStatus::Found));
        }

        let status = if offset.is_some() {
            let question = format!(
                "{display} already contains a {marker:?} block.\n\
                 Replace everything from that line to the end of the file?"
            );
            if !self.confirm(&question)? {
                messages::emit(format!("  Leaving {display} unchanged"));
                return Ok(self.record(path, FileStatus::Kept));
            }
            FileStatus::Replaced
        } else {
            FileStatus::Generated
        };

        files::write_atomic(&path, &rendered)?;
        messages::emit(format!("  Added {marker:?} block to {display}"));
        Ok(self.record(path, status))
    }

    fn record(&mut self, path: PathBuf, status: FileStatus) -> FileStatus {
        self.files.push(FileChange { path, status });
        status
    }

    /// `git add .` then commit with the fixed message.
    pub fn commit_changes(&mut self) -> Result<()> {
        messages::emit("Committing changes...");
        let add = ShellCommand::new("git").args(["add", "."]);
        let output = self.run_quick(add.clone())?;
        if !output.success() {
            return Err(command_error(&add, &output));
        }

        let commit = ShellCommand::new("git").args(["commit", "-am", COMMIT_MESSAGE]);
        let output = self.run_quick(commit.clone())?;
        if !output.success() && !is_nothing_to_commit(&output.stdout) {
            return Err(command_error(&commit, &output));
        }
        Ok(())
    }
}

/// Byte offset of the line holding exactly `marker`, if any.
pub fn marker_offset(contents: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    for line in contents.split_inclusive('\n') {
        if line.trim() == marker {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Settings text placed above a platform block: trailing whitespace collapsed to one newline.
pub fn settings_prefix(contents: &str) -> String {
    format!("{}\n", contents.trim_end())
}

pub fn is_nothing_to_commit(stdout: &str) -> bool {
    stdout.contains("nothing to commit")
}

/// Error for a command that ran but failed.
pub fn command_error(command: &ShellCommand, output: &CommandOutput) -> Error {
    let message = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    Error::Command {
        command: command.to_shell_command(),
        message: if message.is_empty() {
            format!("exit status {:?}", output.status)
        } else {
            message.to_string()
        },
    }
}

/// First string field present under any of `keys`.
pub fn json_str<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v str> {
    keys.iter().find_map(|key| value.get(key).and_then(Value::as_str))
}

/// The stages every platform goes through.
pub trait PlatformAdapter {
    fn platform(&self) -> Platform;

    /// Optional platform-specific confirmation before anything happens.
    fn confirm_preliminary(&mut self, _session: &mut Session<'_>) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    /// Check the CLI and authentication, and settle which remote app to use.
    fn validate_platform(&mut self, session: &mut Session<'_>) -> Result<()>;

    /// Create backing resources. Only runs with --automate-all.
    fn provision_resources(&mut self, _session: &mut Session<'_>) -> Result<()> {
        Ok(())
    }

    fn mutate_settings(&mut self, session: &mut Session<'_>) -> Result<()>;

    /// Switch or convert the manifest before packages are added.
    fn prepare_dependency_manifest(&mut self, _session: &mut Session<'_>) -> Result<()> {
        Ok(())
    }

    /// Packages the deployed project needs, with version constraints.
    fn required_packages(&self) -> &'static [(&'static str, &'static str)];

    fn mutate_dependency_files(&mut self, session: &mut Session<'_>) -> Result<()> {
        messages::emit(format!(
            "Checking {} for required packages...",
            session.ledger.manager().manifest_file_name()
        ));
        for (name, constraint) in self.required_packages() {
            session.ledger.ensure_package(name, constraint)?;
        }
        Ok(())
    }

    fn generate_platform_files(&mut self, session: &mut Session<'_>) -> Result<()>;

    /// Commit, push, and open the deployed project. Only runs with --automate-all.
    fn conclude(&mut self, session: &mut Session<'_>) -> Result<()>;

    /// What the operator should do next.
    fn report(&self, session: &Session<'_>, outcome: Outcome) -> String;
}

/// Drive `adapter` through every stage in order.
pub fn run_protocol(adapter: &mut dyn PlatformAdapter, session: &mut Session<'_>) -> Result<Outcome> {
    let platform = adapter.platform();
    let automate_all = session.context.automate_all();

    if adapter.confirm_preliminary(session)? == Flow::Stop {
        messages::emit(messages::CANCELLED);
        return Ok(Outcome::Declined);
    }
    session.register_self()?;

    messages::emit(format!("Checking your {platform} setup..."));
    adapter.validate_platform(session)?;

    if automate_all {
        messages::emit(format!("Creating resources on {platform}..."));
        adapter.provision_resources(session)?;
    }

    messages::emit(messages::CONFIGURING);
    adapter.mutate_settings(session)?;
    adapter.prepare_dependency_manifest(session)?;
    adapter.mutate_dependency_files(session)?;
    adapter.generate_platform_files(session)?;

    let outcome = if automate_all {
        adapter.conclude(session)?;
        Outcome::Deployed
    } else {
        Outcome::Configured
    };

    if let Some(summary) = session.file_summary() {
        messages::emit(summary);
    }
    if session.context.log_dir_created {
        messages::emit(messages::LOG_DIR_CREATED);
    }
    messages::emit(adapter.report(session, outcome));
    Ok(outcome)
}

/// Closed set of adapters, one per supported platform.
pub enum Adapter {
    FlyIo(FlyAdapter),
    Heroku(HerokuAdapter),
    PlatformSh(PlatformShAdapter),
}

impl Adapter {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::FlyIo => Adapter::FlyIo(FlyAdapter::default()),
            Platform::Heroku => Adapter::Heroku(HerokuAdapter::default()),
            Platform::PlatformSh => Adapter::PlatformSh(PlatformShAdapter::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Adapter::FlyIo(_) => Platform::FlyIo,
            Adapter::Heroku(_) => Platform::Heroku,
            Adapter::PlatformSh(_) => Platform::PlatformSh,
        }
    }

    fn as_adapter_mut(&mut self) -> &mut dyn PlatformAdapter {
        match self {
            Adapter::FlyIo(adapter) => adapter,
            Adapter::Heroku(adapter) => adapter,
            Adapter::PlatformSh(adapter) => adapter,
        }
    }

    pub fn run(&mut self, session: &mut Session<'_>) -> Result<Outcome> {
        run_protocol(self.as_adapter_mut(), session)
    }
}

/// Resources created remotely during this run, for error messages.
#[derive(Debug, Clone, Default)]
pub(crate) struct CreatedResources(Vec<String>);

impl CreatedResources {
    pub(crate) fn push(&mut self, resource: String) {
        warn!("Created {}; it will not be removed if a later step fails", resource);
        self.0.push(resource);
    }

    pub(crate) fn describe(&self) -> String {
        if self.0.is_empty() {
            "none".to_string()
        } else {
            self.0.join(", ")
        }
    }

    /// A creation error that lists what was already left in place.
    pub(crate) fn error(&self, message: impl Into<String>, raw_error: impl Into<String>) -> Error {
        Error::ResourceCreation {
            message: message.into(),
            raw_error: raw_error.into(),
            left_in_place: self.describe(),
        }
    }
}
