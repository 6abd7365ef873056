//! One run of simple-deploy, from plugin discovery to the adapter's report

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::command::{CommandRunner, ShellCommand};
use crate::context::{ContextBuilder, ExecutionFlags, GitClearance, ProjectInspection};
use crate::error::{Error, Result};
use crate::git_gate::GitSafetyGate;
use crate::inspector;
use crate::ledger::DependencyLedger;
use crate::messages;
use crate::platforms::{command_error, Adapter, Platform, Session};
use crate::plugins::PluginResolver;
use crate::prompt::Prompter;
use crate::templates::Templates;

/// Distribution simple-deploy registers in every project it configures
pub const SELF_PACKAGE: &str = "django-simple-deploy";

/// How a run ended, when it ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Files prepared; the operator pushes manually
    Configured,
    /// Resources created, committed, and pushed
    Deployed,
    /// The operator declined a confirmation; nothing was changed
    Declined,
}

/// Options for one run, after CLI and config file have been merged.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub project_root: PathBuf,
    /// Platform the operator asked for; must match the installed plugin
    pub platform: Option<Platform>,
    pub deployed_project_name: Option<String>,
    pub region: Option<String>,
    pub flags: ExecutionFlags,
    /// The run log's directory was created by this run
    pub log_dir_created: bool,
}

pub struct Orchestrator<'a> {
    runner: &'a mut dyn CommandRunner,
    prompter: &'a mut dyn Prompter,
    site_packages: Option<Vec<PathBuf>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a mut dyn CommandRunner, prompter: &'a mut dyn Prompter) -> Self {
        Self {
            runner,
            prompter,
            site_packages: None,
        }
    }

    /// Look for plugins only in `dirs` instead of the project's Python environment.
    pub fn with_site_packages(mut self, dirs: Vec<PathBuf>) -> Self {
        self.site_packages = Some(dirs);
        self
    }

    pub fn run(&mut self, options: &RunOptions) -> Result<Outcome> {
        info!("{}", messages::LOG_START);
        let outcome = self.run_stages(options)?;
        info!("{}", messages::LOG_END);
        Ok(outcome)
    }

    fn run_stages(&mut self, options: &RunOptions) -> Result<Outcome> {
        let platform = self.resolve_platform(options)?;
        messages::emit(format!("Deployment target: {platform}"));

        let inspection = inspector::inspect(&options.project_root)?;
        let clearance = self.check_git(&inspection, options.flags)?;

        let mut ledger = DependencyLedger::load(
            inspection.dependency_manager,
            inspection.manifest_path().to_path_buf(),
        )?;

        if options.flags.automate_all {
            let question = messages::confirm_automate_all(platform.display_name());
            if !self.prompter.confirm(&question)? {
                messages::emit(messages::CANCELLED);
                return Ok(Outcome::Declined);
            }
        }

        let context = ContextBuilder::new(options.flags)
            .with_deployed_project_name(options.deployed_project_name.clone())
            .with_region(options.region.clone())
            .with_inspection(inspection)
            .with_git_clearance(clearance)
            .with_platform(platform)
            .with_log_dir_created(options.log_dir_created)
            .validate()?
            .build();
        debug!("Deployment context: {:?}", context);

        let templates = Templates::load()?;
        let mut adapter = Adapter::for_platform(platform);
        let mut session = Session::new(
            &context,
            &mut *self.runner,
            &mut *self.prompter,
            &mut ledger,
            &templates,
        );
        adapter.run(&mut session)
    }

    fn resolve_platform(&mut self, options: &RunOptions) -> Result<Platform> {
        let resolver = match &self.site_packages {
            Some(dirs) => PluginResolver::new(dirs.clone()),
            None => {
                let git_root = inspector::find_git_root(&options.project_root).map(|(root, _)| root);
                PluginResolver::discover(&options.project_root, git_root.as_deref(), &mut *self.runner)
            }
        };
        let installed = resolver.resolve()?;

        match options.platform {
            Some(requested) if requested != installed => Err(Error::PlatformMismatch {
                requested: requested.display_name().to_string(),
                installed: installed.display_name().to_string(),
            }),
            _ => Ok(installed),
        }
    }

    fn check_git(&mut self, inspection: &ProjectInspection, flags: ExecutionFlags) -> Result<GitClearance> {
        if flags.ignore_unclean_git {
            warn!("{}", messages::UNCLEAN_GIT_OVERRIDDEN);
            messages::emit_unlogged(messages::UNCLEAN_GIT_OVERRIDDEN);
            return Ok(GitClearance::Overridden);
        }

        let git = |args: &[&str]| {
            ShellCommand::new("git")
                .args(args.iter().copied())
                .with_working_dir(&inspection.git_root)
        };

        let status_command = git(&["status", "--porcelain"]);
        let status = self.runner.run_quick(&status_command)?;
        if !status.success() {
            return Err(command_error(&status_command, &status));
        }

        // A repository without commits has no HEAD to diff against
        let mut diff = self.runner.run_quick(&git(&["diff", "--unified=0", "HEAD"]))?;
        if !diff.success() {
            diff = self.runner.run_quick(&git(&["diff", "--unified=0"]))?;
        }

        if GitSafetyGate::for_inspection(inspection).check(&status.stdout, &diff.stdout) {
            info!("Git working tree is safe to build on");
            Ok(GitClearance::Clean)
        } else {
            Err(Error::UncleanGit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::testing::{FakeRunner, ScriptedPrompter};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const MANAGE_PY: &str = "import os\nimport sys\n\nif __name__ == \"__main__\":\n    os.environ.setdefault(\"DJANGO_SETTINGS_MODULE\", \"blog.settings\")\n";

    const SETTINGS: &str = "from pathlib import Path\n\nBASE_DIR = Path(__file__).resolve().parent.parent\nDEBUG = True\nROOT_URLCONF = \"blog.urls\"\n";

    fn project(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir.join(".git")).unwrap();
        fs::create_dir_all(dir.join("blog")).unwrap();
        fs::write(dir.join("manage.py"), MANAGE_PY).unwrap();
        fs::write(dir.join("blog/settings.py"), SETTINGS).unwrap();
        fs::write(dir.join("requirements.txt"), "Django==5.0.6\n").unwrap();

        let site = dir.join("site-packages");
        fs::create_dir_all(site.join("dsd_flyio-1.0.0.dist-info")).unwrap();
        site
    }

    fn options(dir: &Path, flags: ExecutionFlags) -> RunOptions {
        RunOptions {
            project_root: dir.to_path_buf(),
            flags,
            ..Default::default()
        }
    }

    #[test]
    fn test_configure_only_in_unit_testing_mode() {
        let temp_dir = TempDir::new().unwrap();
        let site = project(temp_dir.path());
        let mut runner = FakeRunner::new();
        let mut prompter = ScriptedPrompter::new();

        let flags = ExecutionFlags {
            unit_testing: true,
            ..Default::default()
        };
        let outcome = Orchestrator::new(&mut runner, &mut prompter)
            .with_site_packages(vec![site])
            .run(&options(temp_dir.path(), flags))
            .unwrap();

        assert_eq!(outcome, Outcome::Configured);
        assert!(temp_dir.path().join("Dockerfile").is_file());
        let requirements = fs::read_to_string(temp_dir.path().join("requirements.txt")).unwrap();
        assert!(requirements.contains("django-simple-deploy"));
        assert!(!runner.invoked_program("fly"));
        assert_eq!(
            fs::read_to_string(temp_dir.path().join(".gitignore")).unwrap(),
            "simple_deploy_logs/\n"
        );
    }

    #[test]
    fn test_declining_automate_all_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let site = project(temp_dir.path());
        let mut runner = FakeRunner::new();
        let mut prompter = ScriptedPrompter::new().confirm_with(false);

        let flags = ExecutionFlags {
            automate_all: true,
            ..Default::default()
        };
        let outcome = Orchestrator::new(&mut runner, &mut prompter)
            .with_site_packages(vec![site])
            .run(&options(temp_dir.path(), flags))
            .unwrap();

        assert_eq!(outcome, Outcome::Declined);
        assert!(!runner.invoked_program("fly"));
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("requirements.txt")).unwrap(),
            "Django==5.0.6\n"
        );
        assert_eq!(fs::read_to_string(temp_dir.path().join("blog/settings.py")).unwrap(), SETTINGS);
        assert!(!temp_dir.path().join(".gitignore").exists());
    }

    #[test]
    fn test_requested_platform_must_match_plugin() {
        let temp_dir = TempDir::new().unwrap();
        let site = project(temp_dir.path());
        let mut runner = FakeRunner::new();
        let mut prompter = ScriptedPrompter::new();

        let mut run_options = options(temp_dir.path(), ExecutionFlags::default());
        run_options.platform = Some(Platform::Heroku);
        let result = Orchestrator::new(&mut runner, &mut prompter)
            .with_site_packages(vec![site])
            .run(&run_options);

        assert!(matches!(result, Err(Error::PlatformMismatch { .. })));
    }

    #[test]
    fn test_unclean_git_aborts_before_writing() {
        let temp_dir = TempDir::new().unwrap();
        let site = project(temp_dir.path());
        let mut runner = FakeRunner::new()
            .respond("git status --porcelain", CommandOutput::ok(" M blog/views.py\n"))
            .respond("git diff", CommandOutput::ok("diff --git a/blog/views.py b/blog/views.py\n+print('hi')\n"));
        let mut prompter = ScriptedPrompter::new();

        let result = Orchestrator::new(&mut runner, &mut prompter)
            .with_site_packages(vec![site])
            .run(&options(temp_dir.path(), ExecutionFlags { unit_testing: true, ..Default::default() }));

        assert!(matches!(result, Err(Error::UncleanGit)));
        assert!(!temp_dir.path().join("Dockerfile").exists());
        assert!(!temp_dir.path().join(".gitignore").exists());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("requirements.txt")).unwrap(),
            "Django==5.0.6\n"
        );
    }

    #[test]
    fn test_ignore_unclean_git_skips_the_check() {
        let temp_dir = TempDir::new().unwrap();
        let site = project(temp_dir.path());
        let mut runner = FakeRunner::new().respond("git status", CommandOutput::ok(" M blog/views.py\n"));
        let mut prompter = ScriptedPrompter::new();

        let flags = ExecutionFlags {
            unit_testing: true,
            ignore_unclean_git: true,
            ..Default::default()
        };
        let outcome = Orchestrator::new(&mut runner, &mut prompter)
            .with_site_packages(vec![site])
            .run(&options(temp_dir.path(), flags))
            .unwrap();

        assert_eq!(outcome, Outcome::Configured);
        assert!(!runner.invoked("git status"));
    }

    #[test]
    fn test_diff_falls_back_without_head() {
        let temp_dir = TempDir::new().unwrap();
        let site = project(temp_dir.path());
        let mut runner = FakeRunner::new()
            .respond("git diff --unified=0 HEAD", CommandOutput::failed("fatal: bad revision 'HEAD'\n"));
        let mut prompter = ScriptedPrompter::new();

        Orchestrator::new(&mut runner, &mut prompter)
            .with_site_packages(vec![site])
            .run(&options(temp_dir.path(), ExecutionFlags { unit_testing: true, ..Default::default() }))
            .unwrap();

        assert!(runner.commands().contains(&"git diff --unified=0".to_string()));
    }
}
