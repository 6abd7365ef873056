use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::commands::deploy_command;

/// Configure a Django project for deployment, and optionally deploy it
#[derive(Parser, Debug, Default)]
#[command(name = "simple-deploy")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging on the console\n    \
                        VIRTUAL_ENV       Python environment to look for platform plugins in")]
pub struct Cli {
    /// Platform to deploy to (fly_io, heroku, platform_sh); must match the installed plugin
    #[arg(long)]
    pub platform: Option<String>,

    /// Create resources, commit, and push instead of only configuring files
    #[arg(long)]
    pub automate_all: bool,

    /// Do not write a log file for this run
    #[arg(long)]
    pub no_logging: bool,

    /// Proceed even when git reports uncommitted changes
    #[arg(long)]
    pub ignore_unclean_git: bool,

    /// Name of the app or project on the platform
    #[arg(long)]
    pub deployed_project_name: Option<String>,

    /// Platform region to create resources in
    #[arg(long)]
    pub region: Option<String>,

    /// Project root (defaults to the current directory)
    #[arg(long)]
    pub cwd: Option<String>,

    /// Skip every remote call and answer prompts automatically
    #[arg(long, hide = true)]
    pub unit_testing: bool,

    /// Answer prompts automatically while still calling the platform
    #[arg(long, hide = true)]
    pub e2e_testing: bool,
}

impl Cli {
    /// Execute the run
    pub fn execute(self) -> Result<ExitCode> {
        deploy_command(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_every_flag() {
        let cli = Cli::try_parse_from([
            "simple-deploy",
            "--platform",
            "fly_io",
            "--automate-all",
            "--no-logging",
            "--ignore-unclean-git",
            "--deployed-project-name",
            "blog-prod",
            "--region",
            "ams",
            "--cwd",
            "/tmp/blog",
        ])
        .unwrap();

        assert_eq!(cli.platform.as_deref(), Some("fly_io"));
        assert!(cli.automate_all && cli.no_logging && cli.ignore_unclean_git);
        assert_eq!(cli.deployed_project_name.as_deref(), Some("blog-prod"));
        assert_eq!(cli.region.as_deref(), Some("ams"));
        assert_eq!(cli.cwd.as_deref(), Some("/tmp/blog"));
        assert!(!cli.unit_testing);
    }

    #[test]
    fn test_testing_flags_are_accepted_but_hidden() {
        let cli = Cli::try_parse_from(["simple-deploy", "--unit-testing"]).unwrap();
        assert!(cli.unit_testing);

        let mut command = <Cli as clap::CommandFactory>::command();
        let help = command.render_help().to_string();
        assert!(!help.contains("--unit-testing"));
        assert!(help.contains("--automate-all"));
    }

    #[test]
    fn test_rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["simple-deploy", "--deploy-everything"]).is_err());
    }
}
