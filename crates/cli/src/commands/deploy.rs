use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error};

use simple_deploy_core::{
    AutoConfirm, LinePrompter, Orchestrator, Outcome, Prompter, RunLog, SystemRunner,
    TerminalPrompter,
};

use crate::cli::Cli;
use crate::{config, logging};

pub fn deploy_command(cli: Cli) -> Result<ExitCode> {
    // Determine the project root
    let project_root = match &cli.cwd {
        Some(cwd) => PathBuf::from(cwd),
        None => env::current_dir().context("Failed to get current directory")?,
    };
    let project_root = project_root
        .canonicalize()
        .with_context(|| format!("Project root {} does not exist", project_root.display()))?;

    let file_config = config::load(&project_root)?;
    let mut options = config::merge(&cli, file_config, project_root)?;

    let run_log = if options.flags.no_logging {
        None
    } else {
        Some(RunLog::start(&options.project_root)?)
    };
    options.log_dir_created = run_log.as_ref().is_some_and(RunLog::created_dir);
    logging::init(run_log.as_ref())?;
    if let Some(log) = &run_log {
        debug!("Run log: {}", log.path().display());
    }

    let mut runner = SystemRunner::default();
    let mut prompter: Box<dyn Prompter> = if options.flags.auto_confirm() {
        Box::new(AutoConfirm)
    } else if io::stdin().is_terminal() {
        Box::new(TerminalPrompter)
    } else {
        Box::new(LinePrompter::new(io::stdin().lock(), io::stdout()))
    };

    let outcome = Orchestrator::new(&mut runner, prompter.as_mut()).run(&options);
    match outcome {
        Ok(Outcome::Declined) => {
            debug!("Run declined by the operator");
            Ok(ExitCode::SUCCESS)
        }
        Ok(outcome) => {
            debug!("Run finished: {:?}", outcome);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
