//! Running external commands in quick (captured) and slow (streamed) modes

use std::io::{BufRead, BufReader};
use std::process::Stdio;

use tracing::{debug, info};

use super::shell_command::{ShellCommand, ShellFamily};
use crate::error::{Error, Result};

/// Exit code and output of a finished command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            status: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Seam between the deployment logic and the processes it drives.
///
/// Every git and platform CLI invocation goes through this trait so the
/// adapters can be exercised against scripted outputs.
pub trait CommandRunner {
    /// Run to completion and capture stdout and stderr.
    fn run_quick(&mut self, command: &ShellCommand) -> Result<CommandOutput>;

    /// Run while forwarding merged output to the console as it is produced.
    ///
    /// With `skip_logging` the output is still shown but never reaches the run log.
    fn run_slow(&mut self, command: &ShellCommand, skip_logging: bool) -> Result<CommandOutput>;

    /// Whether `program` can be found on PATH.
    fn program_available(&self, program: &str) -> bool;
}

/// Runs commands on the host.
pub struct SystemRunner {
    shell: ShellFamily,
}

impl SystemRunner {
    pub fn new(shell: ShellFamily) -> Self {
        Self { shell }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(ShellFamily::host())
    }
}

impl CommandRunner for SystemRunner {
    fn run_quick(&mut self, command: &ShellCommand) -> Result<CommandOutput> {
        let shell_cmd = command.to_shell_command();
        info!("$ {}", shell_cmd);

        let output = command.to_process().output().map_err(|e| Error::Command {
            command: shell_cmd.clone(),
            message: e.to_string(),
        })?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("exit status: {:?}", result.status);
        if !result.stdout.trim().is_empty() {
            info!("{}", result.stdout.trim_end());
        }
        if !result.stderr.trim().is_empty() {
            info!("{}", result.stderr.trim_end());
        }

        Ok(result)
    }

    fn run_slow(&mut self, command: &ShellCommand, skip_logging: bool) -> Result<CommandOutput> {
        let shell_cmd = command.to_shell_command_for(self.shell);
        if skip_logging {
            info!("$ {} (output not logged)", command.program);
        } else {
            info!("$ {}", shell_cmd);
        }

        let mut child = command
            .to_merged_shell_process(self.shell)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Command {
                command: shell_cmd.clone(),
                message: e.to_string(),
            })?;

        let mut captured = String::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                println!("{line}");
                if !skip_logging {
                    info!("{}", line);
                }
                captured.push_str(&line);
                captured.push('\n');
            }
        }

        let status = child.wait()?;
        debug!("exit status: {:?}", status.code());

        Ok(CommandOutput {
            status: status.code(),
            stdout: captured,
            stderr: String::new(),
        })
    }

    fn program_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        assert!(CommandOutput::ok("done").success());
        assert!(!CommandOutput::failed("boom").success());
        assert!(!CommandOutput::default().success());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_quick_captures_output() {
        let mut runner = SystemRunner::new(ShellFamily::Posix);
        let output = runner
            .run_quick(&ShellCommand::new("sh").args(["-c", "echo out; echo err 1>&2"]))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_slow_merges_stderr() {
        let mut runner = SystemRunner::new(ShellFamily::Posix);
        let output = runner
            .run_slow(&ShellCommand::new("sh").args(["-c", "echo one; echo two 1>&2"]), false)
            .unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("one"));
        assert!(output.stdout.contains("two"));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let mut runner = SystemRunner::default();
        let result = runner.run_quick(&ShellCommand::new("definitely-not-a-real-program-xyz"));
        assert!(matches!(result, Err(Error::Command { .. })));
        assert!(!runner.program_available("definitely-not-a-real-program-xyz"));
    }
}
