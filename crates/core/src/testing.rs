//! Scripted stand-ins for the command runner and prompt seams
//!
//! Used by this crate's unit tests and by the integration tests of the
//! workspace. Neither type touches the host.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use crate::command::{CommandOutput, CommandRunner, ShellCommand};
use crate::error::{Error, Result};
use crate::prompt::Prompter;

/// One recorded command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub slow: bool,
    pub skip_logging: bool,
}

/// Command runner that replays scripted outputs and records every call.
///
/// Responses are matched by the longest prefix of the rendered command.
/// When several outputs are queued for one prefix they are used in order,
/// and the last one repeats. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    responses: Vec<(String, VecDeque<CommandOutput>)>,
    missing_programs: HashSet<String>,
    pub invocations: Vec<Invocation>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, output: CommandOutput) -> Self {
        match self.responses.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, queue)) => queue.push_back(output),
            None => self
                .responses
                .push((prefix.to_string(), VecDeque::from([output]))),
        }
        self
    }

    /// Pretend `program` is not on PATH.
    pub fn without_program(mut self, program: &str) -> Self {
        self.missing_programs.insert(program.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.invocations.iter().map(|i| i.command.clone()).collect()
    }

    pub fn invoked(&self, prefix: &str) -> bool {
        self.invocations.iter().any(|i| i.command.starts_with(prefix))
    }

    /// Whether any command for `program` ran.
    pub fn invoked_program(&self, program: &str) -> bool {
        self.invocations
            .iter()
            .any(|i| i.command.split_whitespace().next() == Some(program))
    }

    fn reply(&mut self, command: &ShellCommand, slow: bool, skip_logging: bool) -> Result<CommandOutput> {
        let rendered = command.to_shell_command();
        self.invocations.push(Invocation {
            command: rendered.clone(),
            working_dir: command.working_dir.clone(),
            slow,
            skip_logging,
        });

        if self.missing_programs.contains(&command.program) {
            return Err(Error::Command {
                command: rendered,
                message: "No such file or directory (os error 2)".to_string(),
            });
        }

        let matched = self
            .responses
            .iter_mut()
            .filter(|(prefix, _)| command.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len());
        let output = match matched {
            Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some((_, queue)) => queue.front().cloned().unwrap_or_default(),
            None => CommandOutput::ok(""),
        };
        Ok(output)
    }
}

impl CommandRunner for FakeRunner {
    fn run_quick(&mut self, command: &ShellCommand) -> Result<CommandOutput> {
        self.reply(command, false, false)
    }

    fn run_slow(&mut self, command: &ShellCommand, skip_logging: bool) -> Result<CommandOutput> {
        self.reply(command, true, skip_logging)
    }

    fn program_available(&self, program: &str) -> bool {
        !self.missing_programs.contains(program)
    }
}

/// Prompter that answers from a script and records each question.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    confirms: VecDeque<bool>,
    selections: VecDeque<usize>,
    pub questions: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_with(mut self, answer: bool) -> Self {
        self.confirms.push_back(answer);
        self
    }

    pub fn select_with(mut self, index: usize) -> Self {
        self.selections.push_back(index);
        self
    }

    /// Whether every scripted answer was used.
    pub fn exhausted(&self) -> bool {
        self.confirms.is_empty() && self.selections.is_empty()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.questions.push(question.to_string());
        self.confirms
            .pop_front()
            .ok_or_else(|| Error::Other(format!("unexpected confirmation: {question}")))
    }

    fn select(&mut self, question: &str, options: &[String]) -> Result<usize> {
        self.questions.push(question.to_string());
        let index = self
            .selections
            .pop_front()
            .ok_or_else(|| Error::Other(format!("unexpected selection: {question}")))?;
        if index >= options.len() {
            return Err(Error::Other(format!("selection {index} out of range")));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins_and_last_output_repeats() {
        let mut runner = FakeRunner::new()
            .respond("fly", CommandOutput::ok("generic"))
            .respond("fly apps list", CommandOutput::ok("first"))
            .respond("fly apps list", CommandOutput::ok("second"));

        let list = ShellCommand::new("fly").args(["apps", "list", "--json"]);
        assert_eq!(runner.run_quick(&list).unwrap().stdout, "first");
        assert_eq!(runner.run_quick(&list).unwrap().stdout, "second");
        assert_eq!(runner.run_quick(&list).unwrap().stdout, "second");
        assert_eq!(
            runner.run_quick(&ShellCommand::new("fly").arg("version")).unwrap().stdout,
            "generic"
        );
        assert_eq!(runner.invocations.len(), 4);
        assert!(runner.invoked("fly apps list"));
    }

    #[test]
    fn test_missing_program() {
        let mut runner = FakeRunner::new().without_program("heroku");
        assert!(!runner.program_available("heroku"));
        assert!(runner.run_quick(&ShellCommand::new("heroku")).is_err());
        assert!(runner.invoked_program("heroku"));
    }

    #[test]
    fn test_scripted_prompter() {
        let mut prompter = ScriptedPrompter::new().confirm_with(false).select_with(1);
        assert!(!prompter.confirm("Continue?").unwrap());
        assert_eq!(prompter.select("Which?", &["a".into(), "b".into()]).unwrap(), 1);
        assert!(prompter.exhausted());
        assert!(prompter.confirm("Again?").is_err());
        assert_eq!(prompter.questions.len(), 3);
    }
}
