//! Operator confirmations and choices

use std::io::{BufRead, Write};

use inquire::InquireError;
use tracing::info;

use crate::error::{Error, Result};

/// Seam for every question simple-deploy asks the operator.
pub trait Prompter {
    /// Ask a yes/no question. There is no default answer.
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Ask the operator to pick one of `options`; returns its index.
    fn select(&mut self, question: &str, options: &[String]) -> Result<usize>;
}

/// Prompts on the terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        info!("{}", question);
        let answer = match inquire::Confirm::new(question)
            .with_help_message("type yes or no")
            .prompt()
        {
            Ok(answer) => answer,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => false,
            Err(e) => return Err(Error::Other(format!("could not read answer: {e}"))),
        };
        info!("  answer: {}", if answer { "yes" } else { "no" });
        Ok(answer)
    }

    fn select(&mut self, question: &str, options: &[String]) -> Result<usize> {
        info!("{}", question);
        let numbered: Vec<String> = options
            .iter()
            .enumerate()
            .map(|(i, option)| format!("{}: {}", i + 1, option))
            .collect();
        let choice = inquire::Select::new(question, numbered)
            .raw_prompt()
            .map_err(|e| match e {
                InquireError::OperationCanceled | InquireError::OperationInterrupted => {
                    Error::ConsentRequired("No selection was made.".to_string())
                }
                other => Error::Other(format!("could not read selection: {other}")),
            })?;
        info!("  selected: {}", options[choice.index]);
        Ok(choice.index)
    }
}

/// Reads answers one line at a time, for when stdin is not a terminal.
///
/// Unrecognized answers are asked again. Running out of input counts as
/// declining.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt} ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// `yes`/`y` or `no`/`n`, in any case.
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        info!("{}", question);
        writeln!(self.output, "{question}")?;
        let answer = loop {
            match self.ask("(yes|no)")? {
                None => break false,
                Some(line) => match parse_yes_no(&line) {
                    Some(answer) => break answer,
                    None => writeln!(self.output, "Please answer yes or no.")?,
                },
            }
        };
        info!("  answer: {}", if answer { "yes" } else { "no" });
        Ok(answer)
    }

    fn select(&mut self, question: &str, options: &[String]) -> Result<usize> {
        info!("{}", question);
        writeln!(self.output, "{question}")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "  {}: {}", i + 1, option)?;
        }
        loop {
            let Some(line) = self.ask(&format!("Choice (1-{}):", options.len()))? else {
                return Err(Error::ConsentRequired("No selection was made.".to_string()));
            };
            match line.parse::<usize>() {
                Ok(choice) if (1..=options.len()).contains(&choice) => {
                    info!("  selected: {}", options[choice - 1]);
                    return Ok(choice - 1);
                }
                _ => writeln!(self.output, "Please enter a number from the list.")?,
            }
        }
    }
}

/// Answers yes to everything and picks the first option.
///
/// Only used by the test harness flags, where nobody is at the terminal.
#[derive(Debug, Default)]
pub struct AutoConfirm;

impl Prompter for AutoConfirm {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        info!("{}", question);
        info!("  answer: yes (automatic)");
        Ok(true)
    }

    fn select(&mut self, question: &str, options: &[String]) -> Result<usize> {
        info!("{}", question);
        if options.is_empty() {
            return Err(Error::ConsentRequired("There was nothing to choose from.".into()));
        }
        info!("  selected: {} (automatic)", options[0]);
        Ok(0)
    }
}
