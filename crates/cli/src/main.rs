use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use simple_deploy::Cli;

fn main() -> Result<ExitCode> {
    Cli::parse().execute()
}
