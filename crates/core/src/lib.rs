//! simple-deploy - configure a Django project for deployment to a hosting platform
//!
//! This crate provides functionality to:
//! - Inspect a Django project and decide whether it is safe to modify
//! - Resolve the installed platform plugin to one deployment target
//! - Update settings, dependency manifests, and platform files idempotently
//! - Optionally create remote resources, commit, and push (`--automate-all`)
pub mod command;
pub mod context;
pub mod error;
pub mod files;
pub mod git_gate;
pub mod inspector;
pub mod ledger;
pub mod logging;
pub mod messages;
pub mod orchestrator;
pub mod platforms;
pub mod plugins;
pub mod prompt;
pub mod templates;

// Scripted runner and prompter for tests across the workspace
#[doc(hidden)]
pub mod testing;

// Re-export commonly used types and traits
pub use error::{Error, Result};

// Re-export main API components
pub use command::{CommandOutput, CommandRunner, ShellCommand, ShellFamily, SystemRunner};
pub use context::{DependencyManager, DeploymentContext, ExecutionFlags};
pub use logging::RunLog;
pub use orchestrator::{Orchestrator, Outcome, RunOptions};
pub use platforms::Platform;
pub use prompt::{AutoConfirm, LinePrompter, Prompter, TerminalPrompter};
