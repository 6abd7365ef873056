//! External command construction and execution

pub mod runner;
pub mod shell_command;

// Re-export commonly used types
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use shell_command::{ShellCommand, ShellFamily};
