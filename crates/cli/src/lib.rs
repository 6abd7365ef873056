pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

// Re-export commonly used items
pub use cli::Cli;
