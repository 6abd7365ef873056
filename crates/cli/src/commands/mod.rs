pub mod deploy;

pub use deploy::deploy_command;
