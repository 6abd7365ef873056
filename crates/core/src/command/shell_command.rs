use std::path::PathBuf;
use std::process::Command;

/// Which shell is used to run slow commands and how arguments are quoted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFamily {
    Posix,
    Windows,
}

impl ShellFamily {
    /// Shell family of the machine running simple-deploy
    pub fn host() -> Self {
        if cfg!(windows) {
            ShellFamily::Windows
        } else {
            ShellFamily::Posix
        }
    }

    fn quote(&self, arg: &str) -> String {
        let needs_quoting = arg.is_empty()
            || arg
                .chars()
                .any(|c| c.is_whitespace() || "'\"$`\\|&;<>()*?!#".contains(c));
        if !needs_quoting {
            return arg.to_string();
        }
        match self {
            ShellFamily::Posix => format!("'{}'", arg.replace('\'', r"'\''")),
            ShellFamily::Windows => format!("\"{}\"", arg.replace('"', "\\\"")),
        }
    }
}

/// An external command: git, a platform CLI, or a dependency manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Render the command the way an operator would type it in a POSIX shell.
    pub fn to_shell_command(&self) -> String {
        self.to_shell_command_for(ShellFamily::Posix)
    }

    pub fn to_shell_command_for(&self, shell: ShellFamily) -> String {
        let mut cmd = shell.quote(&self.program);
        for arg in &self.args {
            cmd.push(' ');
            cmd.push_str(&shell.quote(arg));
        }
        cmd
    }

    /// True when the rendered command starts with `prefix`, e.g. `"fly apps list"`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.to_shell_command().starts_with(prefix)
    }

    /// Build a process that runs the program directly.
    pub(crate) fn to_process(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        self.apply_working_dir(&mut cmd);
        cmd
    }

    /// Build a process that runs through the host shell with stderr folded into stdout.
    pub(crate) fn to_merged_shell_process(&self, shell: ShellFamily) -> Command {
        let line = format!("{} 2>&1", self.to_shell_command_for(shell));
        let mut cmd = match shell {
            ShellFamily::Posix => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                cmd
            }
            ShellFamily::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(line);
                cmd
            }
        };
        self.apply_working_dir(&mut cmd);
        cmd
    }

    fn apply_working_dir(&self, cmd: &mut Command) {
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
    }
}
