//! User-facing text shared across the run

use tracing::info;

pub const LOG_START: &str = "Logging run of simple-deploy...";
pub const LOG_END: &str = "Finished run of simple-deploy.";

pub const CONFIGURING: &str = "Configuring project for deployment...";

pub const UNCLEAN_GIT_OVERRIDDEN: &str =
    "Ignoring the state of the git working tree because --ignore-unclean-git was used.";

pub const CONFIRM_AUTOMATE_ALL: &str = "\
The --automate-all flag means simple-deploy will:
- Create resources on your platform account, which may cost money.
- Modify your settings file and dependency manifest, and add platform files.
- Commit all changes in your project to git.
- Push your project to the platform and start a deployment.
- Open your deployed project in a browser.

Resources created on the platform are not removed if a later step fails.";

pub const CANCELLED: &str = "Okay, cancelling this run. Nothing has been changed.";

pub const COMMIT_MESSAGE: &str = "Configured project for deployment.";

pub const LOG_DIR_CREATED: &str =
    "Created simple_deploy_logs/ to hold a log of each run. It is ignored by git.";

/// Print a line for the operator and record it in the run log.
pub fn emit(msg: impl AsRef<str>) {
    let msg = msg.as_ref();
    println!("{msg}");
    info!("{}", msg);
}

/// Print a line for the operator without recording it.
pub fn emit_unlogged(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref());
}

/// Confirmation question shown before automated deployment on a platform
pub fn confirm_automate_all(platform: &str) -> String {
    format!("{CONFIRM_AUTOMATE_ALL}\n\nDo you want to deploy your project to {platform} now?")
}

/// Manual steps left after configure-only mode, common to every platform
pub fn commit_steps() -> String {
    format!("    $ git status\n    $ git add .\n    $ git commit -am \"{COMMIT_MESSAGE}\"")
}
