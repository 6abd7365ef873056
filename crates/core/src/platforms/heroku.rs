//! Heroku: git push deploys with a Heroku Postgres add-on

use serde_json::Value;
use tracing::info;

use super::{
    command_error, json_str, CreatedResources, ExistingBlock, Flow, Platform, PlatformAdapter,
    Session, UNIT_TEST_APP_NAME,
};
use crate::command::ShellCommand;
use crate::context::DependencyManager;
use crate::error::{Error, Result};
use crate::ledger::DependencyLedger;
use crate::messages;
use crate::orchestrator::Outcome;

pub const SETTINGS_MARKER: &str = "# Heroku settings.";

/// Add-on service name of Heroku Postgres
pub const POSTGRES_SERVICE: &str = "heroku-postgresql";

/// Plan requested when simple-deploy creates the database
pub const POSTGRES_PLAN: &str = "heroku-postgresql:essential-0";

const PACKAGES: &[(&str, &str)] = &[
    ("gunicorn", ""),
    ("psycopg2", "<3.0"),
    ("dj-database-url", ""),
    ("whitenoise", ""),
];

/// `heroku auth:whoami` output when nobody is logged in.
pub fn is_not_authenticated(stderr: &str) -> bool {
    stderr.contains("not logged in") || stderr.contains("Invalid credentials")
}

/// Host part of a web URL such as `https://blog-1a2b.herokuapp.com/`.
pub fn host_from_url(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = without_scheme.split('/').next()?.trim();
    (!host.is_empty()).then(|| host.to_string())
}

/// Who a Heroku Postgres add-on is attached to, besides this app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonOwnership {
    Missing,
    /// One add-on, used only by this app
    OnlyThisApp(String),
    /// Shared with other apps, or more than one candidate
    Ambiguous(String),
}

pub fn classify_postgres_addons(addons: &Value, app_name: &str) -> AddonOwnership {
    let postgres: Vec<&Value> = addons
        .as_array()
        .map(|list| {
            list.iter()
                .filter(|addon| {
                    addon
                        .get("addon_service")
                        .and_then(|service| json_str(service, &["name"]))
                        == Some(POSTGRES_SERVICE)
                })
                .collect()
        })
        .unwrap_or_default();

    match postgres.as_slice() {
        [] => AddonOwnership::Missing,
        [addon] => {
            let name = json_str(addon, &["name"]).unwrap_or("unnamed add-on").to_string();
            let mut apps: Vec<&str> = addon
                .get("attachments")
                .and_then(Value::as_array)
                .map(|attachments| {
                    attachments
                        .iter()
                        .filter_map(|a| a.get("app").and_then(|app| json_str(app, &["name"])))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(owner) = addon.get("app").and_then(|app| json_str(app, &["name"])) {
                apps.push(owner);
            }
            let others: Vec<&str> = apps.into_iter().filter(|app| *app != app_name).collect();
            if others.is_empty() {
                AddonOwnership::OnlyThisApp(name)
            } else {
                AddonOwnership::Ambiguous(format!("{name} is also attached to {}", others.join(", ")))
            }
        }
        many => AddonOwnership::Ambiguous(format!(
            "found {} Postgres add-ons: {}",
            many.len(),
            many.iter()
                .filter_map(|addon| json_str(addon, &["name"]))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

#[derive(Debug, Default)]
pub struct HerokuAdapter {
    app_name: Option<String>,
    allowed_host: Option<String>,
    web_url: Option<String>,
    created: CreatedResources,
}

impl HerokuAdapter {
    fn app_name(&self) -> Result<&str> {
        self.app_name
            .as_deref()
            .ok_or_else(|| Error::InvalidContext("Heroku app has not been identified".into()))
    }

    fn remember_app(&mut self, name: &str, web_url: Option<&str>) {
        self.app_name = Some(name.to_string());
        self.allowed_host = Some(
            web_url
                .and_then(host_from_url)
                .unwrap_or_else(|| format!("{name}.herokuapp.com")),
        );
        self.web_url = web_url.map(str::to_string);
    }

    fn create_app(&mut self, session: &mut Session<'_>) -> Result<()> {
        let mut command = ShellCommand::new("heroku").arg("create");
        if let Some(name) = &session.context.deployed_project_name {
            command = command.arg(name);
        }
        let output = session.run_quick(command.arg("--json"))?;
        if !output.success() {
            return Err(self.created.error("Could not create a Heroku app.", output.stderr.trim()));
        }

        let parsed: Value = serde_json::from_str(&output.stdout).map_err(|_| {
            self.created.error(
                "Heroku returned output simple-deploy could not read while creating an app.",
                output.stdout.trim(),
            )
        })?;
        let name = json_str(&parsed, &["name"])
            .ok_or_else(|| self.created.error("Heroku did not report the new app's name.", output.stdout.trim()))?
            .to_string();
        self.created.push(format!("Heroku app {name}"));
        self.remember_app(&name, json_str(&parsed, &["web_url"]));
        messages::emit(format!("  Created app {name}"));
        Ok(())
    }
}

impl PlatformAdapter for HerokuAdapter {
    fn platform(&self) -> Platform {
        Platform::Heroku
    }

    fn confirm_preliminary(&mut self, session: &mut Session<'_>) -> Result<Flow> {
        if session.context.dependency_manager != DependencyManager::Poetry {
            return Ok(Flow::Continue);
        }
        let question = "Heroku does not read pyproject.toml. simple-deploy will export your Poetry \
                        dependencies to requirements.txt and add the packages Heroku needs there.\n\
                        Continue?";
        Ok(if session.confirm(question)? {
            Flow::Continue
        } else {
            Flow::Stop
        })
    }

    fn validate_platform(&mut self, session: &mut Session<'_>) -> Result<()> {
        if session.context.unit_testing() {
            let name = session
                .context
                .deployed_project_name
                .clone()
                .unwrap_or_else(|| UNIT_TEST_APP_NAME.to_string());
            self.remember_app(&name, None);
            return Ok(());
        }

        session.ensure_cli(Platform::Heroku, &["--version"])?;
        session.check_auth(
            Platform::Heroku,
            ShellCommand::new("heroku").arg("auth:whoami"),
            is_not_authenticated,
            "heroku login",
        )?;

        let mut info_command = ShellCommand::new("heroku").arg("apps:info");
        if let Some(name) = &session.context.deployed_project_name {
            info_command = info_command.args(["-a", name.as_str()]);
        }
        let output = session.run_quick(info_command.arg("--json"))?;

        if output.success() {
            let parsed: Value = serde_json::from_str(&output.stdout)?;
            let app = parsed.get("app").unwrap_or(&parsed);
            let name = json_str(app, &["name"]).ok_or_else(|| {
                Error::NoEligibleApp("Heroku did not report an app name for this project.".into())
            })?;
            messages::emit(format!("  Found Heroku app {name}"));
            self.remember_app(name, json_str(app, &["web_url"]));
            return Ok(());
        }

        if session.context.automate_all() {
            return self.create_app(session);
        }
        Err(Error::NoEligibleApp(
            "No Heroku app is associated with this project.\n\
             Create one with `heroku create`, then run simple-deploy again."
                .to_string(),
        ))
    }

    fn provision_resources(&mut self, session: &mut Session<'_>) -> Result<()> {
        if session.context.unit_testing() {
            return Ok(());
        }
        let app_name = self.app_name()?.to_string();

        let list = ShellCommand::new("heroku").args(["addons", "-a", app_name.as_str(), "--json"]);
        let output = session.run_quick(list.clone())?;
        if !output.success() {
            return Err(command_error(&list, &output));
        }
        let addons: Value = serde_json::from_str(&output.stdout)?;

        match classify_postgres_addons(&addons, &app_name) {
            AddonOwnership::Missing => {
                messages::emit(format!("  Adding a Postgres database to {app_name}..."));
                let create = ShellCommand::new("heroku").args(["addons:create", POSTGRES_PLAN, "-a", app_name.as_str()]);
                let output = session.run_quick(create)?;
                if !output.success() {
                    return Err(self.created.error(
                        format!("Could not add a Postgres database to {app_name}."),
                        output.stderr.trim(),
                    ));
                }
                self.created.push(format!("Heroku Postgres add-on on {app_name}"));
            }
            AddonOwnership::OnlyThisApp(addon) => {
                let question = format!("{app_name} already has the Postgres add-on {addon}. Use it for this deployment?");
                if !session.confirm(&question)? {
                    return Err(Error::ConsentRequired(format!(
                        "simple-deploy will not add a second database to {app_name}.\n\
                         Remove {addon} with `heroku addons:destroy {addon} -a {app_name}` or allow it to be used, \
                         then run simple-deploy again."
                    )));
                }
            }
            AddonOwnership::Ambiguous(details) => {
                return Err(Error::AmbiguousResource(format!(
                    "Could not decide which database {app_name} should use: {details}.\n\
                     Detach the add-ons this app should not use (`heroku addons -a {app_name}` lists them), \
                     then run simple-deploy again.\n\
                     Resources already created remotely have not been removed: {}.",
                    self.created.describe()
                )));
            }
        }

        let config = ShellCommand::new("heroku").args(["config:set", "ON_HEROKU=1", "DEBUG=FALSE", "-a", app_name.as_str()]);
        let output = session.run_quick(config)?;
        if !output.success() {
            return Err(self.created.error(
                format!("Could not set config vars on {app_name}."),
                output.stderr.trim(),
            ));
        }
        Ok(())
    }

    fn mutate_settings(&mut self, session: &mut Session<'_>) -> Result<()> {
        let mut context = session.template_context(self.app_name()?);
        context.insert("allowed_host", self.allowed_host.as_deref().unwrap_or_default());
        session.apply_settings_block(SETTINGS_MARKER, "heroku/settings.py.tera", context, ExistingBlock::Keep)?;
        Ok(())
    }

    fn prepare_dependency_manifest(&mut self, session: &mut Session<'_>) -> Result<()> {
        if session.context.dependency_manager != DependencyManager::Poetry {
            return Ok(());
        }
        if !session.runner.program_available("poetry") {
            return Err(Error::CliNotInstalled {
                platform: "Poetry".to_string(),
                program: "poetry".to_string(),
            });
        }

        let export = ShellCommand::new("poetry").args([
            "export",
            "-f",
            "requirements.txt",
            "--output",
            "requirements.txt",
            "--without-hashes",
        ]);
        let output = session.run_quick(export.clone())?;
        if !output.success() {
            return Err(command_error(&export, &output));
        }

        let requirements_txt = session.context.manifests.requirements_txt.clone();
        *session.ledger = DependencyLedger::load(DependencyManager::RequirementsTxt, requirements_txt)?;
        messages::emit("  Exported Poetry dependencies to requirements.txt");
        Ok(())
    }

    fn required_packages(&self) -> &'static [(&'static str, &'static str)] {
        PACKAGES
    }

    fn generate_platform_files(&mut self, session: &mut Session<'_>) -> Result<()> {
        messages::emit("Generating Heroku files...");
        let context = session.template_context(self.app_name()?);
        let procfile = session.context.git_root.join("Procfile");
        let placeholder = session.context.project_root.join("static").join("placeholder.file");
        session.write_platform_file(&procfile, "heroku/Procfile.tera", &context)?;
        session.write_platform_file(&placeholder, "heroku/placeholder.file.tera", &context)?;
        Ok(())
    }

    fn conclude(&mut self, session: &mut Session<'_>) -> Result<()> {
        session.commit_changes()?;
        if session.context.unit_testing() {
            return Ok(());
        }

        let output = session.run_quick(ShellCommand::new("git").args(["branch", "--show-current"]))?;
        let branch = match output.stdout.trim() {
            "" => "main".to_string(),
            name => name.to_string(),
        };

        messages::emit("Pushing project to Heroku. This may take a few minutes...");
        let refspec = format!("{branch}:main");
        let push = ShellCommand::new("git").args(["push", "heroku", refspec.as_str()]);
        let output = session.run_slow(push.clone(), false)?;
        if !output.success() {
            return Err(command_error(&push, &output));
        }

        let app_name = self.app_name()?.to_string();
        let output = session.run_quick(ShellCommand::new("heroku").args(["open", "-a", app_name.as_str()]))?;
        if !output.success() {
            info!("Could not open the deployed app: {}", output.stderr.trim());
        }
        Ok(())
    }

    fn report(&self, _session: &Session<'_>, outcome: Outcome) -> String {
        let app = self.app_name.as_deref().unwrap_or(UNIT_TEST_APP_NAME);
        match outcome {
            Outcome::Deployed => {
                let url = self
                    .web_url
                    .clone()
                    .unwrap_or_else(|| format!("https://{}/", self.allowed_host.as_deref().unwrap_or_default()));
                format!(
                    "\n--- Your project should now be deployed on Heroku ---\n\n\
                     It should have opened in a new browser tab.\n\
                     You can also visit your project at {url}\n\n\
                     If you make further changes and want to push them to Heroku, commit your \
                     changes and then run `git push heroku main`.\n"
                )
            }
            _ => format!(
                "\n--- Your project is now configured for deployment on Heroku ---\n\n\
                 To deploy your project, you will need to:\n\
                 - Add a database and set the config vars the settings expect:\n    \
                 $ heroku addons:create {POSTGRES_PLAN} -a {app}\n    \
                 $ heroku config:set ON_HEROKU=1 DEBUG=FALSE -a {app}\n\
                 - Commit the changes made in the configuration process:\n{}\n\
                 - Push your project to Heroku's servers:\n    \
                 $ git push heroku main\n\
                 - Open your project:\n    \
                 $ heroku open -a {app}\n",
                messages::commit_steps()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::context::ExecutionFlags;
    use crate::platforms::run_protocol;
    use crate::platforms::test_support::context_in;
    use crate::templates::Templates;
    use crate::testing::{FakeRunner, ScriptedPrompter};
    use std::fs;
    use tempfile::TempDir;

    const APPS_INFO: &str = r#"{
  "addons": [],
  "app": {
    "name": "still-brook-50123",
    "stack": {"name": "heroku-24"},
    "web_url": "https://still-brook-50123-8c1a2b3d4e5f.herokuapp.com/"
  },
  "dynos": []
}"#;

    const ADDONS: &str = r#"[
  {
    "name": "postgresql-rigid-04521",
    "addon_service": {"name": "heroku-postgresql"},
    "app": {"name": "still-brook-50123"},
    "attachments": [{"name": "DATABASE", "app": {"name": "still-brook-50123"}}]
  }
]"#;

    const SHARED_ADDONS: &str = r#"[
  {
    "name": "postgresql-rigid-04521",
    "addon_service": {"name": "heroku-postgresql"},
    "app": {"name": "old-blog"},
    "attachments": [
      {"name": "DATABASE", "app": {"name": "old-blog"}},
      {"name": "HEROKU_POSTGRESQL_RED", "app": {"name": "still-brook-50123"}}
    ]
  }
]"#;

    #[test]
    fn test_is_not_authenticated() {
        assert!(is_not_authenticated(" ▸    not logged in\n"));
        assert!(is_not_authenticated(" ▸    Invalid credentials provided.\n"));
        assert!(!is_not_authenticated(""));
    }

    #[test]
    fn test_host_from_url() {
        assert_eq!(
            host_from_url("https://still-brook-50123-8c1a2b3d4e5f.herokuapp.com/").as_deref(),
            Some("still-brook-50123-8c1a2b3d4e5f.herokuapp.com")
        );
        assert_eq!(host_from_url("https://"), None);
    }

    #[test]
    fn test_classify_postgres_addons() {
        let app = "still-brook-50123";
        assert_eq!(
            classify_postgres_addons(&serde_json::json!([]), app),
            AddonOwnership::Missing
        );
        assert_eq!(
            classify_postgres_addons(&serde_json::from_str(ADDONS).unwrap(), app),
            AddonOwnership::OnlyThisApp("postgresql-rigid-04521".to_string())
        );
        assert!(matches!(
            classify_postgres_addons(&serde_json::from_str(SHARED_ADDONS).unwrap(), app),
            AddonOwnership::Ambiguous(_)
        ));
    }

    fn heroku_runner() -> FakeRunner {
        FakeRunner::new()
            .respond("heroku --version", CommandOutput::ok("heroku/8.11.5 linux-x64 node-v20.11.1\n"))
            .respond("heroku auth:whoami", CommandOutput::ok("ehmatthes@example.com\n"))
            .respond("heroku apps:info", CommandOutput::ok(APPS_INFO))
    }

    #[test]
    fn test_configure_only_writes_procfile_and_settings() {
        let temp_dir = TempDir::new().unwrap();
        let context = context_in(temp_dir.path(), Platform::Heroku, ExecutionFlags::default());
        let templates = Templates::load().unwrap();
        let mut runner = heroku_runner();
        let mut prompter = ScriptedPrompter::new();
        let mut ledger = DependencyLedger::from_context(&context);
        let mut session = Session::new(&context, &mut runner, &mut prompter, &mut ledger, &templates);

        let outcome = run_protocol(&mut HerokuAdapter::default(), &mut session).unwrap();
        assert_eq!(outcome, Outcome::Configured);

        let procfile = fs::read_to_string(temp_dir.path().join("Procfile")).unwrap();
        assert!(procfile.contains("web: gunicorn blog.wsgi --log-file -"));
        assert!(temp_dir.path().join("static/placeholder.file").is_file());

        let settings = fs::read_to_string(temp_dir.path().join("blog/settings.py")).unwrap();
        assert!(settings.contains("still-brook-50123-8c1a2b3d4e5f.herokuapp.com"));

        let requirements = fs::read_to_string(temp_dir.path().join("requirements.txt")).unwrap();
        assert!(requirements.contains("psycopg2<3.0"));
        assert!(!runner.invoked("heroku addons"));
    }

    #[test]
    fn test_shared_addon_is_a_hard_stop() {
        let temp_dir = TempDir::new().unwrap();
        let context = context_in(
            temp_dir.path(),
            Platform::Heroku,
            ExecutionFlags {
                automate_all: true,
                ..Default::default()
            },
        );
        let templates = Templates::load().unwrap();
        let mut runner = heroku_runner().respond("heroku addons -a", CommandOutput::ok(SHARED_ADDONS));
        let mut prompter = ScriptedPrompter::new();
        let mut ledger = DependencyLedger::from_context(&context);
        let mut session = Session::new(&context, &mut runner, &mut prompter, &mut ledger, &templates);

        let mut adapter = HerokuAdapter::default();
        adapter.validate_platform(&mut session).unwrap();
        let result = adapter.provision_resources(&mut session);
        assert!(matches!(result, Err(Error::AmbiguousResource(_))));
        assert!(!runner.invoked("heroku config:set"));
    }

    #[test]
    fn test_declining_existing_addon_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let context = context_in(
            temp_dir.path(),
            Platform::Heroku,
            ExecutionFlags {
                automate_all: true,
                ..Default::default()
            },
        );
        let templates = Templates::load().unwrap();
        let mut runner = heroku_runner().respond("heroku addons -a", CommandOutput::ok(ADDONS));
        let mut prompter = ScriptedPrompter::new().confirm_with(false);
        let mut ledger = DependencyLedger::from_context(&context);
        let mut session = Session::new(&context, &mut runner, &mut prompter, &mut ledger, &templates);

        let mut adapter = HerokuAdapter::default();
        adapter.validate_platform(&mut session).unwrap();
        let result = adapter.provision_resources(&mut session);
        assert!(matches!(result, Err(Error::ConsentRequired(_))));
    }

    #[test]
    fn test_automate_all_creates_app_when_none_is_linked() {
        let temp_dir = TempDir::new().unwrap();
        let context = context_in(
            temp_dir.path(),
            Platform::Heroku,
            ExecutionFlags {
                automate_all: true,
                ..Default::default()
            },
        );
        let templates = Templates::load().unwrap();
        let mut runner = FakeRunner::new()
            .respond("heroku --version", CommandOutput::ok("heroku/8.11.5 linux-x64 node-v20.11.1\n"))
            .respond("heroku auth:whoami", CommandOutput::ok("ehmatthes@example.com\n"))
            .respond("heroku apps:info", CommandOutput::failed(" ▸    Missing required flag app\n"))
            .respond(
                "heroku create",
                CommandOutput::ok(r#"{"name": "sleepy-owl-31337", "web_url": "https://sleepy-owl-31337-abc.herokuapp.com/"}"#),
            )
            .respond("heroku addons -a", CommandOutput::ok("[]"))
            .respond("git branch --show-current", CommandOutput::ok("main\n"));
        let mut prompter = ScriptedPrompter::new();
        let mut ledger = DependencyLedger::from_context(&context);
        let mut session = Session::new(&context, &mut runner, &mut prompter, &mut ledger, &templates);

        let outcome = run_protocol(&mut HerokuAdapter::default(), &mut session).unwrap();
        assert_eq!(outcome, Outcome::Deployed);
        assert!(runner.invoked("heroku addons:create heroku-postgresql:essential-0 -a sleepy-owl-31337"));
        assert!(runner.invoked("git push heroku main:main"));
    }

    #[test]
    fn test_declining_poetry_export_stops_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let mut context = context_in(temp_dir.path(), Platform::Heroku, ExecutionFlags::default());
        context.dependency_manager = DependencyManager::Poetry;
        let templates = Templates::load().unwrap();
        let mut runner = heroku_runner();
        let mut prompter = ScriptedPrompter::new().confirm_with(false);
        let mut ledger = DependencyLedger::from_context(&context);
        let mut session = Session::new(&context, &mut runner, &mut prompter, &mut ledger, &templates);

        let outcome = run_protocol(&mut HerokuAdapter::default(), &mut session).unwrap();
        assert_eq!(outcome, Outcome::Declined);
        assert!(runner.invocations.is_empty());
        assert!(!ledger.is_present("django-simple-deploy"));
        assert!(!temp_dir.path().join(".gitignore").exists());
    }
}
