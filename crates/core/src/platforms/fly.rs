//! Fly.io: a Docker image built from the repository, backed by Fly Postgres

use serde::Deserialize;
use tracing::{debug, info};

use super::{
    command_error, json_str, CreatedResources, ExistingBlock, Platform, PlatformAdapter,
    Session, UNIT_TEST_APP_NAME,
};
use crate::command::ShellCommand;
use crate::error::{Error, Result};
use crate::messages;
use crate::orchestrator::Outcome;
use crate::templates::variant_name;

pub const SETTINGS_MARKER: &str = "# Fly.io settings.";

/// Answers with the caller's nearest region in a `Fly-Region` header
pub const REGION_LOOKUP_URL: &str = "https://debug.fly.dev";

/// Region used when remote calls are disabled and none was given
pub const UNIT_TEST_REGION: &str = "sea";

/// Users every Fly Postgres cluster starts with
pub const DEFAULT_DB_USERS: &[&str] = &["flypgadmin", "postgres", "repmgr"];

const PACKAGES: &[(&str, &str)] = &[
    ("gunicorn", ""),
    ("psycopg2-binary", ""),
    ("dj-database-url", ""),
    ("whitenoise", ""),
];

#[derive(Debug, Clone, Deserialize)]
pub struct FlyApp {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Status", alias = "status", default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FlyDbUser {
    #[serde(rename = "Username", alias = "username")]
    username: String,
}

/// `fly auth whoami` output when nobody is logged in.
pub fn is_not_authenticated(stderr: &str) -> bool {
    stderr.contains("No access token available")
}

/// An app that was created but never deployed, and is not infrastructure.
pub fn is_eligible_app(app: &FlyApp) -> bool {
    app.status == "pending" && !app.name.starts_with("fly-builder-") && !app.name.ends_with("-db")
}

/// Who a Postgres cluster's users say it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbOwnership {
    /// Only the users every cluster starts with
    Unattached,
    /// Attached to the app already
    AttachedTo(String),
    /// Users nobody can account for
    Unexpected(Vec<String>),
}

pub fn classify_db_users(users: &[String], app_name: &str) -> DbOwnership {
    let app_user = app_name.replace('-', "_");
    let unexpected: Vec<String> = users
        .iter()
        .filter(|user| !DEFAULT_DB_USERS.contains(&user.as_str()) && **user != app_user)
        .cloned()
        .collect();

    if !unexpected.is_empty() {
        DbOwnership::Unexpected(unexpected)
    } else if users.contains(&app_user) {
        DbOwnership::AttachedTo(app_name.to_string())
    } else {
        DbOwnership::Unattached
    }
}

/// The nearest Fly.io region, as reported by Fly's debug endpoint.
pub fn nearest_region() -> Result<String> {
    let lookup_error = |message: String| Error::Command {
        command: format!("GET {REGION_LOOKUP_URL}"),
        message,
    };
    let response = reqwest::blocking::Client::new()
        .get(REGION_LOOKUP_URL)
        .send()
        .map_err(|e| lookup_error(e.to_string()))?;
    response
        .headers()
        .get("Fly-Region")
        .and_then(|value| value.to_str().ok())
        .map(|region| region.trim().to_string())
        .filter(|region| !region.is_empty())
        .ok_or_else(|| lookup_error("response had no Fly-Region header; pass --region".into()))
}

#[derive(Debug, Default)]
pub struct FlyAdapter {
    app_name: Option<String>,
    region: Option<String>,
    created: CreatedResources,
}

impl FlyAdapter {
    fn app_name(&self) -> Result<&str> {
        self.app_name
            .as_deref()
            .ok_or_else(|| Error::InvalidContext("Fly.io app has not been identified".into()))
    }

    fn db_name(&self) -> Result<String> {
        Ok(format!("{}-db", self.app_name()?))
    }

    fn list_apps(&self, session: &mut Session<'_>) -> Result<Vec<FlyApp>> {
        let command = ShellCommand::new("fly").args(["apps", "list", "--json"]);
        let output = session.run_quick(command.clone())?;
        if !output.success() {
            return Err(command_error(&command, &output));
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }

    fn find_or_create_app(&mut self, session: &mut Session<'_>) -> Result<String> {
        let apps = self.list_apps(session)?;
        let automate_all = session.context.automate_all();

        if let Some(requested) = session.context.deployed_project_name.clone() {
            if apps.iter().any(|app| app.name == requested) {
                messages::emit(format!("  Using Fly.io app {requested}"));
                return Ok(requested);
            }
            if automate_all {
                return self.create_app(session, Some(&requested));
            }
            return Err(Error::NoEligibleApp(format!(
                "There is no Fly.io app named {requested}.\n\
                 Create it with `fly apps create {requested}`, then run simple-deploy again."
            )));
        }

        let eligible: Vec<String> = apps
            .iter()
            .filter(|app| is_eligible_app(app))
            .map(|app| app.name.clone())
            .collect();
        debug!("Eligible apps: {:?}", eligible);

        match eligible.as_slice() {
            [name] => {
                messages::emit(format!("  Found undeployed app {name}"));
                Ok(name.clone())
            }
            _ if automate_all => self.create_app(session, None),
            [] => Err(Error::NoEligibleApp(
                "Could not find a Fly.io app that has not been deployed yet.\n\
                 Create one with `fly apps create --generate-name`, then run simple-deploy again."
                    .to_string(),
            )),
            names => choose_app(session, names),
        }
    }

    fn create_app(&mut self, session: &mut Session<'_>, name: Option<&str>) -> Result<String> {
        let mut command = ShellCommand::new("fly").args(["apps", "create"]);
        command = match name {
            Some(name) => command.args(["--name", name]),
            None => command.arg("--generate-name"),
        };
        let output = session.run_quick(command.arg("--json"))?;
        if !output.success() {
            return Err(self.created.error(
                "Could not create a Fly.io app.",
                output.stderr.trim(),
            ));
        }

        let parsed: serde_json::Value = serde_json::from_str(&output.stdout).map_err(|_| {
            self.created
                .error("Fly.io returned output simple-deploy could not read while creating an app.", output.stdout.trim())
        })?;
        let app_name = json_str(&parsed, &["Name", "name"])
            .map(str::to_string)
            .ok_or_else(|| self.created.error("Fly.io did not report the new app's name.", output.stdout.trim()))?;

        self.created.push(format!("Fly.io app {app_name}"));
        messages::emit(format!("  Created app {app_name}"));
        Ok(app_name)
    }

    fn database_users(&self, session: &mut Session<'_>, db_name: &str) -> Result<Vec<String>> {
        let command = ShellCommand::new("fly").args(["postgres", "users", "list", "-a", db_name, "--json"]);
        let output = session.run_quick(command.clone())?;
        if !output.success() {
            return Err(command_error(&command, &output));
        }
        let users: Vec<FlyDbUser> = serde_json::from_str(&output.stdout)?;
        Ok(users.into_iter().map(|u| u.username).collect())
    }

    fn database_exists(&self, session: &mut Session<'_>, db_name: &str) -> Result<bool> {
        let command = ShellCommand::new("fly").args(["postgres", "list", "--json"]);
        let output = session.run_quick(command.clone())?;
        if !output.success() {
            return Err(command_error(&command, &output));
        }
        let clusters: Vec<FlyApp> = serde_json::from_str(&output.stdout)?;
        Ok(clusters.iter().any(|cluster| cluster.name == db_name))
    }

    fn create_database(&mut self, session: &mut Session<'_>, db_name: &str, region: &str) -> Result<()> {
        messages::emit(format!("  Creating Postgres database {db_name}. This may take a few minutes..."));
        let command = ShellCommand::new("fly").args([
            "postgres",
            "create",
            "--name",
            db_name,
            "--region",
            region,
            "--initial-cluster-size",
            "1",
            "--vm-size",
            "shared-cpu-1x",
            "--volume-size",
            "1",
        ]);
        let output = session.run_slow(command, true)?;
        if !output.success() {
            return Err(self.created.error(
                format!("Could not create the database {db_name}."),
                output.stdout.trim(),
            ));
        }
        self.created.push(format!("Fly Postgres cluster {db_name}"));
        Ok(())
    }

    fn attach_database(&mut self, session: &mut Session<'_>, db_name: &str) -> Result<()> {
        let app_name = self.app_name()?.to_string();
        messages::emit(format!("  Attaching {db_name} to {app_name}..."));
        let command = ShellCommand::new("fly").args(["postgres", "attach", "--app", app_name.as_str(), db_name]);
        let output = session.run_slow(command, true)?;
        if !output.success() {
            return Err(self.created.error(
                format!("Could not attach {db_name} to {app_name}."),
                output.stdout.trim(),
            ));
        }
        Ok(())
    }

    fn set_secrets(&mut self, session: &mut Session<'_>) -> Result<()> {
        let app_name = self.app_name()?.to_string();
        let command = ShellCommand::new("fly").args(["secrets", "set", "-a", app_name.as_str(), "ON_FLYIO=1", "DEBUG=FALSE"]);
        let output = session.run_quick(command)?;
        if !output.success() {
            return Err(self.created.error(
                format!("Could not set secrets on {app_name}."),
                output.stderr.trim(),
            ));
        }
        Ok(())
    }
}

fn choose_app(session: &mut Session<'_>, names: &[String]) -> Result<String> {
    let index = session
        .prompter
        .select("Which Fly.io app do you want to deploy to?", names)?;
    let name = &names[index];
    if session.confirm(&format!("You selected {name}. Is that the app you want to deploy to?"))? {
        return Ok(name.clone());
    }
    Err(Error::ConsentRequired(
        "No Fly.io app was chosen.\n\
         Pass --deployed-project-name to name the app you want, then run simple-deploy again."
            .to_string(),
    ))
}

impl PlatformAdapter for FlyAdapter {
    fn platform(&self) -> Platform {
        Platform::FlyIo
    }

    fn validate_platform(&mut self, session: &mut Session<'_>) -> Result<()> {
        if session.context.unit_testing() {
            self.app_name = Some(
                session
                    .context
                    .deployed_project_name
                    .clone()
                    .unwrap_or_else(|| UNIT_TEST_APP_NAME.to_string()),
            );
            self.region = Some(
                session
                    .context
                    .region
                    .clone()
                    .unwrap_or_else(|| UNIT_TEST_REGION.to_string()),
            );
            return Ok(());
        }

        session.ensure_cli(Platform::FlyIo, &["version"])?;
        session.check_auth(
            Platform::FlyIo,
            ShellCommand::new("fly").args(["auth", "whoami"]),
            is_not_authenticated,
            "fly auth login",
        )?;

        let app_name = self.find_or_create_app(session)?;
        self.app_name = Some(app_name);

        let region = match session.context.region.clone() {
            Some(region) => region,
            None => nearest_region()?,
        };
        info!("Region: {}", region);
        self.region = Some(region);
        Ok(())
    }

    fn provision_resources(&mut self, session: &mut Session<'_>) -> Result<()> {
        if session.context.unit_testing() {
            return Ok(());
        }

        let app_name = self.app_name()?.to_string();
        let db_name = self.db_name()?;
        let region = self.region.clone().unwrap_or_else(|| UNIT_TEST_REGION.to_string());

        if self.database_exists(session, &db_name)? {
            let users = self.database_users(session, &db_name)?;
            match classify_db_users(&users, &app_name) {
                DbOwnership::AttachedTo(_) => {
                    messages::emit(format!("  Found {db_name}, already attached to {app_name}"));
                }
                DbOwnership::Unattached => {
                    let question = format!(
                        "A database named {db_name} already exists and is not attached to any app.\n\
                         Attach it to {app_name}?"
                    );
                    if !session.confirm(&question)? {
                        return Err(Error::ConsentRequired(format!(
                            "{db_name} was not attached, and simple-deploy will not create a second database with that name.\n\
                             Destroy it with `fly postgres destroy {db_name}` or allow it to be used, then run simple-deploy again."
                        )));
                    }
                    self.attach_database(session, &db_name)?;
                }
                DbOwnership::Unexpected(extra) => {
                    return Err(Error::AmbiguousResource(format!(
                        "The database {db_name} has users simple-deploy cannot account for: {}.\n\
                         It may belong to another app, so it will not be used. Destroy it with \
                         `fly postgres destroy {db_name}` or deploy under another app name.\n\
                         Resources already created remotely have not been removed: {}.",
                        extra.join(", "),
                        self.created.describe()
                    )));
                }
            }
        } else {
            self.create_database(session, &db_name, &region)?;
            self.attach_database(session, &db_name)?;
        }

        self.set_secrets(session)
    }

    fn mutate_settings(&mut self, session: &mut Session<'_>) -> Result<()> {
        let context = session.template_context(self.app_name()?);
        session.apply_settings_block(SETTINGS_MARKER, "fly/settings.py.tera", context, ExistingBlock::Keep)?;
        Ok(())
    }

    fn required_packages(&self) -> &'static [(&'static str, &'static str)] {
        PACKAGES
    }

    fn generate_platform_files(&mut self, session: &mut Session<'_>) -> Result<()> {
        messages::emit("Generating Fly.io files...");
        let mut context = session.template_context(self.app_name()?);
        context.insert("region", self.region.as_deref().unwrap_or(UNIT_TEST_REGION));

        let root = session.context.git_root.clone();
        let dockerfile = variant_name("fly/Dockerfile", session.context.dependency_manager);
        session.write_platform_file(&root.join("Dockerfile"), &dockerfile, &context)?;
        session.write_platform_file(&root.join(".dockerignore"), "fly/dockerignore.tera", &context)?;
        session.write_platform_file(&root.join("fly.toml"), "fly/fly.toml.tera", &context)?;
        Ok(())
    }

    fn conclude(&mut self, session: &mut Session<'_>) -> Result<()> {
        session.commit_changes()?;
        if session.context.unit_testing() {
            return Ok(());
        }

        let app_name = self.app_name()?.to_string();
        messages::emit(format!("Deploying {app_name} to Fly.io. This may take a few minutes..."));
        let deploy = ShellCommand::new("fly").args(["deploy", "-a", app_name.as_str()]);
        let output = session.run_slow(deploy.clone(), false)?;
        if !output.success() {
            return Err(command_error(&deploy, &output));
        }

        let open = ShellCommand::new("fly").args(["apps", "open", "-a", app_name.as_str()]);
        let output = session.run_quick(open)?;
        if !output.success() {
            info!("Could not open the deployed app: {}", output.stderr.trim());
        }
        Ok(())
    }

    fn report(&self, _session: &Session<'_>, outcome: Outcome) -> String {
        let app = self.app_name.as_deref().unwrap_or(UNIT_TEST_APP_NAME);
        match outcome {
            Outcome::Deployed => format!(
                "\n--- Your project should now be deployed on Fly.io ---\n\n\
                 It should have opened in a new browser tab. If you see a \"server not available\" \
                 message, wait a minute or two and refresh the tab.\n\
                 You can also visit your project at https://{app}.fly.dev\n\n\
                 If you make further changes and want to push them to Fly.io, commit your \
                 changes and then run `fly deploy -a {app}`.\n"
            ),
            _ => format!(
                "\n--- Your project is now configured for deployment on Fly.io ---\n\n\
                 To deploy your project, you will need to:\n\
                 - Create and attach a database, and set the secrets the settings expect:\n    \
                 $ fly postgres create --name {app}-db\n    \
                 $ fly postgres attach --app {app} {app}-db\n    \
                 $ fly secrets set -a {app} ON_FLYIO=1 DEBUG=FALSE\n\
                 - Commit the changes made in the configuration process:\n{}\n\
                 - Push your project to Fly.io's servers:\n    \
                 $ fly deploy -a {app}\n\
                 - Open your project:\n    \
                 $ fly apps open -a {app}\n",
                messages::commit_steps()
            ),
        }
    }
}
