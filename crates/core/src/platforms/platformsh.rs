//! Platform.sh: a project with app, routes, and services declared in YAML

use tracing::info;

use super::{
    command_error, CreatedResources, ExistingBlock, Platform, PlatformAdapter, Session,
    UNIT_TEST_APP_NAME,
};
use crate::command::ShellCommand;
use crate::error::{Error, Result};
use crate::messages;
use crate::orchestrator::Outcome;
use crate::templates::variant_name;

pub const SETTINGS_MARKER: &str = "# Platform.sh settings.";

pub const DEFAULT_REGION: &str = "us-3.platform.sh";

const PACKAGES: &[(&str, &str)] = &[
    ("gunicorn", ""),
    ("psycopg2", ""),
    ("platformshconfig", ""),
];

/// CLI output when no session token is available.
pub fn is_not_authenticated(stderr: &str) -> bool {
    stderr.contains("LoginRequiredException")
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Value of `key` in `platform project:info --format csv` output.
pub fn csv_property(csv: &str, key: &str) -> Option<String> {
    csv.lines()
        .skip(1)
        .filter_map(|line| line.split_once(','))
        .find(|(property, _)| unquote(property) == key)
        .map(|(_, value)| unquote(value).to_string())
}

/// Organization names from `platform organization:list --format csv` output.
pub fn organization_names(csv: &str) -> Vec<String> {
    csv.lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .map(unquote)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
pub struct PlatformShAdapter {
    project_name: Option<String>,
    project_id: Option<String>,
    url: Option<String>,
    created: CreatedResources,
}

impl PlatformShAdapter {
    fn project_name(&self) -> Result<&str> {
        self.project_name
            .as_deref()
            .ok_or_else(|| Error::InvalidContext("Platform.sh project has not been identified".into()))
    }

    fn read_linked_project(&mut self, session: &mut Session<'_>) -> Result<()> {
        let output = session.run_quick(ShellCommand::new("platform").args(["project:info", "--format", "csv"]))?;
        if is_not_authenticated(&output.stderr) {
            return Err(Error::CliNotAuthenticated {
                platform: Platform::PlatformSh.display_name().to_string(),
                login_command: "platform login".to_string(),
            });
        }
        if !output.success() {
            return Err(Error::NoEligibleApp(
                "No Platform.sh project is linked to this repository.\n\
                 Create one with `platform create`, or link an existing one with \
                 `platform project:set-remote <project-id>`, then run simple-deploy again."
                    .to_string(),
            ));
        }
        self.project_id = csv_property(&output.stdout, "id");
        if let Some(title) = csv_property(&output.stdout, "title") {
            messages::emit(format!("  Found Platform.sh project {title}"));
        }
        Ok(())
    }

    fn choose_organization(&self, session: &mut Session<'_>) -> Result<String> {
        let list = ShellCommand::new("platform").args(["organization:list", "--yes", "--format", "csv"]);
        let output = session.run_quick(list.clone())?;
        if !output.success() {
            return Err(command_error(&list, &output));
        }

        let names = organization_names(&output.stdout);
        match names.as_slice() {
            [] => Err(Error::NoEligibleApp(
                "Your Platform.sh account has no organization to create a project in.\n\
                 Create one in the Platform.sh console, then run simple-deploy again."
                    .to_string(),
            )),
            [name] => Ok(name.clone()),
            _ => {
                let index = session
                    .prompter
                    .select("Which Platform.sh organization should own the new project?", &names)?;
                let name = &names[index];
                if session.confirm(&format!("Create the project in the organization {name}?"))? {
                    Ok(name.clone())
                } else {
                    Err(Error::ConsentRequired(
                        "No Platform.sh organization was chosen, so no project was created.".to_string(),
                    ))
                }
            }
        }
    }

    fn create_project(&mut self, session: &mut Session<'_>, organization: &str) -> Result<()> {
        let name = self.project_name()?.to_string();
        let region = session
            .context
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        messages::emit(format!("  Creating Platform.sh project {name} in {region}..."));
        let create = ShellCommand::new("platform").args([
            "create",
            "--title",
            name.as_str(),
            "--org",
            organization,
            "--region",
            region.as_str(),
            "--yes",
        ]);
        let output = session.run_quick(create)?;
        if !output.success() {
            return Err(self.created.error(
                format!("Could not create the Platform.sh project {name}."),
                output.stderr.trim(),
            ));
        }
        self.project_id = output
            .stdout
            .lines()
            .last()
            .map(|line| line.trim().to_string())
            .filter(|id| !id.is_empty());
        self.created.push(format!("Platform.sh project {name}"));
        Ok(())
    }
}

impl PlatformAdapter for PlatformShAdapter {
    fn platform(&self) -> Platform {
        Platform::PlatformSh
    }

    fn validate_platform(&mut self, session: &mut Session<'_>) -> Result<()> {
        let name = session
            .context
            .deployed_project_name
            .clone()
            .unwrap_or_else(|| {
                if session.context.unit_testing() {
                    UNIT_TEST_APP_NAME.to_string()
                } else {
                    session.context.local_project_name.clone()
                }
            });
        self.project_name = Some(name);
        if session.context.unit_testing() {
            return Ok(());
        }

        session.ensure_cli(Platform::PlatformSh, &["--version"])?;
        session.check_auth(
            Platform::PlatformSh,
            ShellCommand::new("platform").args(["auth:info", "--no-interaction"]),
            is_not_authenticated,
            "platform login",
        )?;

        if session.context.automate_all() {
            let organization = self.choose_organization(session)?;
            self.create_project(session, &organization)
        } else {
            self.read_linked_project(session)
        }
    }

    fn mutate_settings(&mut self, session: &mut Session<'_>) -> Result<()> {
        let context = session.template_context(self.project_name()?);
        session.apply_settings_block(
            SETTINGS_MARKER,
            "platformsh/settings.py.tera",
            context,
            ExistingBlock::OfferReplace,
        )?;
        Ok(())
    }

    fn required_packages(&self) -> &'static [(&'static str, &'static str)] {
        PACKAGES
    }

    fn generate_platform_files(&mut self, session: &mut Session<'_>) -> Result<()> {
        messages::emit("Generating Platform.sh files...");
        let context = session.template_context(self.project_name()?);
        let root = session.context.git_root.clone();
        let app_yaml = variant_name("platformsh/platform.app.yaml", session.context.dependency_manager);

        session.write_platform_file(&root.join(".platform.app.yaml"), &app_yaml, &context)?;
        session.write_platform_file(
            &root.join(".platform").join("routes.yaml"),
            "platformsh/routes.yaml.tera",
            &context,
        )?;
        session.write_platform_file(
            &root.join(".platform").join("services.yaml"),
            "platformsh/services.yaml.tera",
            &context,
        )?;
        Ok(())
    }

    fn conclude(&mut self, session: &mut Session<'_>) -> Result<()> {
        session.commit_changes()?;
        if session.context.unit_testing() {
            return Ok(());
        }

        messages::emit("Pushing to Platform.sh. This may take a few minutes...");
        let push = ShellCommand::new("platform").args(["push", "--yes"]);
        let output = session.run_slow(push.clone(), false)?;
        if !output.success() {
            return Err(command_error(&push, &output));
        }

        let output = session.run_quick(ShellCommand::new("platform").args(["url", "--yes"]))?;
        if output.success() {
            self.url = output.stdout.lines().next().map(|line| line.trim().to_string());
        } else {
            info!("Could not open the deployed project: {}", output.stderr.trim());
        }
        Ok(())
    }

    fn report(&self, _session: &Session<'_>, outcome: Outcome) -> String {
        let project = self.project_name.as_deref().unwrap_or(UNIT_TEST_APP_NAME);
        match outcome {
            Outcome::Deployed => {
                let url = self
                    .url
                    .clone()
                    .unwrap_or_else(|| "the URL shown by `platform url`".to_string());
                format!(
                    "\n--- Your project should now be deployed on Platform.sh ---\n\n\
                     It should have opened in a new browser tab.\n\
                     You can also visit your project at {url}\n\n\
                     If you make further changes and want to push them to Platform.sh, commit \
                     your changes and then run `platform push`.\n"
                )
            }
            _ => format!(
                "\n--- Your project is now configured for deployment on Platform.sh ---\n\n\
                 To deploy your project, you will need to:\n\
                 - Commit the changes made in the configuration process:\n{}\n\
                 - Push your project to Platform.sh's servers:\n    \
                 $ platform push\n\
                 - Open your project:\n    \
                 $ platform url\n\n\
                 The app is named {project} in .platform.app.yaml.\n",
                messages::commit_steps()
            ),
        }
    }
}
