//! Discover which platform plugin is installed in the project's Python environment
//!
//! Plugins are ordinary Python distributions named `dsd-<platform>`. The
//! resolver looks for their `*.dist-info` metadata in the site-packages of
//! the first environment it finds and requires exactly one match.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::command::{CommandRunner, ShellCommand};
use crate::error::{Error, Result};
use crate::ledger::normalize_name;
use crate::platforms::Platform;

/// Distribution name prefix shared by every platform plugin
pub const PLUGIN_PREFIX: &str = "dsd-";

/// Virtual environment directory names tried under the project and git roots
pub const VENV_DIR_NAMES: &[&str] = &[".venv", "venv", "env", "ll_env"];

const SITE_PACKAGES_QUERY: &str =
    "import site; print('\\n'.join(site.getsitepackages() + [site.getusersitepackages()]))";

/// A plugin distribution found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    /// Normalized distribution name, e.g. `dsd-flyio`
    pub name: String,
    pub version: Option<String>,
    pub metadata_dir: PathBuf,
}

/// Find `site-packages` directories below a virtual environment.
pub fn site_packages_in(venv: &Path) -> Vec<PathBuf> {
    WalkDir::new(venv)
        .max_depth(4)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir() && entry.file_name() == "site-packages")
        .map(|entry| entry.into_path())
        .collect()
}

/// Site-packages of the project's Python environment, in search order.
///
/// The first environment that yields any directory wins: `VIRTUAL_ENV`, then
/// a conventional venv directory under the project or git root, then the
/// interpreter on PATH.
pub fn discover_site_packages(
    project_root: &Path,
    git_root: Option<&Path>,
    runner: &mut dyn CommandRunner,
) -> Vec<PathBuf> {
    if let Some(venv) = env::var_os("VIRTUAL_ENV").filter(|v| !v.is_empty()) {
        let dirs = site_packages_in(Path::new(&venv));
        if !dirs.is_empty() {
            debug!("Using active virtual environment {:?}", venv);
            return dirs;
        }
    }

    let mut roots = vec![project_root];
    if let Some(git_root) = git_root.filter(|g| *g != project_root) {
        roots.push(git_root);
    }
    for root in roots {
        for name in VENV_DIR_NAMES {
            let candidate = root.join(name);
            if !candidate.is_dir() {
                continue;
            }
            let dirs = site_packages_in(&candidate);
            if !dirs.is_empty() {
                debug!("Using virtual environment {}", candidate.display());
                return dirs;
            }
        }
    }

    for python in ["python3", "python"] {
        if !runner.program_available(python) {
            continue;
        }
        let query = ShellCommand::new(python).args(["-c", SITE_PACKAGES_QUERY]);
        match runner.run_quick(&query) {
            Ok(output) if output.success() => {
                return output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(PathBuf::from)
                    .filter(|dir| dir.is_dir())
                    .collect();
            }
            Ok(output) => debug!("{} could not list site-packages: {}", python, output.stderr),
            Err(e) => debug!("{} could not list site-packages: {}", python, e),
        }
    }

    Vec::new()
}

/// Parse a `*.dist-info` or `*.egg-info` directory name into (name, version).
pub fn parse_metadata_dir_name(dir_name: &str) -> Option<(String, Option<String>)> {
    let stem = dir_name
        .strip_suffix(".dist-info")
        .or_else(|| dir_name.strip_suffix(".egg-info"))?;
    match stem.split_once('-') {
        Some((name, version)) => Some((normalize_name(name), Some(version.to_string()))),
        None => Some((normalize_name(stem), None)),
    }
}

/// Read `Name:` and `Version:` from a METADATA or PKG-INFO file.
fn read_metadata(metadata_dir: &Path) -> Option<(String, Option<String>)> {
    let contents = ["METADATA", "PKG-INFO"]
        .iter()
        .find_map(|file| fs::read_to_string(metadata_dir.join(file)).ok())?;

    let mut name = None;
    let mut version = None;
    for line in contents.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(normalize_name(value));
        } else if let Some(value) = line.strip_prefix("Version:") {
            version = Some(value.trim().to_string());
        }
    }
    name.map(|name| (name, version))
}

/// Plugin distributions installed in one site-packages directory.
pub fn scan_site_packages(dir: &Path) -> Vec<InstalledPlugin> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut plugins: Vec<InstalledPlugin> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let (name, version) = read_metadata(&entry.path())
                .or_else(|| parse_metadata_dir_name(&dir_name))?;
            name.starts_with(PLUGIN_PREFIX).then(|| InstalledPlugin {
                name,
                version,
                metadata_dir: entry.path(),
            })
        })
        .collect();
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    plugins
}

/// Comma-separated names of the officially supported plugins
pub fn supported_plugins() -> String {
    Platform::ALL
        .iter()
        .map(|p| p.plugin_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Apply the exactly-one rule to the plugins found.
pub fn select(plugins: &[InstalledPlugin]) -> Result<Platform> {
    let mut names: Vec<&str> = plugins.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    match names.as_slice() {
        [] => Err(Error::NoPluginInstalled {
            supported: supported_plugins(),
        }),
        [name] => Platform::from_plugin_name(name).ok_or_else(|| Error::UnsupportedPlugin {
            name: name.to_string(),
            supported: supported_plugins(),
        }),
        many => Err(Error::AmbiguousPlugins {
            found: many.join(", "),
        }),
    }
}

/// Finds the single installed platform plugin.
#[derive(Debug, Clone, Default)]
pub struct PluginResolver {
    site_packages: Vec<PathBuf>,
}

impl PluginResolver {
    pub fn new(site_packages: Vec<PathBuf>) -> Self {
        Self { site_packages }
    }

    /// Resolver over the project's Python environment.
    pub fn discover(
        project_root: &Path,
        git_root: Option<&Path>,
        runner: &mut dyn CommandRunner,
    ) -> Self {
        Self::new(discover_site_packages(project_root, git_root, runner))
    }

    pub fn site_packages(&self) -> &[PathBuf] {
        &self.site_packages
    }

    pub fn installed(&self) -> Vec<InstalledPlugin> {
        let mut plugins: Vec<InstalledPlugin> = self
            .site_packages
            .iter()
            .flat_map(|dir| scan_site_packages(dir))
            .collect();
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        plugins
    }

    pub fn resolve(&self) -> Result<Platform> {
        debug!("Searching for plugins in {:?}", self.site_packages);
        let installed = self.installed();
        let platform = select(&installed)?;
        if let Some(plugin) = installed.first() {
            info!(
                "Using plugin: {} {}",
                plugin.name,
                plugin.version.as_deref().unwrap_or("")
            );
        }
        Ok(platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;
    use tempfile::TempDir;

    fn install(site_packages: &Path, dist: &str, name: &str, version: &str) {
        let dir = site_packages.join(dist);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n\nLong description\nName: nope\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_parse_metadata_dir_name() {
        assert_eq!(
            parse_metadata_dir_name("dsd_flyio-1.0.0.dist-info"),
            Some(("dsd-flyio".to_string(), Some("1.0.0".to_string())))
        );
        assert_eq!(
            parse_metadata_dir_name("Dsd_Heroku.egg-info"),
            Some(("dsd-heroku".to_string(), None))
        );
        assert_eq!(parse_metadata_dir_name("django"), None);
    }

    #[test]
    fn test_scan_filters_by_prefix() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "Django-5.0.dist-info", "Django", "5.0");
        install(temp_dir.path(), "dsd_flyio-1.0.0.dist-info", "dsd-flyio", "1.0.0");
        fs::create_dir(temp_dir.path().join("dsd_flyio")).unwrap();

        let plugins = scan_site_packages(temp_dir.path());
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "dsd-flyio");
        assert_eq!(plugins[0].version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_scan_without_metadata_file_uses_dir_name() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("dsd_platformsh-0.9.dist-info")).unwrap();
        let plugins = scan_site_packages(temp_dir.path());
        assert_eq!(plugins[0].name, "dsd-platformsh");
    }

    #[test]
    fn test_select_exactly_one() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = PluginResolver::new(vec![temp_dir.path().to_path_buf()]);
        assert!(matches!(resolver.resolve(), Err(Error::NoPluginInstalled { .. })));

        install(temp_dir.path(), "dsd_heroku-1.1.dist-info", "dsd-heroku", "1.1");
        assert_eq!(resolver.resolve().unwrap(), Platform::Heroku);

        install(temp_dir.path(), "dsd_flyio-1.0.dist-info", "dsd-flyio", "1.0");
        match resolver.resolve() {
            Err(Error::AmbiguousPlugins { found }) => assert_eq!(found, "dsd-flyio, dsd-heroku"),
            other => panic!("expected ambiguous plugins, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_plugin_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "dsd_render-0.1.dist-info", "dsd-render", "0.1");
        let resolver = PluginResolver::new(vec![temp_dir.path().to_path_buf()]);
        assert!(matches!(resolver.resolve(), Err(Error::UnsupportedPlugin { .. })));
    }

    #[test]
    fn test_venv_under_project_root() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join(".venv/lib/python3.12/site-packages");
        fs::create_dir_all(&site).unwrap();

        let mut runner = FakeRunner::new();
        let dirs = discover_site_packages(temp_dir.path(), None, &mut runner);
        // VIRTUAL_ENV may point elsewhere when tests run inside an activated environment
        if env::var_os("VIRTUAL_ENV").is_none() {
            assert_eq!(dirs, vec![site]);
        }
    }
}
