//! Classify uncommitted changes as safe to build on or not
//!
//! simple-deploy commits and pushes on the operator's behalf in automated
//! mode, so it refuses to run over any change it cannot attribute to itself.
//! Changes it can attribute: its own untracked log directory, the
//! `django_simple_deploy` line added to `INSTALLED_APPS`, and the log
//! directory entry in `.gitignore`. Anything else blocks the run.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::context::ProjectInspection;
use crate::logging::LOG_DIR_NAME;

/// Substring of the app registration line in the settings file
pub const SETTINGS_MARKER: &str = "django_simple_deploy";

/// Ignore-file entry covering the log directory
pub const IGNORE_ENTRY: &str = "simple_deploy_logs/";

const IGNORE_FILE: &str = ".gitignore";

/// One line of `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: String,
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }

    /// Modified in the index and/or the work tree, and nothing else.
    pub fn is_modified_only(&self) -> bool {
        self.code.contains('M') && self.code.chars().all(|c| c == 'M' || c == ' ')
    }
}

pub fn parse_status(status_output: &str) -> Vec<StatusEntry> {
    status_output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let (code, path) = line.split_at(2);
            StatusEntry {
                code: code.to_string(),
                path: path.trim().trim_matches('"').to_string(),
            }
        })
        .collect()
}

/// Split `git diff` output into per-file sections keyed by the file's repository path.
pub fn split_diff(diff_output: &str) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in diff_output.lines() {
        if let Some(header) = line.strip_prefix("diff --git ") {
            current = header
                .rsplit_once(" b/")
                .map(|(_, path)| path.trim_matches('"').to_string());
            continue;
        }
        if let Some(ref path) = current {
            let section = sections.entry(path.clone()).or_default();
            section.push_str(line);
            section.push('\n');
        }
    }

    sections
}

/// Added or removed content lines of one file's diff, ignoring headers and whitespace-only noise.
pub fn meaningful_diff_lines(file_diff: &str) -> Vec<&str> {
    file_diff
        .lines()
        .filter(|line| !line.starts_with("+++") && !line.starts_with("---"))
        .filter(|line| line.starts_with('+') || line.starts_with('-'))
        .filter(|line| !line[1..].trim().is_empty())
        .collect()
}

/// An untracked path naming the tool's log directory.
pub fn is_log_dir_entry(path: &str) -> bool {
    Path::new(path.trim_end_matches('/'))
        .components()
        .any(|component| component.as_os_str() == LOG_DIR_NAME)
}

/// A settings diff line registering the tool's Django app.
pub fn is_settings_marker_line(line: &str) -> bool {
    line.contains(SETTINGS_MARKER)
}

/// An ignore-file diff line adding the tool's log directory.
pub fn is_ignore_marker_line(line: &str) -> bool {
    line.contains(IGNORE_ENTRY)
}

/// The safety check, configured with the repository paths it may tolerate changes to.
#[derive(Debug, Clone)]
pub struct GitSafetyGate {
    settings_path: String,
    ignore_path: String,
}

impl GitSafetyGate {
    /// `settings_path` is relative to the git root, with `/` separators.
    pub fn new(settings_path: impl Into<String>) -> Self {
        Self {
            settings_path: settings_path.into(),
            ignore_path: IGNORE_FILE.to_string(),
        }
    }

    pub fn for_inspection(inspection: &ProjectInspection) -> Self {
        let relative = inspection
            .settings_path
            .strip_prefix(&inspection.git_root)
            .unwrap_or(&inspection.settings_path);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(relative)
    }

    /// Whether it is safe to proceed given `git status --porcelain` and `git diff` output.
    pub fn check(&self, status_output: &str, diff_output: &str) -> bool {
        let entries = parse_status(status_output);

        let untracked: Vec<&StatusEntry> = entries.iter().filter(|e| e.is_untracked()).collect();
        if untracked.len() > 1 {
            debug!("More than one untracked entry: {:?}", untracked);
            return false;
        }
        if let Some(entry) = untracked.first() {
            if !is_log_dir_entry(&entry.path) {
                debug!("Untracked entry is not the log directory: {}", entry.path);
                return false;
            }
        }

        let diffs = split_diff(diff_output);
        for entry in entries.iter().filter(|e| !e.is_untracked()) {
            if !entry.is_modified_only() {
                debug!("Unsupported change `{}` to {}", entry.code, entry.path);
                return false;
            }

            let marker: fn(&str) -> bool = if entry.path == self.settings_path {
                is_settings_marker_line
            } else if entry.path == self.ignore_path {
                is_ignore_marker_line
            } else {
                debug!("Modified file outside the allow-list: {}", entry.path);
                return false;
            };

            let section = diffs.get(&entry.path).map(String::as_str).unwrap_or("");
            let lines = meaningful_diff_lines(section);
            let ok = match lines.as_slice() {
                [] => true,
                [line] => marker(line),
                _ => false,
            };
            if !ok {
                debug!("Diff of {} holds changes simple-deploy did not make", entry.path);
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_DIFF: &str = r#"diff --git a/blog/settings.py b/blog/settings.py
index 3c5a0b4..9f1e2d7 100644
--- a/blog/settings.py
+++ b/blog/settings.py
@@ -40,0 +41 @@ INSTALLED_APPS = [
+    "django_simple_deploy",
"#;

    const IGNORE_DIFF: &str = r#"diff --git a/.gitignore b/.gitignore
index 5b2a4c1..0d8e9f3 100644
--- a/.gitignore
+++ b/.gitignore
@@ -12,0 +13 @@ __pycache__/
+simple_deploy_logs/
"#;

    const UNRELATED_SETTINGS_DIFF: &str = r#"diff --git a/blog/settings.py b/blog/settings.py
index 3c5a0b4..9f1e2d7 100644
--- a/blog/settings.py
+++ b/blog/settings.py
@@ -27 +27 @@ SECRET_KEY = "django-insecure-abc"
-DEBUG = True
+DEBUG = False
"#;

    fn gate() -> GitSafetyGate {
        GitSafetyGate::new("blog/settings.py")
    }

    #[test]
    fn test_clean_tree_is_safe() {
        assert!(gate().check("", ""));
    }

    #[test]
    fn test_log_dir_untracked_is_safe() {
        assert!(gate().check("?? simple_deploy_logs/\n", ""));
        assert!(gate().check("?? blog_project/simple_deploy_logs/\n", ""));
    }

    #[test]
    fn test_other_untracked_file_is_unsafe() {
        assert!(!gate().check("?? notes.txt\n", ""));
    }

    #[test]
    fn test_two_untracked_entries_are_unsafe() {
        assert!(!gate().check("?? simple_deploy_logs/\n?? notes.txt\n", ""));
    }

    #[test]
    fn test_settings_marker_line_is_safe() {
        assert!(gate().check(" M blog/settings.py\n", SETTINGS_DIFF));
        assert!(gate().check("M  blog/settings.py\n", SETTINGS_DIFF));
    }

    #[test]
    fn test_unrelated_settings_change_is_unsafe() {
        assert!(!gate().check(" M blog/settings.py\n", UNRELATED_SETTINGS_DIFF));
    }

    #[test]
    fn test_ignore_marker_line_is_safe() {
        assert!(gate().check(" M .gitignore\n", IGNORE_DIFF));
    }

    #[test]
    fn test_all_tool_changes_together_are_safe() {
        let status = " M .gitignore\n M blog/settings.py\n?? simple_deploy_logs/\n";
        let diff = format!("{IGNORE_DIFF}{SETTINGS_DIFF}");
        assert!(gate().check(status, &diff));
    }

    #[test]
    fn test_extra_diff_line_flips_result() {
        let diff = format!("{SETTINGS_DIFF}+    \"debug_toolbar\",\n");
        assert!(!gate().check(" M blog/settings.py\n", &diff));
    }

    #[test]
    fn test_modified_file_outside_allow_list_is_unsafe() {
        let status = " M blog/views.py\n";
        let diff = "diff --git a/blog/views.py b/blog/views.py\n+print('hi')\n";
        assert!(!gate().check(status, diff));
    }

    #[test]
    fn test_other_change_kinds_are_unsafe() {
        assert!(!gate().check("D  blog/settings.py\n", ""));
        assert!(!gate().check("A  blog/new.py\n", ""));
        assert!(!gate().check("R  a.py -> b.py\n", ""));
    }

    #[test]
    fn test_whitespace_only_changes_are_ignored() {
        let diff = "diff --git a/.gitignore b/.gitignore\n--- a/.gitignore\n+++ b/.gitignore\n@@ -3,0 +4 @@\n+\n+   \n";
        assert!(gate().check(" M .gitignore\n", diff));
    }

    #[test]
    fn test_settings_marker_in_ignore_file_does_not_count() {
        let diff = "diff --git a/.gitignore b/.gitignore\n+django_simple_deploy\n";
        assert!(!gate().check(" M .gitignore\n", diff));
    }

    #[test]
    fn test_parse_status_strips_quotes() {
        let entries = parse_status("?? \"my notes.txt\"\n M blog/settings.py\n");
        assert_eq!(entries[0].path, "my notes.txt");
        assert!(entries[0].is_untracked());
        assert_eq!(entries[1].code, " M");
        assert!(entries[1].is_modified_only());
    }

    #[test]
    fn test_split_diff_by_file() {
        let diff = format!("{IGNORE_DIFF}{SETTINGS_DIFF}");
        let sections = split_diff(&diff);
        assert_eq!(sections.len(), 2);
        assert_eq!(meaningful_diff_lines(&sections[".gitignore"]), vec!["+simple_deploy_logs/"]);
        assert_eq!(
            meaningful_diff_lines(&sections["blog/settings.py"]),
            vec!["+    \"django_simple_deploy\","]
        );
    }
}
