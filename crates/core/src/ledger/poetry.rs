//! Poetry's `pyproject.toml`
//!
//! Packages added by simple-deploy go into a dedicated `deploy` dependency
//! group so the operator's own `[tool.poetry.dependencies]` table is left alone.

use toml_edit::{DocumentMut, Item, Table, value};

use super::{ADDED_BY_MARKER, normalize_name};
use crate::error::{Error, Result};

/// Dependency group that receives the packages simple-deploy adds
pub const DEPLOY_GROUP: &str = "deploy";

pub(super) fn parse(contents: &str) -> Result<Vec<String>> {
    let doc = contents.parse::<DocumentMut>()?;
    let mut names = Vec::new();
    let Some(poetry) = doc
        .get("tool")
        .and_then(|tool| tool.get("poetry"))
        .and_then(Item::as_table_like)
    else {
        return Ok(names);
    };

    let mut push_table = |table: Option<&Item>| {
        let Some(deps) = table.and_then(Item::as_table_like) else {
            return;
        };
        for (name, _) in deps.iter() {
            let name = normalize_name(name);
            if name != "python" && !names.contains(&name) {
                names.push(name);
            }
        }
    };

    push_table(poetry.get("dependencies"));
    if let Some(groups) = poetry.get("group").and_then(Item::as_table_like) {
        for (_, group) in groups.iter() {
            push_table(group.get("dependencies"));
        }
    }

    Ok(names)
}

pub(super) fn append(contents: &str, name: &str, version_constraint: &str) -> Result<String> {
    let mut doc = contents.parse::<DocumentMut>()?;
    let constraint = if version_constraint.is_empty() {
        "*"
    } else {
        version_constraint
    };

    let poetry = doc
        .get_mut("tool")
        .and_then(|tool| tool.get_mut("poetry"))
        .and_then(Item::as_table_mut)
        .ok_or_else(|| Error::ConfigError("pyproject.toml has no [tool.poetry] table".into()))?;

    let group = child_table(poetry, "group", true)?;
    let deploy = child_table(group, DEPLOY_GROUP, true)?;
    let deps = child_table(deploy, "dependencies", false)?;

    deps.insert(name, value(constraint));
    if let Some(entry) = deps.get_mut(name).and_then(Item::as_value_mut) {
        entry.decor_mut().set_suffix(format!("  {ADDED_BY_MARKER}"));
    }

    Ok(doc.to_string())
}

/// Get or create a standard (bracketed) child table.
fn child_table<'a>(parent: &'a mut Table, key: &str, implicit: bool) -> Result<&'a mut Table> {
    parent
        .entry(key)
        .or_insert_with(|| {
            let mut table = Table::new();
            table.set_implicit(implicit);
            Item::Table(table)
        })
        .as_table_mut()
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "`{key}` in pyproject.toml must be a [table] to receive deployment dependencies"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYPROJECT: &str = r#"[tool.poetry]
name = "blog"
version = "0.1.0"
description = ""

[tool.poetry.dependencies]
python = "^3.12"
Django = "^5.0"
django_bootstrap5 = "^23.3"

[tool.poetry.group.dev.dependencies]
pytest = "^8.0"

[build-system]
requires = ["poetry-core"]
build-backend = "poetry.core.masonry.api"
"#;

    #[test]
    fn test_parse_includes_groups_but_not_python() {
        assert_eq!(
            parse(PYPROJECT).unwrap(),
            vec!["django", "django-bootstrap5", "pytest"]
        );
    }

    #[test]
    fn test_append_uses_deploy_group_and_preserves_content() {
        let updated = append(PYPROJECT, "gunicorn", "").unwrap();
        assert!(updated.contains("python = \"^3.12\"\nDjango = \"^5.0\"\ndjango_bootstrap5 = \"^23.3\"\n"));
        assert!(updated.contains("build-backend = \"poetry.core.masonry.api\""));
        assert!(updated.contains("[tool.poetry.group.deploy.dependencies]"));
        assert!(updated.contains(ADDED_BY_MARKER));
        assert_eq!(
            parse(&updated).unwrap(),
            vec!["django", "django-bootstrap5", "pytest", "gunicorn"]
        );

        let updated = append(&updated, "whitenoise", "^6.6").unwrap();
        assert_eq!(updated.matches("[tool.poetry.group.deploy.dependencies]").count(), 1);
        assert!(updated.contains("whitenoise = \"^6.6\""));
    }

    #[test]
    fn test_append_without_poetry_table_fails() {
        let result = append("[project]\nname = \"blog\"\n", "gunicorn", "");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
