//! Pipenv's `Pipfile`: a `[packages]` block of `name = "constraint"` pairs

use toml_edit::DocumentMut;

use super::{ADDED_BY_MARKER, normalize_name};
use crate::error::Result;

const PACKAGES_HEADER: &str = "[packages]";

pub(super) fn parse(contents: &str) -> Result<Vec<String>> {
    let doc = contents.parse::<DocumentMut>()?;
    let mut names = Vec::new();
    if let Some(packages) = doc.get("packages").and_then(|item| item.as_table_like()) {
        for (name, _) in packages.iter() {
            let name = normalize_name(name);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Insert `name = "constraint"` at the end of the `[packages]` block.
///
/// Works on lines rather than a re-serialized document so that every other
/// byte of the file, line endings included, stays exactly as the operator
/// wrote it.
pub(super) fn append(contents: &str, name: &str, version_constraint: &str) -> String {
    let constraint = if version_constraint.is_empty() {
        "*"
    } else {
        version_constraint
    };
    let newline = if contents.contains("\r\n") { "\r\n" } else { "\n" };
    let entry = format!("{name:<20}= \"{constraint}\"  {ADDED_BY_MARKER}{newline}");

    let lines: Vec<&str> = contents.split_inclusive('\n').collect();
    let Some(header) = lines.iter().position(|line| line.trim() == PACKAGES_HEADER) else {
        let mut updated = contents.to_string();
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push_str(newline);
        }
        updated.push_str(&format!("{newline}{PACKAGES_HEADER}{newline}{entry}"));
        return updated;
    };

    let section_end = lines[header + 1..]
        .iter()
        .position(|line| line.trim_start().starts_with('['))
        .map(|offset| header + 1 + offset)
        .unwrap_or(lines.len());

    // Keep the blank lines separating this block from the next one after the new entry
    let mut insert_at = section_end;
    while insert_at > header + 1 && lines[insert_at - 1].trim().is_empty() {
        insert_at -= 1;
    }

    let mut updated = String::with_capacity(contents.len() + entry.len() + newline.len());
    for line in &lines[..insert_at] {
        updated.push_str(line);
    }
    if !updated.ends_with('\n') {
        updated.push_str(newline);
    }
    updated.push_str(&entry);
    for line in &lines[insert_at..] {
        updated.push_str(line);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPFILE: &str = r#"[[source]]
url = "https://pypi.org/simple"
verify_ssl = true
name = "pypi"

[packages]
django = "*"
django-bootstrap5 = "==23.3"

[dev-packages]

[requires]
python_version = "3.12"
"#;

    #[test]
    fn test_parse_packages_only() {
        assert_eq!(parse(PIPFILE).unwrap(), vec!["django", "django-bootstrap5"]);
    }

    #[test]
    fn test_append_inside_packages_block() {
        let updated = append(PIPFILE, "gunicorn", "");
        let expected_line = format!("{:<20}= \"*\"  {ADDED_BY_MARKER}", "gunicorn");
        let expected = PIPFILE.replace(
            "django-bootstrap5 = \"==23.3\"\n",
            &format!("django-bootstrap5 = \"==23.3\"\n{expected_line}\n"),
        );
        assert_eq!(updated, expected);
        assert_eq!(
            parse(&updated).unwrap(),
            vec!["django", "django-bootstrap5", "gunicorn"]
        );
    }

    #[test]
    fn test_append_when_packages_block_is_last() {
        let updated = append("[packages]\ndjango = \"*\"\n", "whitenoise", ">=6.0");
        assert_eq!(
            updated,
            format!(
                "[packages]\ndjango = \"*\"\n{:<20}= \">=6.0\"  {ADDED_BY_MARKER}\n",
                "whitenoise"
            )
        );
    }

    #[test]
    fn test_append_keeps_crlf_line_endings() {
        let crlf = PIPFILE.replace('\n', "\r\n");
        let updated = append(&crlf, "gunicorn", "");
        let expected_line = format!("{:<20}= \"*\"  {ADDED_BY_MARKER}", "gunicorn");

        assert_eq!(
            updated,
            crlf.replace(
                "django-bootstrap5 = \"==23.3\"\r\n",
                &format!("django-bootstrap5 = \"==23.3\"\r\n{expected_line}\r\n"),
            )
        );
        assert_eq!(updated.matches('\n').count(), updated.matches("\r\n").count());
    }

    #[test]
    fn test_append_without_trailing_newline() {
        let updated = append("[packages]\ndjango = \"*\"", "gunicorn", "");
        assert_eq!(
            updated,
            format!("[packages]\ndjango = \"*\"\n{:<20}= \"*\"  {ADDED_BY_MARKER}\n", "gunicorn")
        );
    }

    #[test]
    fn test_append_creates_packages_block() {
        let updated = append("[requires]\npython_version = \"3.12\"\n", "gunicorn", "");
        assert!(updated.contains("\n[packages]\ngunicorn"));
        assert_eq!(parse(&updated).unwrap(), vec!["gunicorn"]);
    }
}
