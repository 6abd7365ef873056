//! Line-oriented `requirements.txt`

use super::{ADDED_BY_MARKER, normalize_name};

/// Characters that end the package name on a requirement line
const NAME_TERMINATORS: &[char] = &['<', '>', '=', '!', '~', '[', ';', '@', ' ', '\t'];

/// Package names declared in a requirements file, in file order.
pub(super) fn parse(contents: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in contents.lines() {
        let Some(name) = requirement_name(line) else {
            continue;
        };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn requirement_name(line: &str) -> Option<String> {
    let line = line.split(" #").next().unwrap_or_default().trim();
    // Comments, blank lines, and options such as `-r base.txt` or `-e .` declare no name
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    let name = line.split(NAME_TERMINATORS).next().unwrap_or_default();
    let name = normalize_name(name);
    (!name.is_empty()).then_some(name)
}

/// Append one requirement line, leaving every existing line untouched.
pub(super) fn append(contents: &str, name: &str, version_constraint: &str) -> String {
    let newline = if contents.contains("\r\n") { "\r\n" } else { "\n" };
    let mut updated = contents.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push_str(newline);
    }
    let entry = format!("{name}{version_constraint}");
    updated.push_str(&format!("{entry:<29} {ADDED_BY_MARKER}{newline}"));
    updated
}
