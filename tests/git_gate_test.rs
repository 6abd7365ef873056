//! Git safety gate against real `git` output

use simple_deploy_core::git_gate::GitSafetyGate;
use simple_deploy_suite::{Manifest, SampleProject, git_available};

fn gate_allows(project: &SampleProject) -> bool {
    let status = project.git_status().unwrap();
    let diff = project.git(&["diff", "--unified=0", "HEAD"]).unwrap();
    GitSafetyGate::new("blog/settings.py").check(&status, &diff)
}

#[test]
fn test_tool_changes_in_any_combination_are_allowed() {
    if !git_available() {
        eprintln!("git not found; skipping");
        return;
    }
    let project = SampleProject::with_git(Manifest::RequirementsTxt).unwrap();
    assert!(gate_allows(&project), "fresh repository");

    project.write("simple_deploy_logs/simple_deploy_2026-01-01-120000.log", "run\n").unwrap();
    assert!(gate_allows(&project), "log directory only");

    let gitignore = project.read(".gitignore").unwrap();
    project.write(".gitignore", &format!("{gitignore}simple_deploy_logs/\n")).unwrap();
    assert!(gate_allows(&project), "log directory plus ignore entry");

    let settings = project.read("blog/settings.py").unwrap();
    project
        .write("blog/settings.py", &format!("{settings}# django_simple_deploy\n"))
        .unwrap();
    assert!(gate_allows(&project), "log directory, ignore entry, and settings marker");
}

#[test]
fn test_operator_changes_are_refused() {
    if !git_available() {
        eprintln!("git not found; skipping");
        return;
    }
    let project = SampleProject::with_git(Manifest::RequirementsTxt).unwrap();
    project.write("blog/views.py", "from django.shortcuts import render\n").unwrap();
    assert!(!gate_allows(&project), "untracked source file");

    let project = SampleProject::with_git(Manifest::RequirementsTxt).unwrap();
    let settings = project.read("blog/settings.py").unwrap();
    project
        .write("blog/settings.py", &settings.replace("DEBUG = True", "DEBUG = False"))
        .unwrap();
    assert!(!gate_allows(&project), "edited settings line");

    let project = SampleProject::with_git(Manifest::RequirementsTxt).unwrap();
    let settings = project.read("blog/settings.py").unwrap();
    project
        .write(
            "blog/settings.py",
            &format!("{settings}# django_simple_deploy\nTIME_ZONE = \"UTC\"\n"),
        )
        .unwrap();
    assert!(!gate_allows(&project), "marker plus an unrelated line");

    let project = SampleProject::with_git(Manifest::RequirementsTxt).unwrap();
    let requirements = project.read("requirements.txt").unwrap();
    project
        .write("requirements.txt", &format!("{requirements}requests==2.32.3\n"))
        .unwrap();
    assert!(!gate_allows(&project), "manifest edited by hand");
}

#[test]
fn test_staged_deletion_is_refused() {
    if !git_available() {
        eprintln!("git not found; skipping");
        return;
    }
    let project = SampleProject::with_git(Manifest::RequirementsTxt).unwrap();
    project.git(&["rm", "--quiet", "blog/wsgi.py"]).unwrap();
    assert!(!gate_allows(&project));
}
