//! Exactly one platform plugin selects exactly one adapter

use simple_deploy_core::plugins::PluginResolver;
use simple_deploy_core::platforms::Adapter;
use simple_deploy_core::{Error, Platform};
use simple_deploy_suite::{Manifest, SampleProject};

fn resolve(project: &SampleProject) -> simple_deploy_core::Result<Platform> {
    PluginResolver::new(vec![project.site_packages()]).resolve()
}

#[test]
fn test_each_plugin_selects_its_own_adapter() {
    for platform in Platform::ALL {
        let project = SampleProject::new(Manifest::RequirementsTxt).unwrap();
        project.install_plugin("django-simple-deploy").unwrap();
        project.install_plugin(platform.plugin_name()).unwrap();

        let resolved = resolve(&project).unwrap();
        assert_eq!(resolved, platform);
        assert_eq!(Adapter::for_platform(resolved).platform(), platform);
    }
}

#[test]
fn test_no_plugin_is_an_error() {
    let project = SampleProject::new(Manifest::RequirementsTxt).unwrap();
    project.install_plugin("django-simple-deploy").unwrap();

    match resolve(&project) {
        Err(Error::NoPluginInstalled { supported }) => {
            assert!(supported.contains("dsd-flyio"));
            assert!(supported.contains("dsd-heroku"));
            assert!(supported.contains("dsd-platformsh"));
        }
        other => panic!("expected NoPluginInstalled, got {other:?}"),
    }
}

#[test]
fn test_every_pair_of_plugins_is_ambiguous() {
    for (i, first) in Platform::ALL.iter().enumerate() {
        for second in &Platform::ALL[i + 1..] {
            let project = SampleProject::new(Manifest::RequirementsTxt).unwrap();
            project.install_plugin(first.plugin_name()).unwrap();
            project.install_plugin(second.plugin_name()).unwrap();

            match resolve(&project) {
                Err(Error::AmbiguousPlugins { found }) => {
                    assert!(found.contains(first.plugin_name()), "{found}");
                    assert!(found.contains(second.plugin_name()), "{found}");
                }
                other => panic!("expected AmbiguousPlugins, got {other:?}"),
            }
        }
    }
}

#[test]
fn test_unknown_plugin_is_unsupported() {
    let project = SampleProject::new(Manifest::RequirementsTxt).unwrap();
    project.install_plugin("dsd-azure").unwrap();

    assert!(matches!(resolve(&project), Err(Error::UnsupportedPlugin { name, .. }) if name == "dsd-azure"));
}
