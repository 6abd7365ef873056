//! Embedded Tera templates for settings blocks and platform files
//!
//! Templates live under `crates/core/templates/<platform>/` and are compiled
//! into the binary. Names keep their directory, e.g. `fly/fly.toml.tera`.
//! Files that differ by dependency manager carry the manager's variant
//! suffix: `fly/Dockerfile-poetry.tera`.

use tera::{Context, Tera};

use crate::context::DependencyManager;
use crate::error::Result;

#[derive(rust_embed::RustEmbed)]
#[folder = "templates/"]
struct EmbeddedTemplates;

/// Every embedded template, loaded once per run.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn load() -> Result<Self> {
        let mut tera = Tera::default();

        for file_path in EmbeddedTemplates::iter() {
            let file = EmbeddedTemplates::get(&file_path).ok_or_else(|| {
                tera::Error::msg(format!("embedded template not found: {file_path}"))
            })?;
            let content = std::str::from_utf8(file.data.as_ref()).map_err(|e| {
                tera::Error::msg(format!("invalid UTF-8 in template {file_path}: {e}"))
            })?;
            tera.add_raw_template(&file_path, content)?;
        }

        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(name, context)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

/// Name of the variant of `base` (e.g. `fly/Dockerfile`) for `manager`.
pub fn variant_name(base: &str, manager: DependencyManager) -> String {
    format!("{base}-{}.tera", manager.template_variant())
}
