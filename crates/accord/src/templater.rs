//! Directory-backed templater.
//!
//! Loads every `*.html` file in a directory at startup; the file stem is
//! the template name, so the policy document for version `2.0` lives in
//! `2.0.html` and the notice body in `server_notice.html`.

use std::fs;
use std::path::Path;

use accord_core::{ConsentError, ConsentResult, Templater};
use minijinja::Environment;

use crate::error::{ServerError, ServerResult};

#[derive(Debug)]
pub struct DirTemplater {
    env: Environment<'static>,
}

impl DirTemplater {
    /// Load all templates from a directory.
    pub fn from_dir(dir: &Path) -> ServerResult<Self> {
        let mut env = Environment::new();

        let entries = fs::read_dir(dir).map_err(|e| {
            ServerError::Template(format!("cannot read template dir {}: {e}", dir.display()))
        })?;
        for entry in entries {
            let entry = entry.map_err(ServerError::Io)?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path).map_err(ServerError::Io)?;
            env.add_template_owned(name.to_string(), source).map_err(|e| {
                ServerError::Template(format!("template {} failed to parse: {e}", path.display()))
            })?;
        }

        Ok(Self { env })
    }

    /// Build a templater from in-memory sources (for tests).
    pub fn from_sources(sources: &[(&str, &str)]) -> ServerResult<Self> {
        let mut env = Environment::new();
        for (name, source) in sources {
            env.add_template_owned(name.to_string(), source.to_string())
                .map_err(|e| ServerError::Template(format!("template {name} failed to parse: {e}")))?;
        }
        Ok(Self { env })
    }
}

impl Templater for DirTemplater {
    fn render(&self, name: &str, data: &serde_json::Value) -> ConsentResult<Vec<u8>> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| ConsentError::Render(format!("unknown template {name}: {e}")))?;
        let rendered = template
            .render(data)
            .map_err(|e| ConsentError::Render(format!("template {name}: {e}")))?;
        Ok(rendered.into_bytes())
    }
}
