//! Build templates
//!
//! A template is a directory under the configured template root:
//!
//! ```text
//! templates/faq-bot/
//!   template.toml        metadata + health-check contract
//!   Dockerfile.tmpl      image build skeleton
//!   app.py.tmpl          application entrypoint skeleton
//!   requirements.txt.tmpl dependency manifest skeleton
//! ```
//!
//! Skeletons contain `{{ field }}` substitution points filled from the
//! chatbot configuration. Templates are read once at startup and treated as
//! immutable reference data.

pub mod render;

use botforge_core::domain::template::BuildTemplate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::template::render::placeholders;

/// Template loading/rendering errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),
    #[error("missing required configuration fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid template manifest: {0}")]
    Manifest(#[from] toml::de::Error),
}

/// `template.toml` contents; the template name is the directory name
#[derive(Debug, Deserialize)]
struct TemplateManifest {
    description: Option<String>,
    files: botforge_core::domain::template::TemplateFiles,
    check: botforge_core::domain::template::HealthCheck,
}

/// A template with its skeleton contents loaded
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub meta: BuildTemplate,
    pub dockerfile: String,
    pub entrypoint: String,
    pub manifest: String,
}

impl LoadedTemplate {
    /// Union of substitution points across all skeleton files
    pub fn required_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for content in [&self.dockerfile, &self.entrypoint, &self.manifest] {
            for field in placeholders(content) {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// Required fields absent from the given configuration
    pub fn missing_fields(&self, config: &HashMap<String, serde_json::Value>) -> Vec<String> {
        self.required_fields()
            .into_iter()
            .filter(|f| !config.contains_key(f))
            .collect()
    }
}

/// Read-only registry of build templates, loaded from disk at startup
pub struct TemplateStore {
    templates: HashMap<String, LoadedTemplate>,
}

impl TemplateStore {
    /// Loads every template directory under `root`
    pub fn load(root: &Path) -> Result<Self, TemplateError> {
        let mut templates = HashMap::new();

        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            match Self::load_one(&name, &entry.path()) {
                Ok(template) => {
                    tracing::info!("Loaded build template '{}'", name);
                    templates.insert(name, template);
                }
                Err(e) => {
                    tracing::warn!("Skipping template '{}': {}", name, e);
                }
            }
        }

        Ok(Self { templates })
    }

    fn load_one(name: &str, dir: &Path) -> Result<LoadedTemplate, TemplateError> {
        let manifest_src = std::fs::read_to_string(dir.join("template.toml"))?;
        let manifest: TemplateManifest = toml::from_str(&manifest_src)?;

        let dockerfile = std::fs::read_to_string(dir.join(&manifest.files.dockerfile))?;
        let entrypoint = std::fs::read_to_string(dir.join(&manifest.files.entrypoint))?;
        let dep_manifest = std::fs::read_to_string(dir.join(&manifest.files.manifest))?;

        Ok(LoadedTemplate {
            meta: BuildTemplate {
                name: name.to_string(),
                description: manifest.description,
                files: manifest.files,
                check: manifest.check,
            },
            dockerfile,
            entrypoint,
            manifest: dep_manifest,
        })
    }

    /// Looks up a template by name
    pub fn get(&self, name: &str) -> Result<&LoadedTemplate, TemplateError> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(|s| s.as_str()).collect()
    }

    #[cfg(test)]
    pub fn from_templates(templates: HashMap<String, LoadedTemplate>) -> Self {
        Self { templates }
    }
}
