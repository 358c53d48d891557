//! Template rendering
//!
//! Materializes a self-contained build context directory from a loaded
//! template and a chatbot configuration. Pure aside from writing the
//! destination files, and idempotent for identical inputs.

use std::collections::HashMap;
use std::path::Path;

use crate::template::{LoadedTemplate, TemplateError};

/// Extracts `{{ field }}` substitution point names, in order of appearance
pub fn placeholders(content: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let field = after[..end].trim();
                if !field.is_empty() {
                    fields.push(field.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }

    fields
}

/// Substitutes every `{{ field }}` with its configuration value
///
/// String values are inserted verbatim; other JSON values use their compact
/// JSON form.
fn substitute(content: &str, config: &HashMap<String, serde_json::Value>) -> String {
    let mut out = content.to_string();

    for field in placeholders(content) {
        let Some(value) = config.get(&field) else {
            continue;
        };

        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        // Replace both spaced and unspaced forms of this point
        out = out.replace(&format!("{{{{ {} }}}}", field), &rendered);
        out = out.replace(&format!("{{{{{}}}}}", field), &rendered);
    }

    out
}

/// Renders the template into `dest`, producing the build context
///
/// Writes `Dockerfile`, the entrypoint, and the dependency manifest (the
/// `.tmpl` suffix is stripped from skeleton names). Fails with
/// `MissingFields` if the configuration does not cover every substitution
/// point.
pub fn render_build_context(
    template: &LoadedTemplate,
    config: &HashMap<String, serde_json::Value>,
    dest: &Path,
) -> Result<(), TemplateError> {
    let missing = template.missing_fields(config);
    if !missing.is_empty() {
        return Err(TemplateError::MissingFields(missing));
    }

    std::fs::create_dir_all(dest)?;

    std::fs::write(dest.join("Dockerfile"), substitute(&template.dockerfile, config))?;

    let entrypoint_name = strip_tmpl(&template.meta.files.entrypoint);
    std::fs::write(dest.join(entrypoint_name), substitute(&template.entrypoint, config))?;

    let manifest_name = strip_tmpl(&template.meta.files.manifest);
    std::fs::write(dest.join(manifest_name), substitute(&template.manifest, config))?;

    Ok(())
}

fn strip_tmpl(name: &str) -> &str {
    name.strip_suffix(".tmpl").unwrap_or(name)
}
