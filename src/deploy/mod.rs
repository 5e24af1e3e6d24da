//! Kubernetes namespace naming.
//!
//! The raw namespace comes from, in order: an explicit name, the manifest's
//! `deploy.namespace` template, or `<project>-<env>` (`<project>` without an
//! environment). The raw name is then made a valid DNS-1123 label. Names that
//! are already valid pass through unchanged; others are slugged and get an
//! 8-hex-character hash of the raw name appended, so two different raw names
//! never collapse onto the same namespace.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::constants::MAX_NAMESPACE_LEN;
use crate::core::ValuesError;
use crate::manifest::Manifest;
use crate::utils::{short_hash, slugify};

static TEMPLATE_VAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\[\s*(project|env)\s*\]\]").ok());

/// Render a namespace template with `[[ project ]]` and `[[ env ]]` placeholders.
#[must_use]
pub fn render_template(template: &str, project: &str, environment: &str) -> String {
    let Some(var) = TEMPLATE_VAR.as_ref() else {
        return template.to_string();
    };
    var.replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
        "project" => project.to_string(),
        _ => environment.to_string(),
    })
    .into_owned()
}

/// Whether `name` is a valid DNS-1123 label.
#[must_use]
pub fn is_valid_namespace(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_NAMESPACE_LEN
        && bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
}

/// Turn `raw` into a valid namespace.
#[must_use]
pub fn namespace_slug(raw: &str) -> String {
    if is_valid_namespace(raw) {
        return raw.to_string();
    }

    let hash = short_hash(raw);
    let mut slug = slugify(raw);
    slug.truncate(MAX_NAMESPACE_LEN - hash.len() - 1);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() { hash } else { format!("{slug}-{hash}") }
}

/// Namespace for `manifest` in `environment`, honoring an explicit override.
///
/// # Errors
///
/// Returns [`ValuesError::ConfigError`] if the explicit namespace is blank.
pub fn resolve_namespace(
    manifest: &Manifest,
    environment: &str,
    explicit: Option<&str>,
) -> Result<String> {
    let project = manifest.project.name.as_str();
    let raw = match (explicit, manifest.deploy.namespace.as_deref()) {
        (Some(name), _) if name.trim().is_empty() => {
            return Err(ValuesError::ConfigError {
                message: "namespace must not be empty".to_string(),
            }
            .into());
        }
        (Some(name), _) => name.trim().to_string(),
        (None, Some(template)) => render_template(template, project, environment),
        (None, None) if environment.is_empty() => project.to_string(),
        (None, None) => format!("{project}-{environment}"),
    };

    let namespace = namespace_slug(&raw);
    tracing::debug!(raw = %raw, namespace = %namespace, "Resolved namespace");
    Ok(namespace)
}
