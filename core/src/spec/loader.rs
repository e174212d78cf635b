//! Spec loading with `{{variable}}` interpolation.
//!
//! The document is parsed twice: once to collect parameter defaults, then
//! again after substituting template variables into the raw text. Unresolved
//! tokens are left literal so a later stage can surface them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use thiserror::Error;

use super::model::{ParamDef, ProjectSpec};
use super::validator::ValidationResult;

/// The implemented spec API version.
pub const API_VERSION: &str = "agentrun/v1";

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("read spec {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse spec: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid spec: {0}")]
    Invalid(ValidationResult),

    #[error("unknown template {name:?} (known: {known})")]
    UnknownTemplate { name: String, known: String },

    #[error("write template {path}: {source}")]
    TemplateWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Read a YAML spec file and parse it with variable interpolation.
pub fn load_spec(
    path: &Path,
    overrides: &BTreeMap<String, String>,
) -> Result<ProjectSpec, SpecError> {
    let text = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_spec(&text, overrides)
}

/// Parse spec text into a [`ProjectSpec`] with variable interpolation.
pub fn parse_spec(
    text: &str,
    overrides: &BTreeMap<String, String>,
) -> Result<ProjectSpec, SpecError> {
    // First pass: parse to get the parameter defaults.
    let raw: ProjectSpec = serde_yaml::from_str(text)?;

    let vars = build_var_map(&raw.params, overrides);
    let interpolated = interpolate_vars(text, &vars);

    // Second pass: parse the interpolated document.
    Ok(serde_yaml::from_str(&interpolated)?)
}

/// Build the interpolation map: built-ins first, then parameter defaults,
/// then runtime overrides. Later entries shadow earlier ones, so an override
/// named like a built-in (`date`, `year`, ...) wins.
fn build_var_map(
    params: &[ParamDef],
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    let now = Utc::now();
    vars.insert("date".to_string(), now.format("%Y-%m-%d").to_string());
    vars.insert(
        "datetime".to_string(),
        now.format("%Y-%m-%dT%H:%M:%S").to_string(),
    );
    vars.insert("year".to_string(), now.format("%Y").to_string());
    vars.insert("month".to_string(), now.format("%m").to_string());
    vars.insert("day".to_string(), now.format("%d").to_string());

    for param in params {
        if let Some(default) = &param.default {
            let rendered = match default {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            vars.insert(param.name.clone(), rendered);
        }
    }

    for (name, value) in overrides {
        vars.insert(name.clone(), value.clone());
    }

    vars
}

static TEMPLATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("static pattern"));

/// Replace `{{name}}` tokens with values from the variable map, leaving
/// unresolved tokens in place.
fn interpolate_vars(text: &str, vars: &BTreeMap<String, String>) -> String {
    TEMPLATE_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            vars.get(name).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
