//! Command aliases.
//!
//! Layers can declare command aliases; images collect them from their
//! layers, with per-image overrides. Installed aliases are small shell
//! scripts in a bin directory that delegate to `stratum shell`, marked so
//! we never touch scripts we did not write.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use stratum_core::error::{PlanError, Result};

use crate::config::Config;
use crate::layer::Layer;

/// Marker comment identifying scripts managed by us.
pub const ALIAS_MARKER: &str = "# stratum-alias";

/// An alias resolved for a concrete image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedAlias {
    pub name: String,
    pub command: String,
}

/// An installed alias script found in the bin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasScript {
    pub name: String,
    pub image: String,
    pub command: String,
}

/// Whether a name is usable as an alias (and thus a script filename):
/// leading alphanumeric, then alphanumerics, `.`, `_` or `-`.
pub fn is_valid_alias_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Collect the aliases an image exposes: every alias declared by its
/// layers, with image-level entries overriding by name (an override
/// without a command defaults the command to the alias name).
pub fn collect_image_aliases(
    cfg: &Config,
    layers: &BTreeMap<String, Layer>,
    image: &str,
) -> Result<Vec<CollectedAlias>> {
    let settings = cfg
        .images
        .get(image)
        .ok_or_else(|| PlanError::UnknownImage(image.to_string()))?;

    let mut collected: Vec<CollectedAlias> = Vec::new();
    for layer_name in &settings.layers {
        let layer = layers
            .get(layer_name)
            .ok_or_else(|| PlanError::UnknownLayer(layer_name.clone()))?;
        if !layer.has_aliases {
            continue;
        }
        for alias in &layer.aliases {
            collected.push(CollectedAlias {
                name: alias.name.clone(),
                command: alias
                    .command
                    .clone()
                    .unwrap_or_else(|| alias.name.clone()),
            });
        }
    }

    for setting in &settings.aliases {
        let command = setting
            .command
            .clone()
            .unwrap_or_else(|| setting.name.clone());
        match collected.iter_mut().find(|a| a.name == setting.name) {
            Some(existing) => existing.command = command,
            None => collected.push(CollectedAlias {
                name: setting.name.clone(),
                command,
            }),
        }
    }

    Ok(collected)
}

/// Render the alias script text for an image/command pair.
pub fn generate_alias_script(image: &str, command: &str) -> String {
    format!(
        r#"#!/bin/sh
{ALIAS_MARKER}
# image: {image}
# command: {command}

# Quote one argument for safe re-parsing by `sh -c`.
_stratum_q() {{
    printf "'%s'" "$(printf '%s' "$1" | sed "s/'/'\\\\''/g")"
}}

c="{command}"
for a in "$@"; do
    c="$c $(_stratum_q "$a")"
done

exec stratum shell {image} -c "$c"
"#
    )
}

/// Write an alias script into `dir` with mode 0755.
pub fn write_alias_script(dir: &Path, name: &str, image: &str, command: &str) -> Result<()> {
    if !is_valid_alias_name(name) {
        return Err(PlanError::validation(
            "alias name",
            format!("invalid alias name {name:?}"),
        ));
    }

    fs::create_dir_all(dir).map_err(|e| PlanError::io(dir, e))?;

    let path = dir.join(name);
    fs::write(&path, generate_alias_script(image, command))
        .map_err(|e| PlanError::io(&path, e))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .map_err(|e| PlanError::io(&path, e))?;

    tracing::debug!(alias = %name, image = %image, "installed alias script");
    Ok(())
}

/// List the alias scripts we manage in `dir`.
///
/// Foreign files (no marker) are skipped; a missing directory yields an
/// empty list.
pub fn list_alias_scripts(dir: &Path) -> Result<Vec<AliasScript>> {
    let mut scripts = Vec::new();
    if !dir.exists() {
        return Ok(scripts);
    }

    let entries = fs::read_dir(dir).map_err(|e| PlanError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PlanError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        if !content.contains(ALIAS_MARKER) {
            continue;
        }

        scripts.push(AliasScript {
            name: entry.file_name().to_string_lossy().to_string(),
            image: metadata_field(&content, "# image: "),
            command: metadata_field(&content, "# command: "),
        });
    }

    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scripts)
}

/// Remove an alias script, refusing files we do not manage.
pub fn remove_alias_script(dir: &Path, name: &str) -> Result<()> {
    let path = dir.join(name);
    if !path.exists() {
        return Err(PlanError::ConfigError(format!("alias {name:?} not found")));
    }

    let content = fs::read_to_string(&path).map_err(|e| PlanError::io(&path, e))?;
    if !content.contains(ALIAS_MARKER) {
        return Err(PlanError::ConfigError(format!(
            "{name:?} is not a stratum alias"
        )));
    }

    fs::remove_file(&path).map_err(|e| PlanError::io(&path, e))
}

fn metadata_field(content: &str, prefix: &str) -> String {
    content
        .lines()
        .find_map(|line| line.strip_prefix(prefix))
        .unwrap_or("")
        .trim()
        .to_string()
}
