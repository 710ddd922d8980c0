//! Layer directory scanning.
//!
//! Builds the layer table from the `layers/` directory: each subdirectory
//! is one layer, named by its directory name, with recipe-kind flags set
//! from the files present inside it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use stratum_core::error::{PlanError, Result};

use super::{Layer, LayerAlias};

/// Scan `<dir>/layers/` and return the layer table keyed by name.
///
/// A missing `layers/` directory yields an empty table; unknown files
/// inside a layer directory are ignored.
pub fn scan_layers(dir: &Path) -> Result<BTreeMap<String, Layer>> {
    let layers_dir = dir.join("layers");
    let mut layers = BTreeMap::new();

    if !layers_dir.exists() {
        return Ok(layers);
    }

    let entries =
        fs::read_dir(&layers_dir).map_err(|e| PlanError::io(&layers_dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| PlanError::io(&layers_dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let layer = scan_layer(&name, &path)?;
        layers.insert(name, layer);
    }

    tracing::debug!(count = layers.len(), "scanned layer directory");
    Ok(layers)
}

/// Scan a single layer directory.
fn scan_layer(name: &str, path: &Path) -> Result<Layer> {
    let mut layer = Layer::new(name, Vec::new());

    let depends_path = path.join("depends");
    if depends_path.exists() {
        layer.depends = read_list(&depends_path)?;
    }

    let rpm_path = path.join("rpm.list");
    if rpm_path.exists() {
        layer.has_rpm_list = true;
        for line in read_list(&rpm_path)? {
            if let Some(repo) = line.strip_prefix("copr:") {
                layer.copr_repos.push(repo.trim().to_string());
            } else {
                layer.rpm_packages.push(line);
            }
        }
    }

    let deb_path = path.join("deb.list");
    if deb_path.exists() {
        layer.has_deb_list = true;
        layer.deb_packages = read_list(&deb_path)?;
    }

    layer.has_root_yml = path.join("root.yml").exists();
    layer.has_pixi_toml = path.join("pixi.toml").exists();
    layer.has_package_json = path.join("package.json").exists();
    layer.has_cargo_toml = path.join("Cargo.toml").exists();
    layer.has_user_yml = path.join("user.yml").exists();
    layer.has_supervisord = path.join("supervisord.conf").exists();

    let aliases_path = path.join("aliases");
    if aliases_path.exists() {
        layer.has_aliases = true;
        let content =
            fs::read_to_string(&aliases_path).map_err(|e| PlanError::io(&aliases_path, e))?;
        layer.aliases = serde_yaml::from_str::<Vec<LayerAlias>>(&content)?;
    }

    Ok(layer)
}

/// Read a newline-delimited list file, skipping blanks and `#` comments.
fn read_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| PlanError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
