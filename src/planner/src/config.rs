//! Image catalogue configuration.
//!
//! Loads and validates `images.yml`: a `defaults` record plus a map of
//! per-image settings. Validation runs eagerly, before any planning.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use stratum_core::error::{PlanError, Result};

use crate::alias::is_valid_alias_name;
use crate::layer::Layer;

/// Config file name inside the fleet directory.
pub const CONFIG_FILE: &str = "images.yml";

/// Native packaging family of a base image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PkgFamily {
    #[default]
    Rpm,
    Deb,
}

impl PkgFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkgFamily::Rpm => "rpm",
            PkgFamily::Deb => "deb",
        }
    }
}

/// An alias override declared on an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasSetting {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Per-image settings, also used for the `defaults` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg: Option<PkgFamily>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootc: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<AliasSetting>,
}

/// Container engine selection for build and run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

/// The full image catalogue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: ImageSettings,
    #[serde(default)]
    pub images: BTreeMap<String, ImageSettings>,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Config {
    /// Load `images.yml` from a fleet directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = fs::read_to_string(&path).map_err(|e| PlanError::io(&path, e))?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Validate a configuration against the scanned layer table.
///
/// Checks, in order: layer dependency references, per-image layer
/// references, base references (configured image or external-looking),
/// builder references, alias names, and base-chain acyclicity. The first
/// failure aborts the invocation.
pub fn validate(cfg: &Config, layers: &BTreeMap<String, Layer>) -> Result<()> {
    for (name, layer) in layers {
        for dep in &layer.depends {
            if !layers.contains_key(dep) {
                tracing::warn!(layer = %name, dependency = %dep, "undefined dependency");
                return Err(PlanError::UnknownLayer(dep.clone()));
            }
        }
    }

    for (name, settings) in &cfg.images {
        for layer in &settings.layers {
            if !layers.contains_key(layer) {
                return Err(PlanError::UnknownLayer(layer.clone()));
            }
        }

        let base = settings.base.as_ref().or(cfg.defaults.base.as_ref());
        match base {
            None => {
                return Err(PlanError::validation(
                    format!("images.{name}.base"),
                    "missing (no per-image base and no default)",
                ));
            }
            Some(base) => {
                // A base must be another configured image or an external
                // reference (registry/repo:tag shapes).
                if !cfg.images.contains_key(base) && !base.contains(':') && !base.contains('/') {
                    return Err(PlanError::UnknownImage(base.clone()));
                }
            }
        }

        if let Some(builder) = settings.builder.as_ref().or(cfg.defaults.builder.as_ref()) {
            if !cfg.images.contains_key(builder) {
                return Err(PlanError::UnknownImage(builder.clone()));
            }
        }

        for alias in &settings.aliases {
            if !is_valid_alias_name(&alias.name) {
                return Err(PlanError::validation(
                    format!("images.{name}.aliases"),
                    format!("invalid alias name {:?}", alias.name),
                ));
            }
        }
    }

    // Base chains must be acyclic.
    for start in cfg.images.keys() {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut current = start.as_str();
        while let Some(settings) = cfg.images.get(current) {
            if !seen.insert(current) {
                return Err(PlanError::ImageCycle);
            }
            match settings.base.as_ref().or(cfg.defaults.base.as_ref()) {
                Some(base) if cfg.images.contains_key(base) => current = base,
                _ => break,
            }
        }
    }

    Ok(())
}
