//! Image resolution.
//!
//! Applies the `defaults` record to every configured image, classifies
//! bases as internal or external, and computes derived fields (full tag,
//! home directory). Also provides the transitive layer closure of an
//! image, which underpins popularity counting and duplicate-work checks.

use std::collections::{BTreeMap, BTreeSet};

use stratum_core::error::{PlanError, Result};

use crate::config::Config;
use crate::layer::{resolve_layer_order, Layer};

use super::{full_tag, ResolvedImage};

const DEFAULT_USER: &str = "user";
const DEFAULT_UID: u32 = 1000;
const DEFAULT_GID: u32 = 1000;

/// Resolve every configured image against the defaults record.
///
/// `fleet_tag` is the tag applied to images whose configured tag is
/// absent or the literal `auto`.
pub fn resolve_all_images(
    cfg: &Config,
    fleet_tag: &str,
) -> Result<BTreeMap<String, ResolvedImage>> {
    let mut images = BTreeMap::new();

    for (name, settings) in &cfg.images {
        let base = settings
            .base
            .as_ref()
            .or(cfg.defaults.base.as_ref())
            .ok_or_else(|| {
                PlanError::validation(format!("images.{name}.base"), "missing")
            })?
            .clone();

        let tag = match settings.tag.as_deref() {
            Some(tag) if !tag.is_empty() && tag != "auto" => tag.to_string(),
            _ => fleet_tag.to_string(),
        };

        let registry = settings
            .registry
            .clone()
            .or_else(|| cfg.defaults.registry.clone());
        let user = settings
            .user
            .clone()
            .or_else(|| cfg.defaults.user.clone())
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        images.insert(
            name.clone(),
            ResolvedImage {
                name: name.clone(),
                is_external_base: !cfg.images.contains_key(&base),
                base,
                layers: settings.layers.clone(),
                full_tag: full_tag(registry.as_deref(), name, &tag),
                tag,
                registry,
                pkg: settings.pkg.or(cfg.defaults.pkg).unwrap_or_default(),
                platforms: default_platforms(cfg, &settings.platforms),
                home: format!("/home/{user}"),
                user,
                uid: settings.uid.or(cfg.defaults.uid).unwrap_or(DEFAULT_UID),
                gid: settings.gid.or(cfg.defaults.gid).unwrap_or(DEFAULT_GID),
                merge: settings.merge.or(cfg.defaults.merge).unwrap_or(false),
                bootc: settings.bootc.or(cfg.defaults.bootc).unwrap_or(false),
                auto: false,
            },
        );
    }

    Ok(images)
}

/// Build a synthesized (auto) image from the defaults record.
///
/// Used by intermediate computation; the caller supplies the own-layer
/// list and the parent.
pub fn synthesize_image(
    name: &str,
    parent: &str,
    is_external_base: bool,
    layers: Vec<String>,
    cfg: &Config,
    tag: &str,
) -> ResolvedImage {
    let registry = cfg.defaults.registry.clone();
    let user = cfg
        .defaults
        .user
        .clone()
        .unwrap_or_else(|| DEFAULT_USER.to_string());

    ResolvedImage {
        name: name.to_string(),
        base: parent.to_string(),
        is_external_base,
        layers,
        tag: tag.to_string(),
        full_tag: full_tag(registry.as_deref(), name, tag),
        registry,
        pkg: cfg.defaults.pkg.unwrap_or_default(),
        platforms: default_platforms(cfg, &[]),
        home: format!("/home/{user}"),
        user,
        uid: cfg.defaults.uid.unwrap_or(DEFAULT_UID),
        gid: cfg.defaults.gid.unwrap_or(DEFAULT_GID),
        merge: cfg.defaults.merge.unwrap_or(false),
        bootc: false,
        auto: true,
    }
}

fn default_platforms(cfg: &Config, own: &[String]) -> Vec<String> {
    if !own.is_empty() {
        return own.to_vec();
    }
    if !cfg.defaults.platforms.is_empty() {
        return cfg.defaults.platforms.clone();
    }
    vec!["linux/amd64".to_string(), "linux/arm64".to_string()]
}

/// Every layer transitively installed by an image: its own resolved
/// layers plus everything inherited through the base chain.
pub fn layers_provided_by_image(
    name: &str,
    images: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
) -> Result<BTreeSet<String>> {
    let mut provided = BTreeSet::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut current = name;

    while let Some(img) = images.get(current) {
        if !seen.insert(current) {
            return Err(PlanError::ImageCycle);
        }
        provided.extend(resolve_layer_order(&img.layers, layers, None)?);
        if img.is_external_base {
            break;
        }
        current = &img.base;
    }

    Ok(provided)
}

/// Walk the base chain of an image to its ultimate external reference.
pub fn resolve_external_base(name: &str, images: &BTreeMap<String, ResolvedImage>) -> String {
    let mut current = name;
    loop {
        match images.get(current) {
            Some(img) if img.is_external_base => return img.base.clone(),
            Some(img) => current = &img.base,
            None => return current.to_string(),
        }
    }
}
