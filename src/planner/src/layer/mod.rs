//! Layer definitions.
//!
//! A layer is a named directory of install recipes under `layers/`. Its
//! semantics are fully captured by its name, its dependency list, and which
//! recipe files are present. Layers are scanned once at startup and
//! read-only afterwards.

mod graph;
mod scan;

pub use graph::{resolve_layer_order, transitive_dependencies};
pub use scan::scan_layers;

use serde::Deserialize;

/// A single reusable layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    /// Layer name (the directory name under `layers/`)
    pub name: String,
    /// Names of layers this one depends on
    pub depends: Vec<String>,

    /// `rpm.list` is present
    pub has_rpm_list: bool,
    /// `deb.list` is present
    pub has_deb_list: bool,
    /// `root.yml` root-user task manifest is present
    pub has_root_yml: bool,
    /// `pixi.toml` environment manifest is present
    pub has_pixi_toml: bool,
    /// `package.json` manifest is present
    pub has_package_json: bool,
    /// `Cargo.toml` manifest is present
    pub has_cargo_toml: bool,
    /// `user.yml` user task manifest is present
    pub has_user_yml: bool,
    /// `supervisord.conf` service fragment is present
    pub has_supervisord: bool,
    /// `aliases` file is present
    pub has_aliases: bool,

    /// Packages from `rpm.list` (COPR lines excluded)
    pub rpm_packages: Vec<String>,
    /// COPR repositories from `rpm.list` (`copr:owner/project` lines)
    pub copr_repos: Vec<String>,
    /// Packages from `deb.list`
    pub deb_packages: Vec<String>,
    /// Command aliases from the `aliases` file
    pub aliases: Vec<LayerAlias>,
}

/// One record from a layer's `aliases` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerAlias {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
}

impl Layer {
    /// Create an empty layer with the given name and dependencies.
    pub fn new(name: impl Into<String>, depends: Vec<String>) -> Self {
        Layer {
            name: name.into(),
            depends,
            ..Default::default()
        }
    }

    /// Whether installing this layer requires the builder image.
    ///
    /// True for layers carrying a manifest that must be resolved by the
    /// build toolchain at image-build time.
    pub fn requires_builder(&self) -> bool {
        self.has_pixi_toml || self.has_cargo_toml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_builder() {
        let mut layer = Layer::new("python", vec![]);
        assert!(!layer.requires_builder());

        layer.has_root_yml = true;
        assert!(!layer.requires_builder());

        layer.has_pixi_toml = true;
        assert!(layer.requires_builder());

        let mut cargo = Layer::new("tool", vec![]);
        cargo.has_cargo_toml = true;
        assert!(cargo.requires_builder());
    }
}
