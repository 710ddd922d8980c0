//! Build artifact generation.
//!
//! Runs the full planning pipeline for a fleet directory and writes the
//! resulting Containerfiles and docker-bake.hcl under `.build/`.

mod bake;
mod containerfile;

pub use bake::render_bake;
pub use containerfile::render_containerfile;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use stratum_core::error::{PlanError, Result};

use crate::calver::compute_calver;
use crate::config::{validate, Config};
use crate::image::{resolve_all_images, resolve_image_order, ResolvedImage};
use crate::layer::{scan_layers, Layer};
use crate::plan::{compute_intermediates, global_layer_order};

/// Planning state for a fleet directory, ready to emit build artifacts.
#[derive(Debug)]
pub struct Generator {
    build_dir: PathBuf,
    config: Config,
    layers: BTreeMap<String, Layer>,
    tag: String,
    images: BTreeMap<String, ResolvedImage>,
    global_order: Vec<String>,
}

impl Generator {
    /// Load, validate, and plan a fleet directory.
    ///
    /// When `tag` is absent the CalVer tag of the current date is used.
    /// The resulting image map already contains synthesized
    /// intermediates.
    pub fn new(dir: &Path, tag: Option<String>) -> Result<Self> {
        let config = Config::load(dir)?;
        let layers = scan_layers(dir)?;
        validate(&config, &layers)?;

        let tag = tag.unwrap_or_else(compute_calver);
        let resolved = resolve_all_images(&config, &tag)?;
        let images = compute_intermediates(&resolved, &layers, &config, &tag)?;
        let global_order = global_layer_order(&images, &layers)?;

        Ok(Generator {
            build_dir: dir.join(".build"),
            config,
            layers,
            tag,
            images,
            global_order,
        })
    }

    /// The fleet-wide layer order.
    pub fn global_order(&self) -> &[String] {
        &self.global_order
    }

    /// The resolved image map, including auto-intermediates.
    pub fn images(&self) -> &BTreeMap<String, ResolvedImage> {
        &self.images
    }

    /// The layer table.
    pub fn layers(&self) -> &BTreeMap<String, Layer> {
        &self.layers
    }

    /// The fleet configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The effective fleet tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The build order of the image map.
    pub fn build_order(&self) -> Result<Vec<String>> {
        resolve_image_order(
            &self.images,
            Some(&self.layers),
            self.config.defaults.builder.as_deref(),
        )
    }

    /// Write all build artifacts under `.build/`.
    pub fn generate(&self) -> Result<()> {
        fs::create_dir_all(&self.build_dir)
            .map_err(|e| PlanError::io(&self.build_dir, e))?;

        let order = self.build_order()?;

        for name in &order {
            let text = render_containerfile(
                &self.images[name],
                &self.images,
                &self.layers,
                &self.global_order,
            )?;

            let image_dir = self.build_dir.join(name);
            fs::create_dir_all(&image_dir).map_err(|e| PlanError::io(&image_dir, e))?;

            let path = image_dir.join("Containerfile");
            fs::write(&path, text).map_err(|e| PlanError::io(&path, e))?;
        }

        let bake = render_bake(&order, &self.images, &self.config);
        let bake_path = self.build_dir.join("docker-bake.hcl");
        fs::write(&bake_path, bake).map_err(|e| PlanError::io(&bake_path, e))?;

        tracing::info!(
            images = order.len(),
            tag = %self.tag,
            "generated build artifacts"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A small fleet: two leaf images sharing a pixi+python prefix on top
    /// of a passthrough fedora image.
    fn write_fixture(dir: &Path) {
        let layers = dir.join("layers");
        fs::create_dir_all(layers.join("pixi")).unwrap();
        fs::write(layers.join("pixi").join("rpm.list"), "pixi\n").unwrap();

        fs::create_dir_all(layers.join("python")).unwrap();
        fs::write(layers.join("python").join("depends"), "pixi\n").unwrap();
        fs::write(layers.join("python").join("pixi.toml"), "[project]\n").unwrap();

        fs::create_dir_all(layers.join("testapi")).unwrap();
        fs::write(layers.join("testapi").join("depends"), "python\n").unwrap();
        fs::write(layers.join("testapi").join("pixi.toml"), "[project]\n").unwrap();

        fs::create_dir_all(layers.join("openclaw")).unwrap();
        fs::write(layers.join("openclaw").join("depends"), "python\n").unwrap();
        fs::write(layers.join("openclaw").join("package.json"), "{}\n").unwrap();

        fs::write(
            dir.join("images.yml"),
            r#"
defaults:
  registry: r
  pkg: rpm
images:
  fedora:
    base: quay.io/fedora/fedora:43
  fedora-test:
    base: fedora
    layers: [testapi]
  openclaw:
    base: fedora
    layers: [openclaw]
"#,
        )
        .unwrap();
    }

    #[test]
    fn test_generate_writes_artifacts() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path());

        let generator = Generator::new(tmp.path(), Some("v1".to_string())).unwrap();
        generator.generate().unwrap();

        let build = tmp.path().join(".build");
        assert!(build.join("fedora").join("Containerfile").exists());
        assert!(build.join("fedora-test").join("Containerfile").exists());
        assert!(build.join("openclaw").join("Containerfile").exists());
        assert!(build.join("docker-bake.hcl").exists());

        // The shared pixi+python prefix becomes an intermediate with its
        // own Containerfile.
        let autos: Vec<&ResolvedImage> =
            generator.images().values().filter(|img| img.auto).collect();
        assert_eq!(autos.len(), 1);
        assert!(build.join(&autos[0].name).join("Containerfile").exists());

        // Leaves base on the intermediate, not on fedora.
        let bake = fs::read_to_string(build.join("docker-bake.hcl")).unwrap();
        assert!(bake.contains(&format!("depends_on = [{:?}]", autos[0].name)));
    }

    #[test]
    fn test_generate_respects_build_order() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path());

        let generator = Generator::new(tmp.path(), Some("v1".to_string())).unwrap();
        let order = generator.build_order().unwrap();

        let idx = |n: &str| order.iter().position(|o| o == n).unwrap();
        assert!(idx("fedora") < idx("fedora-test"));
        assert!(idx("fedora") < idx("openclaw"));

        // The bake group lists targets in the same order.
        generator.generate().unwrap();
        let bake =
            fs::read_to_string(tmp.path().join(".build").join("docker-bake.hcl")).unwrap();
        let fedora_pos = bake.find("\"fedora\"").unwrap();
        let test_pos = bake.find("\"fedora-test\"").unwrap();
        assert!(fedora_pos < test_pos);
    }

    #[test]
    fn test_generate_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path());

        let mut outputs = Vec::new();
        for _ in 0..2 {
            let generator = Generator::new(tmp.path(), Some("v1".to_string())).unwrap();
            generator.generate().unwrap();

            let mut snapshot = String::new();
            for name in generator.build_order().unwrap() {
                let path = tmp.path().join(".build").join(&name).join("Containerfile");
                snapshot.push_str(&fs::read_to_string(path).unwrap());
            }
            snapshot.push_str(
                &fs::read_to_string(tmp.path().join(".build").join("docker-bake.hcl")).unwrap(),
            );
            outputs.push(snapshot);
        }

        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_generator_rejects_invalid_config() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path());
        fs::write(
            tmp.path().join("images.yml"),
            "images:\n  app:\n    base: ext:1\n    layers: [ghost]\n",
        )
        .unwrap();

        let err = Generator::new(tmp.path(), Some("v1".to_string())).unwrap_err();
        assert!(matches!(err, PlanError::UnknownLayer(name) if name == "ghost"));
    }
}
