//! docker-bake.hcl rendering.
//!
//! One aggregated bake file: a default group listing every image in build
//! order, and one target per image with its tags, platforms, and base
//! dependency.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::image::ResolvedImage;

/// Render the bake file for the whole fleet.
///
/// `order` must be a valid build order; targets are emitted in that order.
pub fn render_bake(
    order: &[String],
    images: &BTreeMap<String, ResolvedImage>,
    cfg: &Config,
) -> String {
    let mut b = String::new();

    b.push_str("# .build/docker-bake.hcl (generated -- do not edit)\n\n");

    b.push_str("group \"default\" {\n");
    b.push_str("  targets = [");
    for (i, name) in order.iter().enumerate() {
        if i > 0 {
            b.push_str(", ");
        }
        b.push_str(&format!("{name:?}"));
    }
    b.push_str("]\n");
    b.push_str("}\n\n");

    for name in order {
        let img = &images[name];
        b.push_str(&format!("target {name:?} {{\n"));
        b.push_str("  context = \".\"\n");
        b.push_str(&format!(
            "  dockerfile = \".build/{name}/Containerfile\"\n"
        ));

        b.push_str("  tags = [");
        b.push_str(&format!("{:?}", img.full_tag));
        if tag_is_floating(cfg, name) {
            let latest = match &img.registry {
                Some(registry) => format!("{registry}/{name}:latest"),
                None => format!("{name}:latest"),
            };
            b.push_str(&format!(", {latest:?}"));
        }
        b.push_str("]\n");

        b.push_str("  platforms = [");
        for (i, platform) in img.platforms.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            b.push_str(&format!("{platform:?}"));
        }
        b.push_str("]\n");

        if !img.is_external_base {
            b.push_str(&format!("  depends_on = [{:?}]\n", img.base));
        }

        b.push_str("}\n\n");
    }

    b
}

/// An image whose configured tag is absent or `auto` (including every
/// synthesized intermediate) also gets a `:latest` tag.
fn tag_is_floating(cfg: &Config, name: &str) -> bool {
    match cfg.images.get(name) {
        Some(settings) => matches!(settings.tag.as_deref(), None | Some("") | Some("auto")),
        None => true,
    }
}
