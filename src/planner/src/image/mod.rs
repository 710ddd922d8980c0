//! Resolved images and the image base graph.

mod order;
mod resolve;

pub use order::{image_needs_builder, resolve_image_order};
pub use resolve::{
    layers_provided_by_image, resolve_all_images, resolve_external_base, synthesize_image,
};

use crate::config::PkgFamily;

/// An image after defaults have been applied.
///
/// The resolved image map is the planner's central data structure; after
/// intermediate synthesis it also contains auto-generated images
/// (`auto == true`) that exist only in memory and in emitted artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    pub name: String,
    /// Another image name, or an external reference
    pub base: String,
    /// True iff `base` does not name a configured image
    pub is_external_base: bool,
    /// Own layers, as configured (dependencies are resolved later)
    pub layers: Vec<String>,
    pub tag: String,
    pub registry: Option<String>,
    pub pkg: PkgFamily,
    pub platforms: Vec<String>,
    pub user: String,
    pub uid: u32,
    pub gid: u32,
    /// Home directory of the image user
    pub home: String,
    /// `registry/name:tag`, or `name:tag` without a registry
    pub full_tag: String,
    /// Whether the post-build layer-merge pass applies to this image
    pub merge: bool,
    /// Whether to run `bootc container lint` at the end of the build
    pub bootc: bool,
    /// True iff this image was synthesized by intermediate computation
    pub auto: bool,
}

/// Compute the fully qualified tag for an image.
pub(crate) fn full_tag(registry: Option<&str>, name: &str, tag: &str) -> String {
    match registry {
        Some(registry) if !registry.is_empty() => format!("{registry}/{name}:{tag}"),
        _ => format!("{name}:{tag}"),
    }
}
