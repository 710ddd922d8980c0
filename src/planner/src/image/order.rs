//! Image build ordering.
//!
//! Topological ordering of the resolved image map by base edges, with the
//! builder image hoisted before every image that needs it.

use std::collections::{BTreeMap, BTreeSet};

use stratum_core::error::{PlanError, Result};

use crate::layer::Layer;

use super::{layers_provided_by_image, ResolvedImage};

/// Resolve the build order of the image map.
///
/// External bases are sources; every internal base precedes the images
/// built on it. When `builder` names a configured image, it additionally
/// precedes every image whose transitive layer set needs it. Ties resolve
/// by ascending image name.
pub fn resolve_image_order(
    images: &BTreeMap<String, ResolvedImage>,
    layers: Option<&BTreeMap<String, Layer>>,
    builder: Option<&str>,
) -> Result<Vec<String>> {
    let builder = builder.filter(|b| images.contains_key(*b));

    let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
    for (name, img) in images {
        if !img.is_external_base && images.contains_key(&img.base) {
            edges.insert((img.base.as_str(), name.as_str()));
        }
        if let Some(builder) = builder {
            if name != builder && image_needs_builder(img, images, layers, builder) {
                edges.insert((builder, name.as_str()));
            }
        }
    }

    let mut in_degree: BTreeMap<&str, usize> =
        images.keys().map(|name| (name.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for &(from, to) in &edges {
        *in_degree.get_mut(to).expect("edge endpoint in map") += 1;
        dependents.entry(from).or_default().push(to);
    }

    let mut frontier: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(images.len());
    while let Some(&name) = frontier.iter().next() {
        frontier.remove(name);
        order.push(name.to_string());

        for &dependent in dependents.get(name).into_iter().flatten() {
            let degree = in_degree.get_mut(dependent).expect("dependent in map");
            *degree -= 1;
            if *degree == 0 {
                frontier.insert(dependent);
            }
        }
    }

    if order.len() != images.len() {
        return Err(PlanError::ImageCycle);
    }
    Ok(order)
}

/// Whether an image's build must run after the builder image.
///
/// True iff any layer in the image's transitive layer set carries a
/// manifest resolved by the build toolchain. Returns true conservatively
/// when the layer table is unavailable or the closure cannot be computed.
pub fn image_needs_builder(
    img: &ResolvedImage,
    images: &BTreeMap<String, ResolvedImage>,
    layers: Option<&BTreeMap<String, Layer>>,
    builder: &str,
) -> bool {
    if img.name == builder {
        return false;
    }
    let Some(layers) = layers else {
        return true;
    };
    match layers_provided_by_image(&img.name, images, layers) {
        Ok(provided) => provided
            .iter()
            .any(|name| layers.get(name).map(Layer::requires_builder).unwrap_or(false)),
        Err(_) => true,
    }
}
