//! Intermediate image synthesis.
//!
//! Builds a prefix trie over every image's absolute layer sequence, one
//! trie per external-base group, and inserts auto-generated intermediate
//! images at branching points so each shared prefix is built exactly once.

use std::collections::{BTreeMap, BTreeSet};

use stratum_core::error::Result;

use crate::config::Config;
use crate::image::{
    layers_provided_by_image, resolve_external_base, synthesize_image, ResolvedImage,
};
use crate::layer::{transitive_dependencies, Layer};

use super::order::{absolute_layer_sequence, global_layer_order};

/// A node in the layer prefix trie.
///
/// Children are keyed by layer name in a sorted map, so every walk is
/// deterministic. The node records which user images terminate at it.
#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    images: Vec<String>,
}

/// Analyze all images and inject shared intermediates.
///
/// Returns a new image map containing every original image (with bases
/// rewritten where an intermediate was inserted between an image and its
/// old base) plus the synthesized `auto` images. The input map is not
/// modified.
pub fn compute_intermediates(
    images: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
    cfg: &Config,
    tag: &str,
) -> Result<BTreeMap<String, ResolvedImage>> {
    let global_order = global_layer_order(images, layers)?;

    // Partition images by their ultimate external base.
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in images.keys() {
        groups
            .entry(resolve_external_base(name, images))
            .or_default()
            .push(name.clone());
    }

    let mut result = images.clone();

    for (external_base, names) in &groups {
        if names.len() <= 1 {
            continue;
        }

        // Insert each image's absolute sequence into the trie.
        let mut root = TrieNode::default();
        for name in names {
            let seq = absolute_layer_sequence(name, images, layers, &global_order)?;
            let mut node = &mut root;
            for layer in seq {
                node = node.children.entry(layer).or_default();
            }
            node.images.push(name.clone());
        }

        // A configured image with no own layers is a passthrough sitting
        // directly on the external base; walk from it when present.
        let start_parent = names
            .iter()
            .find(|name| images[*name].layers.is_empty())
            .cloned()
            .unwrap_or_else(|| external_base.clone());

        walk_trie(
            &root,
            &start_parent,
            &mut result,
            images,
            layers,
            cfg,
            tag,
            &global_order,
        )?;
    }

    Ok(result)
}

/// Walk the trie below `node`, creating intermediates at branch points.
///
/// `parent` is the image (or external reference) the next intermediate or
/// terminal image will be based on.
#[allow(clippy::too_many_arguments)]
fn walk_trie(
    node: &TrieNode,
    parent: &str,
    result: &mut BTreeMap<String, ResolvedImage>,
    orig: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
    cfg: &Config,
    tag: &str,
    global_order: &[String],
) -> Result<()> {
    for (child_layer, child) in &node.children {
        // Collapse the linear run: a single intermediate covers the whole
        // chain up to the next branch point or terminal image.
        let mut chain = vec![child_layer.clone()];
        let mut current = child;
        while current.children.len() == 1 && current.images.is_empty() {
            let (layer, next) = current.children.iter().next().expect("single child");
            chain.push(layer.clone());
            current = next;
        }

        let is_branch = current.children.len() >= 2
            || (!current.children.is_empty() && !current.images.is_empty());

        if is_branch {
            let next_parent = if current.images.len() == 1
                && is_existing_image_reusable(&current.images[0], orig)
            {
                // Promote the existing image to serve as the branch point.
                let promoted = current.images[0].clone();
                update_image_base(&promoted, parent, result);
                promoted
            } else {
                let name = pick_intermediate_name(&chain, result);
                create_intermediate(&name, parent, &chain, result, layers, cfg, tag, global_order)?;
                for image in &current.images {
                    update_image_base(image, &name, result);
                }
                name
            };

            walk_trie(
                current,
                &next_parent,
                result,
                orig,
                layers,
                cfg,
                tag,
                global_order,
            )?;
        } else {
            // Leaf: every terminal image builds directly on the parent.
            for image in &current.images {
                update_image_base(image, parent, result);
            }
        }
    }
    Ok(())
}

/// Whether an existing image can itself serve as the branch intermediate.
///
/// Presence in the original catalogue is sufficient; the image's own
/// layers already match the trie path that leads to it.
fn is_existing_image_reusable(name: &str, orig: &BTreeMap<String, ResolvedImage>) -> bool {
    orig.contains_key(name)
}

/// Choose a name for an auto-intermediate: the last layer of the chain,
/// with `-2`, `-3`, ... appended on collision with any known image.
fn pick_intermediate_name(chain: &[String], result: &BTreeMap<String, ResolvedImage>) -> String {
    let base = chain.last().expect("chain is never empty");
    if !result.contains_key(base) {
        return base.clone();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !result.contains_key(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Create an auto-intermediate carrying the chain's layers.
#[allow(clippy::too_many_arguments)]
fn create_intermediate(
    name: &str,
    parent: &str,
    chain: &[String],
    result: &mut BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
    cfg: &Config,
    tag: &str,
    global_order: &[String],
) -> Result<()> {
    let own_layers = intermediate_own_layers(parent, chain, result, layers, global_order)?;
    let is_external_base = !result.contains_key(parent);

    tracing::debug!(
        image = %name,
        parent = %parent,
        layers = ?own_layers,
        "synthesizing intermediate image"
    );

    let image = synthesize_image(name, parent, is_external_base, own_layers, cfg, tag);
    result.insert(name.to_string(), image);
    Ok(())
}

/// The own layers of a new intermediate: the chain minus everything the
/// parent already provides, plus transitive dependencies likewise not
/// parent-provided, re-sorted by the global order.
fn intermediate_own_layers(
    parent: &str,
    chain: &[String],
    result: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
    global_order: &[String],
) -> Result<Vec<String>> {
    let parent_provided = if result.contains_key(parent) {
        layers_provided_by_image(parent, result, layers)?
    } else {
        BTreeSet::new()
    };

    let mut needed: BTreeSet<String> = BTreeSet::new();
    for layer in chain {
        if parent_provided.contains(layer) {
            continue;
        }
        needed.extend(transitive_dependencies(layer, layers, &parent_provided));
        needed.insert(layer.clone());
    }

    Ok(global_order
        .iter()
        .filter(|layer| needed.contains(*layer))
        .cloned()
        .collect())
}

/// Rewrite an image's base, reclassifying it as internal or external.
fn update_image_base(name: &str, parent: &str, result: &mut BTreeMap<String, ResolvedImage>) {
    let is_internal = result.contains_key(parent);
    if let Some(image) = result.get_mut(name) {
        image.base = parent.to_string();
        image.is_external_base = !is_internal;
    }
}
