//! Global layer ordering.
//!
//! A single total order over every layer used anywhere in the fleet.
//! High-popularity layers come first among eligible candidates so that
//! the longest prefixes of the order are shared by the most images, which
//! is what makes the prefix-trie intermediate synthesis effective.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use stratum_core::error::{PlanError, Result};

use crate::image::{layers_provided_by_image, ResolvedImage};
use crate::layer::Layer;

/// A zero-in-degree candidate during the topological sort.
///
/// Ordered by popularity descending, then name ascending, so the max-heap
/// always yields the most popular (then lexicographically first) layer.
#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    popularity: usize,
    name: String,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.popularity
            .cmp(&other.popularity)
            .then_with(|| other.name.cmp(&self.name))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute the global topological order of every layer in use.
///
/// Popularity of a layer is the number of images whose transitive layer
/// closure (own layers plus the whole base chain) contains it.
pub fn global_layer_order(
    images: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
) -> Result<Vec<String>> {
    // Count how many images need each layer.
    let mut popularity: BTreeMap<String, usize> = BTreeMap::new();
    for name in images.keys() {
        for layer in layers_provided_by_image(name, images, layers)? {
            *popularity.entry(layer).or_insert(0) += 1;
        }
    }

    // Dependency edges restricted to layers that are actually in use.
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in popularity.keys() {
        let Some(layer) = layers.get(name) else {
            continue;
        };
        let deps: Vec<&str> = layer
            .depends
            .iter()
            .map(String::as_str)
            .filter(|dep| popularity.contains_key(*dep))
            .collect();
        in_degree.insert(name, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(name);
        }
    }

    let mut frontier: BinaryHeap<Candidate> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| Candidate {
            popularity: popularity[*name],
            name: name.to_string(),
        })
        .collect();

    let mut order = Vec::with_capacity(popularity.len());
    while let Some(candidate) = frontier.pop() {
        for &dependent in dependents.get(candidate.name.as_str()).into_iter().flatten() {
            let degree = in_degree.get_mut(dependent).expect("dependent in graph");
            *degree -= 1;
            if *degree == 0 {
                frontier.push(Candidate {
                    popularity: popularity[dependent],
                    name: dependent.to_string(),
                });
            }
        }
        order.push(candidate.name);
    }

    if order.len() != popularity.len() {
        return Err(PlanError::LayerCycle);
    }
    Ok(order)
}

/// An image's complete layer set projected onto the global order.
///
/// The result is a subsequence of `global_order` and a valid topological
/// order over the image's layer needs.
pub fn absolute_layer_sequence(
    name: &str,
    images: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
    global_order: &[String],
) -> Result<Vec<String>> {
    let provided = layers_provided_by_image(name, images, layers)?;
    Ok(global_order
        .iter()
        .filter(|layer| provided.contains(*layer))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PkgFamily;

    fn image(name: &str, base: &str, external: bool, own: &[&str]) -> ResolvedImage {
        ResolvedImage {
            name: name.to_string(),
            base: base.to_string(),
            is_external_base: external,
            layers: own.iter().map(|l| l.to_string()).collect(),
            tag: "v1".to_string(),
            registry: None,
            pkg: PkgFamily::Rpm,
            platforms: vec![],
            user: "user".to_string(),
            uid: 1000,
            gid: 1000,
            home: "/home/user".to_string(),
            full_tag: format!("{name}:v1"),
            merge: false,
            bootc: false,
            auto: false,
        }
    }

    fn layer_table(defs: &[(&str, &[&str])]) -> BTreeMap<String, Layer> {
        defs.iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    Layer::new(*name, deps.iter().map(|d| d.to_string()).collect()),
                )
            })
            .collect()
    }

    #[test]
    fn test_popularity_tie_breaking() {
        let layers = layer_table(&[
            ("pixi", &[]),
            ("nodejs", &[]),
            ("python", &["pixi"]),
            ("testapi", &["python"]),
        ]);

        let mut images = BTreeMap::new();
        images.insert(
            "a".to_string(),
            image("a", "ext:1", true, &["pixi", "python", "testapi"]),
        );
        images.insert("b".to_string(), image("b", "ext:1", true, &["pixi", "nodejs"]));

        let order = global_layer_order(&images, &layers).unwrap();
        let idx = |n: &str| order.iter().position(|o| o == n).unwrap();

        // pixi is needed by 2 images, nodejs by 1
        assert!(idx("pixi") < idx("nodejs"));
        // dependency edge pixi -> python
        assert!(idx("pixi") < idx("python"));
    }

    #[test]
    fn test_order_respects_dependencies() {
        let layers = layer_table(&[("pixi", &[]), ("python", &["pixi"])]);
        let mut images = BTreeMap::new();
        images.insert("a".to_string(), image("a", "ext:1", true, &["python"]));

        let order = global_layer_order(&images, &layers).unwrap();
        assert_eq!(order, vec!["pixi".to_string(), "python".to_string()]);
    }

    #[test]
    fn test_order_ignores_unused_layers() {
        let layers = layer_table(&[("pixi", &[]), ("unused", &[])]);
        let mut images = BTreeMap::new();
        images.insert("a".to_string(), image("a", "ext:1", true, &["pixi"]));

        let order = global_layer_order(&images, &layers).unwrap();
        assert_eq!(order, vec!["pixi".to_string()]);
    }

    #[test]
    fn test_order_equal_popularity_is_lexicographic() {
        let layers = layer_table(&[("zsh", &[]), ("bash", &[])]);
        let mut images = BTreeMap::new();
        images.insert("a".to_string(), image("a", "ext:1", true, &["zsh", "bash"]));

        let order = global_layer_order(&images, &layers).unwrap();
        assert_eq!(order, vec!["bash".to_string(), "zsh".to_string()]);
    }

    #[test]
    fn test_absolute_sequence_with_internal_base() {
        let layers = layer_table(&[
            ("pixi", &[]),
            ("python", &["pixi"]),
            ("nodejs", &[]),
            ("testapi", &["python"]),
        ]);

        let mut images = BTreeMap::new();
        images.insert("base".to_string(), image("base", "ext:1", true, &["pixi"]));
        images.insert(
            "app".to_string(),
            image("app", "base", false, &["python", "testapi"]),
        );

        let global_order = vec![
            "pixi".to_string(),
            "nodejs".to_string(),
            "python".to_string(),
            "testapi".to_string(),
        ];

        let seq = absolute_layer_sequence("app", &images, &layers, &global_order).unwrap();
        assert_eq!(
            seq,
            vec!["pixi".to_string(), "python".to_string(), "testapi".to_string()]
        );
    }

    #[test]
    fn test_absolute_sequence_is_subsequence_of_global_order() {
        let layers = layer_table(&[
            ("pixi", &[]),
            ("python", &["pixi"]),
            ("supervisord", &["python"]),
            ("testapi", &["supervisord"]),
        ]);

        let mut images = BTreeMap::new();
        images.insert("a".to_string(), image("a", "ext:1", true, &["testapi"]));
        images.insert("b".to_string(), image("b", "ext:1", true, &["python"]));

        let order = global_layer_order(&images, &layers).unwrap();
        let seq = absolute_layer_sequence("b", &images, &layers, &order).unwrap();

        let mut cursor = order.iter();
        for layer in &seq {
            assert!(cursor.any(|o| o == layer), "{layer} out of order");
        }
    }
}
