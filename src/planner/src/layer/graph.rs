//! Layer dependency resolution.
//!
//! Topological ordering over the layer dependency DAG. Orderings are
//! deterministic: ties are broken by ascending layer name.

use std::collections::{BTreeMap, BTreeSet};

use stratum_core::error::{PlanError, Result};

use super::Layer;

/// Resolve a topological install order for `selection` and all of its
/// transitive dependencies.
///
/// Layers in `parent_layers` (everything already provided by the base
/// image) are excluded from the result and not descended into.
///
/// # Errors
///
/// Returns `UnknownLayer` when a selected layer or dependency is not in
/// the table, and `LayerCycle` when the dependency graph has a cycle.
pub fn resolve_layer_order(
    selection: &[String],
    layers: &BTreeMap<String, Layer>,
    parent_layers: Option<&BTreeSet<String>>,
) -> Result<Vec<String>> {
    let excluded = |name: &str| parent_layers.map(|p| p.contains(name)).unwrap_or(false);

    // Collect the needed set: selection plus transitive dependencies,
    // minus anything the parent already provides.
    let mut needed: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<String> = selection
        .iter()
        .filter(|name| !excluded(name.as_str()))
        .cloned()
        .collect();

    while let Some(name) = stack.pop() {
        let layer = layers
            .get(&name)
            .ok_or_else(|| PlanError::UnknownLayer(name.clone()))?;
        if !needed.insert(name) {
            continue;
        }
        for dep in &layer.depends {
            if !excluded(dep) && !needed.contains(dep) {
                stack.push(dep.clone());
            }
        }
    }

    // Kahn's algorithm restricted to the needed set. The frontier is a
    // sorted set, so ties resolve by ascending name.
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in &needed {
        let deps: Vec<&str> = layers[name.as_str()]
            .depends
            .iter()
            .map(String::as_str)
            .filter(|dep| needed.contains(*dep))
            .collect();
        in_degree.insert(name, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(name);
        }
    }

    let mut frontier: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(needed.len());
    while let Some(&name) = frontier.iter().next() {
        frontier.remove(name);
        order.push(name.to_string());

        for &dependent in dependents.get(name).into_iter().flatten() {
            let degree = in_degree.get_mut(dependent).expect("dependent in graph");
            *degree -= 1;
            if *degree == 0 {
                frontier.insert(dependent);
            }
        }
    }

    if order.len() != needed.len() {
        return Err(PlanError::LayerCycle);
    }
    Ok(order)
}

/// Collect every transitive dependency of `name`, excluding `excluded`
/// layers (and everything reachable only through them).
///
/// The returned set does not contain `name` itself.
pub fn transitive_dependencies(
    name: &str,
    layers: &BTreeMap<String, Layer>,
    excluded: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut stack: Vec<&str> = match layers.get(name) {
        Some(layer) => layer.depends.iter().map(String::as_str).collect(),
        None => return found,
    };

    while let Some(dep) = stack.pop() {
        if excluded.contains(dep) || found.contains(dep) {
            continue;
        }
        found.insert(dep.to_string());
        if let Some(layer) = layers.get(dep) {
            stack.extend(layer.depends.iter().map(String::as_str));
        }
    }
    found
}
