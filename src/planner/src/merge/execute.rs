//! Merge execution.
//!
//! Applies a merge plan to an image in an OCI layout directory: merged
//! layers are written as new uncompressed tar blobs, diff IDs are
//! recomputed, and the history is realigned so empty-layer records keep
//! their position relative to the surviving layers.

use std::io::BufWriter;
use std::path::Path;

use stratum_core::error::{PlanError, Result};

use super::oci::{
    Descriptor, HashingWriter, HistoryRecord, ImageLayout, MEDIA_TYPE_LAYER_TAR,
};
use super::plan::{plan_merge, MergeStep};
use super::tar::{merge_layer_streams, BlobLayer, LayerReader};

/// Summary of an executed merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub layers_before: usize,
    pub layers_after: usize,
    pub merged_steps: usize,
}

/// Rebuild an image history against a merge plan.
///
/// Non-empty records correspond one-to-one with the original layers.
/// Empty-layer records are preserved at their relative positions; each
/// merged group collapses into a single aggregated record in place of the
/// group's first non-empty record.
pub fn realign_history(
    history: &[HistoryRecord],
    steps: &[MergeStep],
) -> Result<Vec<HistoryRecord>> {
    let non_empty: Vec<&HistoryRecord> =
        history.iter().filter(|h| !h.empty_layer).collect();
    let layer_count: usize = steps.iter().map(|s| s.layers.len()).sum();
    if non_empty.len() != layer_count {
        return Err(PlanError::MergeError(format!(
            "history has {} non-empty records for {} layers",
            non_empty.len(),
            layer_count
        )));
    }

    // Map each layer index to its step and whether it leads the step.
    let mut step_of = vec![(0usize, false); layer_count];
    for (step_idx, step) in steps.iter().enumerate() {
        for (pos, &layer) in step.layers.iter().enumerate() {
            step_of[layer] = (step_idx, pos == 0);
        }
    }

    let mut rebuilt = Vec::new();
    let mut layer = 0usize;
    for record in history {
        if record.empty_layer {
            rebuilt.push(record.clone());
            continue;
        }

        let (step_idx, leads) = step_of[layer];
        let step = &steps[step_idx];
        if step.keep {
            rebuilt.push(record.clone());
        } else if leads {
            rebuilt.push(aggregate_records(&non_empty, step));
        }
        layer += 1;
    }

    Ok(rebuilt)
}

/// Fold the records of a merged group into one: commands joined in
/// order, timestamp taken from the last constituent.
fn aggregate_records(non_empty: &[&HistoryRecord], step: &MergeStep) -> HistoryRecord {
    let created_by = step
        .layers
        .iter()
        .filter_map(|&i| non_empty[i].created_by.as_deref())
        .collect::<Vec<&str>>()
        .join(" && ");
    let created = step
        .layers
        .last()
        .and_then(|&i| non_empty[i].created.clone());

    HistoryRecord {
        created,
        created_by: Some(created_by),
        ..Default::default()
    }
}

/// Plan and execute a layer merge over an OCI layout directory.
///
/// The image is replaced in place: merged layers become new uncompressed
/// tar blobs, and the index is rewritten to point at the new manifest.
/// When every step is a keep the layout is left untouched.
pub fn merge_image(layout_dir: &Path, max_bytes: u64) -> Result<MergeOutcome> {
    let layout = ImageLayout::open(layout_dir)?;

    let layer_count = layout.manifest.layers.len();
    if layout.config.rootfs.diff_ids.len() != layer_count {
        return Err(PlanError::MergeError(format!(
            "config lists {} diff_ids for {} layers",
            layout.config.rootfs.diff_ids.len(),
            layer_count
        )));
    }

    let sizes: Vec<u64> = layout.manifest.layers.iter().map(|d| d.size).collect();
    let steps = plan_merge(&sizes, max_bytes);

    if steps.iter().all(|s| s.keep) {
        tracing::info!(layers = layer_count, "no adjacent layers fit under the cap");
        return Ok(MergeOutcome {
            layers_before: layer_count,
            layers_after: layer_count,
            merged_steps: 0,
        });
    }

    let mut new_layers: Vec<Descriptor> = Vec::with_capacity(steps.len());
    let mut new_diff_ids: Vec<String> = Vec::with_capacity(steps.len());

    for step in &steps {
        if step.keep {
            let i = step.layers[0];
            new_layers.push(layout.manifest.layers[i].clone());
            new_diff_ids.push(layout.config.rootfs.diff_ids[i].clone());
            continue;
        }

        let sources: Vec<Box<dyn LayerReader>> = step
            .layers
            .iter()
            .map(|&i| {
                let descriptor = &layout.manifest.layers[i];
                Box::new(BlobLayer::new(
                    layout.blob_path(&descriptor.digest),
                    descriptor.media_type.ends_with("gzip"),
                )) as Box<dyn LayerReader>
            })
            .collect();

        // Stream the concatenation to a temp blob while hashing; the
        // output is uncompressed tar, so its digest is also its diff ID.
        let (tmp_path, file) = layout.blob_writer()?;
        let writer = merge_layer_streams(&sources, HashingWriter::new(BufWriter::new(file)))?;
        let (hash, size) = writer
            .finish()
            .map_err(|e| PlanError::MergeError(format!("finalizing merged blob: {e}")))?;

        let digest = format!("sha256:{hash}");
        layout.commit_blob(&tmp_path, &digest)?;

        tracing::debug!(
            layers = ?step.layers,
            digest = %digest,
            size,
            "merged layer group"
        );

        new_layers.push(Descriptor {
            media_type: MEDIA_TYPE_LAYER_TAR.to_string(),
            digest: digest.clone(),
            size,
            annotations: None,
        });
        new_diff_ids.push(digest);
    }

    let mut new_config = layout.config.clone();
    new_config.rootfs.diff_ids = new_diff_ids;
    new_config.history = realign_history(&layout.config.history, &steps)?;

    let (config_digest, config_size) = layout.write_json_blob(&new_config)?;
    let mut new_manifest = layout.manifest.clone();
    new_manifest.config.digest = config_digest;
    new_manifest.config.size = config_size;
    new_manifest.layers = new_layers;

    let (manifest_digest, manifest_size) = layout.write_json_blob(&new_manifest)?;
    let mut new_index = layout.index.clone();
    new_index.manifests[0].digest = manifest_digest;
    new_index.manifests[0].size = manifest_size;
    layout.write_index(&new_index)?;

    let outcome = MergeOutcome {
        layers_before: layer_count,
        layers_after: steps.len(),
        merged_steps: steps.iter().filter(|s| !s.keep).count(),
    };
    tracing::info!(
        before = outcome.layers_before,
        after = outcome.layers_after,
        "merged image layers"
    );
    Ok(outcome)
}
