//! Layer scaffolding.

use std::fs;
use std::path::Path;

use stratum_core::error::{PlanError, Result};

use crate::alias::is_valid_alias_name;

/// Create a new layer skeleton under `<dir>/layers/<name>/`.
///
/// Fails if the layer directory already exists.
pub fn scaffold_layer(dir: &Path, name: &str) -> Result<()> {
    if !is_valid_alias_name(name) {
        return Err(PlanError::validation(
            "layer name",
            format!("invalid layer name {name:?}"),
        ));
    }

    let layer_dir = dir.join("layers").join(name);
    if layer_dir.exists() {
        return Err(PlanError::ConfigError(format!(
            "layer {name:?} already exists"
        )));
    }

    fs::create_dir_all(&layer_dir).map_err(|e| PlanError::io(&layer_dir, e))?;

    let rpm_list = layer_dir.join("rpm.list");
    fs::write(
        &rpm_list,
        format!(
            "# Native packages for the {name} layer, one per line.\n\
             # Lines of the form copr:owner/project enable a COPR repository.\n"
        ),
    )
    .map_err(|e| PlanError::io(&rpm_list, e))?;

    tracing::info!(layer = %name, "scaffolded layer");
    Ok(())
}
