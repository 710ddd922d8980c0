//! `stratum merge` command.

use std::path::PathBuf;

use clap::Args;

use stratum_planner::merge_image;

#[derive(Args)]
pub struct MergeArgs {
    /// OCI image layout directory to compact in place
    pub layout: PathBuf,

    /// Maximum merged-layer size in MB
    #[arg(long, default_value_t = 512)]
    pub max_mb: u64,
}

pub fn execute(args: MergeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = merge_image(&args.layout, args.max_mb * 1024 * 1024)?;

    if outcome.merged_steps == 0 {
        println!(
            "Nothing to merge: no adjacent run of {} layers fits under {} MB",
            outcome.layers_before, args.max_mb
        );
    } else {
        println!(
            "Merged {} layers into {} ({} merge step{})",
            outcome.layers_before,
            outcome.layers_after,
            outcome.merged_steps,
            if outcome.merged_steps == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
