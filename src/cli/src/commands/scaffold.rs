//! `stratum scaffold` command.

use std::path::PathBuf;

use clap::Args;

use stratum_planner::scaffold::scaffold_layer;

#[derive(Args)]
pub struct ScaffoldArgs {
    /// Name of the new layer
    pub name: String,

    /// Fleet directory (contains images.yml and layers/)
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,
}

pub fn execute(args: ScaffoldArgs) -> Result<(), Box<dyn std::error::Error>> {
    scaffold_layer(&args.dir, &args.name)?;
    println!(
        "Created {}",
        args.dir.join("layers").join(&args.name).display()
    );
    Ok(())
}
