//! `stratum generate` command.

use std::path::PathBuf;

use clap::Args;

use stratum_planner::Generator;

#[derive(Args)]
pub struct GenerateArgs {
    /// Fleet directory (contains images.yml and layers/)
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Fleet tag; defaults to today's CalVer tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

pub fn execute(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let generator = Generator::new(&args.dir, args.tag)?;
    generator.generate()?;

    let images = generator.images();
    let intermediates = images.values().filter(|img| img.auto).count();
    println!(
        "Generated {} Containerfiles ({} intermediate{}) under {} with tag {}",
        images.len(),
        intermediates,
        if intermediates == 1 { "" } else { "s" },
        args.dir.join(".build").display(),
        generator.tag()
    );
    Ok(())
}
