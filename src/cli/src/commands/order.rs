//! `stratum order` command.

use std::path::PathBuf;

use clap::Args;

use stratum_planner::Generator;

#[derive(Args)]
pub struct OrderArgs {
    /// Fleet directory (contains images.yml and layers/)
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Fleet tag; defaults to today's CalVer tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

pub fn execute(args: OrderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let generator = Generator::new(&args.dir, args.tag)?;
    let order = generator.build_order()?;

    for name in &order {
        let img = &generator.images()[name];
        let marker = if img.auto { " (auto)" } else { "" };
        println!("{name}{marker}  <- {}", img.base);
    }
    Ok(())
}
