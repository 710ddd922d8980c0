//! `stratum shell` command.

use std::path::PathBuf;
use std::process::Command;

use clap::Args;

use stratum_planner::calver::compute_calver;
use stratum_planner::config::Config;
use stratum_planner::engine::{engine_binary, ensure_image, resolve_runtime};
use stratum_planner::resolve_all_images;

#[derive(Args)]
pub struct ShellArgs {
    /// Image to run
    pub image: String,

    /// Command to run instead of an interactive shell
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Fleet directory (contains images.yml and layers/)
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Fleet tag; defaults to today's CalVer tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

pub fn execute(args: ShellArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&args.dir)?;
    let tag = args.tag.unwrap_or_else(compute_calver);
    let images = resolve_all_images(&config, &tag)?;

    let img = images
        .get(&args.image)
        .ok_or_else(|| format!("image {:?} is not configured", args.image))?;

    let rt = resolve_runtime(&config);
    ensure_image(&img.full_tag, &rt)?;

    let mut cmd = Command::new(engine_binary(&rt.run_engine));
    cmd.args(["run", "--rm"]);
    match &args.command {
        Some(command) => {
            cmd.args(["-i", &img.full_tag, "sh", "-c", command]);
        }
        None => {
            cmd.args(["-it", &img.full_tag, "sh"]);
        }
    }

    let status = cmd.status()?;
    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
