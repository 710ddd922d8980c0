//! `stratum alias` commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use stratum_planner::alias::{
    collect_image_aliases, list_alias_scripts, remove_alias_script, write_alias_script,
};
use stratum_planner::config::Config;
use stratum_planner::layer::scan_layers;

use super::alias_bin_dir;

#[derive(Subcommand)]
pub enum AliasCommand {
    /// List installed alias scripts
    List(ListArgs),
    /// Install alias scripts for an image
    Install(InstallArgs),
    /// Remove an installed alias script
    Remove(RemoveArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// Directory holding alias scripts
    #[arg(long)]
    pub bin_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Image whose aliases to install
    pub image: String,

    /// Fleet directory (contains images.yml and layers/)
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Directory to write alias scripts into
    #[arg(long)]
    pub bin_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Alias script name
    pub name: String,

    /// Directory holding alias scripts
    #[arg(long)]
    pub bin_dir: Option<PathBuf>,
}

pub fn execute(command: AliasCommand) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AliasCommand::List(args) => {
            let bin_dir = args.bin_dir.unwrap_or_else(alias_bin_dir);
            let scripts = list_alias_scripts(&bin_dir)?;
            for script in scripts {
                println!("{}\t{}\t{}", script.name, script.image, script.command);
            }
            Ok(())
        }
        AliasCommand::Install(args) => {
            let bin_dir = args.bin_dir.unwrap_or_else(alias_bin_dir);
            let config = Config::load(&args.dir)?;
            let layers = scan_layers(&args.dir)?;

            let aliases = collect_image_aliases(&config, &layers, &args.image)?;
            if aliases.is_empty() {
                println!("Image {} declares no aliases", args.image);
                return Ok(());
            }
            for alias in &aliases {
                write_alias_script(&bin_dir, &alias.name, &args.image, &alias.command)?;
                println!("Installed {}", bin_dir.join(&alias.name).display());
            }
            Ok(())
        }
        AliasCommand::Remove(args) => {
            let bin_dir = args.bin_dir.unwrap_or_else(alias_bin_dir);
            remove_alias_script(&bin_dir, &args.name)?;
            println!("Removed {}", bin_dir.join(&args.name).display());
            Ok(())
        }
    }
}
