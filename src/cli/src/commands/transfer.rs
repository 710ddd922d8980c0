//! `stratum transfer` command.

use clap::Args;

use stratum_planner::engine::transfer_image;

#[derive(Args)]
pub struct TransferArgs {
    /// Image reference to copy
    pub image: String,

    /// Source engine
    #[arg(long = "from")]
    pub from_engine: String,

    /// Destination engine
    #[arg(long = "to")]
    pub to_engine: String,
}

pub fn execute(args: TransferArgs) -> Result<(), Box<dyn std::error::Error>> {
    transfer_image(&args.from_engine, &args.to_engine, &args.image)?;
    println!(
        "Transferred {} from {} to {}",
        args.image, args.from_engine, args.to_engine
    );
    Ok(())
}
