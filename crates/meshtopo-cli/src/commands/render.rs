//! `mtopo render`: Write daemon configs and hosts blocks to disk.

use std::path::PathBuf;

use clap::Args;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_sdk::artifacts;

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the topology file.
    pub file: PathBuf,

    /// Output directory; one subdirectory per instance.
    #[arg(long, short)]
    pub out_dir: PathBuf,

    /// Only this instance.
    #[arg(long)]
    pub instance: Option<String>,
}

/// Executes the `render` command.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded, an artifact cannot be
/// written, or any selected instance failed to resolve.
pub fn execute(config: &MeshtopoConfig, args: RenderArgs) -> anyhow::Result<()> {
    let plan = super::load_plan(config, &args.file)?;
    for instance in super::select(&plan, args.instance.as_deref())? {
        for path in artifacts::write_instance(instance, &args.out_dir)? {
            println!("wrote {}", path.display());
        }
    }
    super::ensure_complete(&plan, args.instance.as_deref())
}
