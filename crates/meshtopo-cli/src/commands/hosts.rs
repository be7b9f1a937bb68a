//! `mtopo hosts`: Print hosts blocks.

use std::path::PathBuf;

use clap::Args;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_topology::render;

/// Arguments for the `hosts` command.
#[derive(Args, Debug)]
pub struct HostsArgs {
    /// Path to the topology file.
    pub file: PathBuf,

    /// Only this instance.
    #[arg(long)]
    pub instance: Option<String>,
}

/// Executes the `hosts` command.
///
/// Prints one delimited block per instance, ready to merge into a
/// name-resolution file.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded or any selected
/// instance failed to resolve.
pub fn execute(config: &MeshtopoConfig, args: HostsArgs) -> anyhow::Result<()> {
    let plan = super::load_plan(config, &args.file)?;
    for instance in super::select(&plan, args.instance.as_deref())? {
        print!("{}", render::hosts_block(&instance.name, &instance.hosts_table));
    }
    super::ensure_complete(&plan, args.instance.as_deref())
}
