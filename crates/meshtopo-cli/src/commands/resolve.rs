//! `mtopo resolve`: Print resolved machine configuration.

use std::path::PathBuf;

use clap::Args;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::types::MachineName;
use meshtopo_topology::synth::ResolvedMachineConfig;

use crate::output::{OutputFormat, render_configs};

/// Arguments for the `resolve` command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to the topology file.
    pub file: PathBuf,

    /// Only this instance.
    #[arg(long)]
    pub instance: Option<String>,

    /// Only this machine.
    #[arg(long)]
    pub machine: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

/// Executes the `resolve` command.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded, a requested instance
/// or machine does not exist, or any instance failed to resolve.
pub fn execute(config: &MeshtopoConfig, args: ResolveArgs) -> anyhow::Result<()> {
    let plan = super::load_plan(config, &args.file)?;
    let instances = super::select(&plan, args.instance.as_deref())?;

    let configs: Vec<&ResolvedMachineConfig> = match &args.machine {
        Some(machine) => {
            let machine = MachineName::new(machine.as_str());
            let found: Vec<_> = instances
                .iter()
                .filter_map(|instance| instance.configs.get(&machine))
                .collect();
            if found.is_empty() {
                anyhow::bail!("machine {machine} not found in any resolved instance");
            }
            found
        }
        None => instances
            .iter()
            .flat_map(|instance| instance.configs.values())
            .collect(),
    };

    print!("{}", render_configs(&configs, args.format)?);
    super::ensure_complete(&plan, args.instance.as_deref())
}
