//! `mtopo plan`: Display the resolution and certificate plan.

use std::path::PathBuf;

use clap::Args;
use meshtopo_certs::graph::CertGraph;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_topology::model::MachineSettings;
use meshtopo_topology::resolver::ResolvedInstance;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the topology file.
    pub file: PathBuf,

    /// Only this instance.
    #[arg(long)]
    pub instance: Option<String>,
}

/// Executes the `plan` command.
///
/// Resolves every instance and shows its network, machines, warnings,
/// certificate generation order, and routing export.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded or any selected
/// instance failed to resolve.
pub fn execute(config: &MeshtopoConfig, args: PlanArgs) -> anyhow::Result<()> {
    let plan = super::load_plan(config, &args.file)?;
    let instances = super::select(&plan, args.instance.as_deref())?;

    println!("Topology plan for: {}", args.file.display());
    println!("{}", "\u{2550}".repeat(40));

    for instance in &instances {
        println!();
        print_instance(instance, &config.cert_tool)?;
    }

    println!();
    println!("  {} instance(s) resolved.", instances.len());
    super::ensure_complete(&plan, args.instance.as_deref())
}

fn print_instance(instance: &ResolvedInstance, tool: &str) -> anyhow::Result<()> {
    println!("  instance {}", instance.name);
    println!("      network: {}", instance.host_map.network_cidr);
    println!(
        "      export:  {} (priority {})",
        instance.export.scope_key, instance.export.priority
    );

    println!("      machines:");
    for (name, settings) in &instance.machines {
        match settings {
            MachineSettings::Lighthouse(lh) => {
                let relay = if lh.is_relay { " relay" } else { "" };
                println!(
                    "        + {:<20} lighthouse{relay:<6} {:<15} {}",
                    name.as_str(),
                    lh.nebula_ip,
                    lh.endpoint
                );
            }
            MachineSettings::Node(node) => {
                println!("        + {:<20} node{:<12} {}", name.as_str(), "", node.nebula_ip);
            }
        }
    }

    if !instance.warnings.is_empty() {
        println!("      warnings:");
        for warning in &instance.warnings {
            println!("        ! {warning}");
        }
    }

    let graph = CertGraph::for_instance(instance, tool);
    println!("      certificates:");
    for (step, id) in graph.resolve_order()?.iter().enumerate() {
        println!("        {}. {id}", step + 1);
    }
    Ok(())
}
