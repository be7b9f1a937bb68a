//! `mtopo certs`: Issue instance CAs and machine certificates.

use std::path::PathBuf;

use clap::Args;
use meshtopo_certs::graph::CertGraph;
use meshtopo_certs::runner::CommandRunner;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_sdk::issuer::Issuer;
use tokio::sync::watch;

use crate::output::state_marker;

/// Arguments for the `certs` command.
#[derive(Args, Debug)]
pub struct CertsArgs {
    /// Path to the topology file.
    pub file: PathBuf,

    /// Only this instance.
    #[arg(long)]
    pub instance: Option<String>,

    /// Re-run every generator even if its outputs are up to date.
    #[arg(long)]
    pub regenerate: bool,

    /// Print the generator records as JSON instead of running them.
    #[arg(long)]
    pub dry_run: bool,
}

/// Executes the `certs` command.
///
/// Builds the certificate graph of every selected instance and runs it with
/// the external certificate tool. Ctrl+C cancels the run; generators that
/// did not finish are reported as failed and nothing partial is stored.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded, the run cannot start,
/// or any generator failed.
pub fn execute(config: &MeshtopoConfig, args: CertsArgs) -> anyhow::Result<()> {
    let plan = super::load_plan(config, &args.file)?;
    let instances = super::select(&plan, args.instance.as_deref())?;

    if args.dry_run {
        let graphs: Vec<CertGraph> = instances
            .iter()
            .map(|instance| CertGraph::for_instance(instance, &config.cert_tool))
            .collect();
        let specs: Vec<_> = graphs.iter().flat_map(CertGraph::specs).collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return super::ensure_complete(&plan, args.instance.as_deref());
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = cancel_tx.send(true);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let issuer = Issuer::new(CommandRunner::new(), config, args.regenerate, Some(cancel_rx))?;
    let reports = runtime.block_on(issuer.issue(instances.iter().copied()))?;

    let mut failed = 0usize;
    for report in &reports {
        println!("  instance {}", report.instance);
        for (id, generator) in &report.generators {
            let note = if generator.ran { "issued" } else { "up to date" };
            match &generator.error {
                Some(error) => println!("    {} {id}: {error}", state_marker(generator.state)),
                None => println!("    {} {id} ({note})", state_marker(generator.state)),
            }
        }
        failed += report.failures().count();
    }
    println!();
    println!("  store: {}", config.store_dir.display());

    if failed > 0 {
        anyhow::bail!("{failed} generator(s) failed");
    }
    super::ensure_complete(&plan, args.instance.as_deref())
}
