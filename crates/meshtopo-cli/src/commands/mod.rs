//! CLI command definitions and dispatch.

pub mod certs;
pub mod hosts;
pub mod plan;
pub mod render;
pub mod resolve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use meshtopo_common::config::{CidrPolicy, MeshtopoConfig};
use meshtopo_common::types::InstanceName;
use meshtopo_sdk::planner::{Plan, Planner};
use meshtopo_topology::resolver::ResolvedInstance;

/// meshtopo: overlay mesh topology resolver.
#[derive(Parser, Debug)]
#[command(name = meshtopo_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (YAML).
    #[arg(long, global = true, env = "MESHTOPO_CONFIG")]
    pub config: Option<PathBuf>,

    /// CIDR selection rule when lighthouses disagree.
    #[arg(long, global = true, env = "MESHTOPO_CIDR_POLICY")]
    pub cidr_policy: Option<CidrPolicy>,

    /// Base directory of the var stores.
    #[arg(long, global = true, env = "MESHTOPO_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Certificate tool invoked by generators.
    #[arg(long, global = true, env = "MESHTOPO_CERT_TOOL")]
    pub cert_tool: Option<String>,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration of every machine.
    Resolve(resolve::ResolveArgs),
    /// Print the hosts block of every instance.
    Hosts(hosts::HostsArgs),
    /// Display the resolution and certificate plan.
    Plan(plan::PlanArgs),
    /// Write daemon configs and hosts blocks to a directory.
    Render(render::RenderArgs),
    /// Issue instance CAs and machine certificates.
    Certs(certs::CertsArgs),
}

impl Cli {
    /// Builds the effective configuration: file first, then flags and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn load_config(&self) -> anyhow::Result<MeshtopoConfig> {
        let mut config = match &self.config {
            Some(path) => MeshtopoConfig::load(path)?,
            None => MeshtopoConfig::default(),
        };
        if let Some(policy) = self.cidr_policy {
            config.cidr_policy = policy;
        }
        if let Some(dir) = &self.store_dir {
            config.store_dir.clone_from(dir);
        }
        if let Some(tool) = &self.cert_tool {
            config.cert_tool.clone_from(tool);
        }
        Ok(config)
    }
}

/// Loads a topology file and resolves every instance in it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_plan(config: &MeshtopoConfig, file: &std::path::Path) -> anyhow::Result<Plan> {
    Ok(Planner::new(config.clone()).load(file)?)
}

/// Picks the instances a command operates on.
///
/// With a name, that instance must have resolved. Without one, every
/// resolved instance is selected and failed instances are reported.
///
/// # Errors
///
/// Returns an error if the named instance is missing or failed.
pub fn select<'a>(plan: &'a Plan, instance: Option<&str>) -> anyhow::Result<Vec<&'a ResolvedInstance>> {
    if let Some(name) = instance {
        return Ok(vec![plan.instance(&InstanceName::new(name))?]);
    }
    for (name, error) in plan.failures() {
        eprintln!("error: instance {name}: {error}");
    }
    Ok(plan.resolved().collect())
}

/// Fails if any instance of the plan did not resolve.
///
/// # Errors
///
/// Returns an error naming the failed instances.
pub fn ensure_complete(plan: &Plan, instance: Option<&str>) -> anyhow::Result<()> {
    if instance.is_some() || plan.is_complete() {
        return Ok(());
    }
    let failed: Vec<String> = plan.failures().map(|(name, _)| name.to_string()).collect();
    anyhow::bail!("{} instance(s) failed to resolve: {}", failed.len(), failed.join(", "))
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    match cli.command {
        Command::Resolve(args) => resolve::execute(&config, args),
        Command::Hosts(args) => hosts::execute(&config, args),
        Command::Plan(args) => plan::execute(&config, args),
        Command::Render(args) => render::execute(&config, args),
        Command::Certs(args) => certs::execute(&config, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "mtopo",
            "--cidr-policy",
            "strict",
            "--store-dir",
            "/tmp/vars",
            "plan",
            "topology.yaml",
        ])
        .expect("parse");
        let config = cli.load_config().expect("config");
        assert_eq!(config.cidr_policy, CidrPolicy::Strict);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/vars"));
        assert_eq!(config.cert_tool, "nebula-cert");
    }

    #[test]
    fn unknown_cidr_policy_is_rejected() {
        assert!(Cli::try_parse_from(["mtopo", "--cidr-policy", "loose", "plan", "t.yaml"]).is_err());
    }
}
