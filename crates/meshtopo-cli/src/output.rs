//! Formatted output helpers for CLI commands.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use clap::ValueEnum;
use meshtopo_common::types::GeneratorState;
use meshtopo_topology::render;
use meshtopo_topology::synth::ResolvedMachineConfig;

/// Output format of `mtopo resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Resolved configs as JSON, keyed by instance then machine.
    Json,
    /// Resolved configs as YAML, keyed by instance then machine.
    Yaml,
    /// Daemon configuration documents.
    Daemon,
}

/// Renders machine configs in the requested format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_configs(
    configs: &[&ResolvedMachineConfig],
    format: OutputFormat,
) -> anyhow::Result<String> {
    let mut by_instance: BTreeMap<&str, BTreeMap<&str, &ResolvedMachineConfig>> = BTreeMap::new();
    for config in configs {
        let _ = by_instance
            .entry(config.instance.as_str())
            .or_default()
            .insert(config.machine.as_str(), config);
    }
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&by_instance)? + "\n"),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&by_instance)?),
        OutputFormat::Daemon => {
            let mut out = String::new();
            for config in by_instance.values().flat_map(BTreeMap::values) {
                let _ = writeln!(out, "---\n# {}/{}", config.instance, config.machine);
                out.push_str(&render::daemon_config(config)?);
            }
            Ok(out)
        }
    }
}

/// One-character marker for a generator state.
#[must_use]
pub const fn state_marker(state: GeneratorState) -> &'static str {
    match state {
        GeneratorState::Done => "✓",
        GeneratorState::Failed => "✗",
        GeneratorState::Running => "…",
        GeneratorState::Pending => "·",
    }
}

#[cfg(test)]
mod tests {
    use meshtopo_common::config::MeshtopoConfig;
    use meshtopo_sdk::planner::Planner;
    use meshtopo_topology::parser::parse_topology;

    use super::*;

    fn configs() -> Vec<ResolvedMachineConfig> {
        let topology = parse_topology(
            r"
instances:
  mesh:
    lighthouses:
      lighthouse1:
        endpoint: 1.2.3.4
        nebula_ip: 10.87.0.1
    nodes:
      node1:
        nebula_ip: 10.87.0.10
",
        )
        .expect("parse");
        let plan = Planner::new(MeshtopoConfig::default()).plan(&topology);
        plan.resolved()
            .flat_map(|i| i.configs.values().cloned())
            .collect()
    }

    #[test]
    fn render_configs_json_nests_instance_and_machine() {
        let configs = configs();
        let refs: Vec<&ResolvedMachineConfig> = configs.iter().collect();
        let json = render_configs(&refs, OutputFormat::Json).expect("render");
        let value: serde_json::Value = serde_json::from_str(&json).expect("reparse");
        assert_eq!(value["mesh"]["node1"]["is_lighthouse"], false);
        assert_eq!(value["mesh"]["lighthouse1"]["is_lighthouse"], true);
    }

    #[test]
    fn render_configs_daemon_separates_documents() {
        let configs = configs();
        let refs: Vec<&ResolvedMachineConfig> = configs.iter().collect();
        let out = render_configs(&refs, OutputFormat::Daemon).expect("render");
        assert_eq!(out.matches("---\n").count(), 2);
        assert!(out.contains("# mesh/node1\n"));
    }

    #[test]
    fn state_marker_distinguishes_terminal_states() {
        assert_ne!(state_marker(GeneratorState::Done), state_marker(GeneratorState::Failed));
    }
}
