//! End-to-end tests for the meshtopo pipeline.
//!
//! These tests verify the full path a topology file takes:
//! 1. Load and resolve every instance
//! 2. Write daemon configs and hosts blocks
//! 3. Issue certificates into the var store
//! 4. Re-run issuance without changes

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use meshtopo_certs::generator::GeneratorSpec;
use meshtopo_certs::runner::{GeneratedFiles, GeneratorInputs, GeneratorRunner};
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::error::Result;
use meshtopo_common::types::{InstanceName, MachineName};
use meshtopo_sdk::artifacts::write_artifacts;
use meshtopo_sdk::issuer::Issuer;
use meshtopo_sdk::planner::Planner;

const TOPOLOGY: &str = r"
instances:
  mesh:
    lighthouses:
      lighthouse1:
        endpoint: 1.2.3.4
        nebula_ip: 10.87.0.1
        network_cidr: 10.87.0.0/16
        is_relay: true
      lighthouse2: ~
    nodes:
      node1:
        nebula_ip: 10.87.0.10
      node2:
        nebula_ip: 10.87.0.11
        port: 4242
  lab:
    nodes:
      solo:
        nebula_ip: 10.87.1.1
";

#[derive(Clone, Default)]
struct CountingRunner {
    runs: Arc<AtomicUsize>,
}

impl GeneratorRunner for CountingRunner {
    async fn run(&self, spec: &GeneratorSpec, _inputs: &GeneratorInputs) -> Result<GeneratedFiles> {
        let _ = self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(spec
            .outputs
            .iter()
            .map(|o| (o.name.clone(), format!("{} {}", spec.id, o.name).into_bytes()))
            .collect())
    }
}

// ── Resolution and artifacts ─────────────────────────────────────────

#[test]
fn pipeline_resolves_and_writes_artifacts() {
    let work = tempfile::tempdir().expect("tempdir");
    let topology = work.path().join("topology.yaml");
    std::fs::write(&topology, TOPOLOGY).expect("write topology");

    let plan = Planner::default().load(&topology).expect("load");
    assert!(plan.is_complete());

    let mesh = plan.instance(&InstanceName::new("mesh")).expect("mesh");
    assert_eq!(mesh.configs.len(), 3, "unconfigured lighthouse2 is skipped");
    assert_eq!(mesh.warnings.len(), 1);

    let out = work.path().join("out");
    let written = write_artifacts(&plan, &out).expect("write artifacts");
    assert_eq!(written.len(), 3 + 1 + 1 + 1);
    assert!(out.join("lab/solo.yaml").is_file());

    let hosts = std::fs::read_to_string(out.join("mesh/hosts")).expect("hosts");
    assert!(!hosts.contains("lighthouse2"));
    assert!(hosts.contains("10.87.0.11 node2.nebula"));
}

// ── Certificate issuance ─────────────────────────────────────────────

#[tokio::test]
async fn pipeline_issues_certificates_idempotently() {
    let work = tempfile::tempdir().expect("tempdir");
    let config = MeshtopoConfig {
        store_dir: work.path().join("vars"),
        ..MeshtopoConfig::default()
    };
    let plan = Planner::new(config.clone()).plan(
        &meshtopo_topology::parser::parse_topology(TOPOLOGY).expect("parse"),
    );

    let runner = CountingRunner::default();
    let runs = Arc::clone(&runner.runs);
    let issuer = Issuer::new(runner, &config, false, None).expect("issuer");
    let reports = issuer.issue(plan.resolved()).await.expect("issue");
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_success()));
    // Two CAs, three mesh machines, one lab machine.
    assert_eq!(runs.load(Ordering::SeqCst), 6);

    let node1 = &plan.instance(&InstanceName::new("mesh")).expect("mesh").configs
        [&MachineName::new("node1")];
    let cert = std::fs::read_to_string(&node1.pki.cert).expect("node cert");
    assert_eq!(cert, "per-machine/node1/nebula-cert-mesh node.crt");
    assert!(node1.pki.key.starts_with(work.path().join("vars/secret")));

    let runner = CountingRunner::default();
    let runs = Arc::clone(&runner.runs);
    let again = Issuer::new(runner, &config, false, None).expect("issuer");
    let reports = again.issue(plan.resolved()).await.expect("re-issue");
    assert!(reports.iter().all(|r| r.is_success()));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
