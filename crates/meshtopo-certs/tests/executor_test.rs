//! End-to-end certificate issuance against a stand-in certificate tool.
//!
//! Resolves a topology, builds its certificate graph, and executes it with
//! the real [`CommandRunner`], using a shell script that mimics the
//! certificate tool's `ca` and `sign` subcommands.

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use meshtopo_certs::executor::{Executor, ExecutorOptions};
use meshtopo_certs::graph::CertGraph;
use meshtopo_certs::runner::CommandRunner;
use meshtopo_certs::store::FsVarStore;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::types::InstanceName;
use meshtopo_topology::parser::parse_topology;
use meshtopo_topology::resolver::resolve_instance;

const TOPOLOGY: &str = r"
instances:
  mesh:
    lighthouses:
      lighthouse1:
        endpoint: 1.2.3.4
        nebula_ip: 10.87.0.1
        network_cidr: 10.87.0.0/16
    nodes:
      node1:
        nebula_ip: 10.87.0.10
      node2:
        nebula_ip: 10.87.0.11
";

const FAKE_TOOL: &str = r#"#!/bin/sh
set -eu
cmd=$1; shift
crt=""; key=""; name=""; ip=""
while [ $# -gt 0 ]; do
  case "$1" in
    -out-crt) crt=$2; shift 2 ;;
    -out-key) key=$2; shift 2 ;;
    -name) name=$2; shift 2 ;;
    -ip) ip=$2; shift 2 ;;
    -ca-crt|-ca-key) test -s "$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '%s %s %s\n' "$cmd" "$name" "$ip" > "$crt"
printf 'key-%s\n' "$name" > "$key"
"#;

fn install_tool(dir: &Path) -> String {
    let path = dir.join("fake-nebula-cert");
    std::fs::write(&path, FAKE_TOOL).expect("write tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path.to_str().expect("utf-8 path").to_string()
}

fn graph(tool: &str) -> CertGraph {
    let topology = parse_topology(TOPOLOGY).expect("parse");
    let resolved = resolve_instance(
        &InstanceName::new("mesh"),
        &topology.instances["mesh"],
        &MeshtopoConfig::default(),
    )
    .expect("resolve");
    CertGraph::for_instance(&resolved, tool)
}

#[tokio::test]
async fn issues_ca_and_node_certificates_once() {
    let tools = tempfile::tempdir().expect("tempdir");
    let store_dir = tempfile::tempdir().expect("tempdir");
    let tool = install_tool(tools.path());
    let graph = graph(&tool);
    let options = || ExecutorOptions {
        state_path: Some(store_dir.path().join("state.json")),
        ..ExecutorOptions::default()
    };

    let executor = Executor::new(
        CommandRunner::new(),
        Arc::new(FsVarStore::new(store_dir.path())),
        options(),
    )
    .expect("executor");
    let report = executor.execute(&graph).await.expect("execute");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.generators.len(), 4);

    let public = store_dir.path().join("public");
    let secret = store_dir.path().join("secret");
    let ca = std::fs::read_to_string(public.join("shared/nebula-ca-mesh/ca.crt")).expect("ca");
    assert_eq!(ca, "ca mesh \n");
    let node = std::fs::read_to_string(public.join("per-machine/node1/nebula-cert-mesh/node.crt"))
        .expect("node cert");
    assert_eq!(node, "sign node1 10.87.0.10/16\n");
    assert!(secret.join("per-machine/node1/nebula-cert-mesh/node.key").is_file());
    assert!(!public.join("per-machine/node1/nebula-cert-mesh/node.key").exists());

    let again = Executor::new(
        CommandRunner::new(),
        Arc::new(FsVarStore::new(store_dir.path())),
        options(),
    )
    .expect("executor");
    let report = again.execute(&graph).await.expect("re-execute");
    assert!(report.is_success());
    assert!(report.generators.values().all(|g| !g.ran));
}
