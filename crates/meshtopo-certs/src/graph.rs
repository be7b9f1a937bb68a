//! Certificate dependency graph using `petgraph`.
//!
//! Every instance gets exactly one shared CA generator at the root and one
//! certificate generator per configured machine as leaves. Edges point from
//! the CA to its dependents so topological order yields the CA first.

use std::net::Ipv4Addr;

use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_common::types::{InstanceName, MachineName};
use meshtopo_topology::resolver::ResolvedInstance;
use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::generator::{self, GeneratorId, GeneratorSpec};

/// The two-level generator DAG of one instance.
#[derive(Debug)]
pub struct CertGraph {
    instance: InstanceName,
    graph: petgraph::Graph<GeneratorSpec, ()>,
    ca: NodeIndex,
}

impl CertGraph {
    /// Builds the graph for an instance from its machines' overlay addresses.
    pub fn build(
        instance: &InstanceName,
        prefix_len: u8,
        machines: impl IntoIterator<Item = (MachineName, Ipv4Addr)>,
        tool: &str,
    ) -> Self {
        let mut graph = petgraph::Graph::new();
        let ca = graph.add_node(generator::ca_generator(instance, tool));
        for (machine, ip) in machines {
            let node = graph.add_node(generator::node_generator(
                instance, &machine, ip, prefix_len, tool,
            ));
            let _ = graph.add_edge(ca, node, ());
        }
        tracing::debug!(%instance, generators = graph.node_count(), "certificate graph built");
        Self {
            instance: instance.clone(),
            graph,
            ca,
        }
    }

    /// Builds the graph for a resolved instance.
    #[must_use]
    pub fn for_instance(resolved: &ResolvedInstance, tool: &str) -> Self {
        Self::build(
            &resolved.name,
            resolved.host_map.network_cidr.prefix_len(),
            resolved.addresses().map(|(m, ip)| (m.clone(), ip)),
            tool,
        )
    }

    /// Owning instance.
    #[must_use]
    pub const fn instance(&self) -> &InstanceName {
        &self.instance
    }

    /// The instance CA generator.
    #[must_use]
    pub fn ca(&self) -> &GeneratorSpec {
        &self.graph[self.ca]
    }

    /// The per-machine generators, in machine order.
    pub fn nodes(&self) -> impl Iterator<Item = &GeneratorSpec> {
        let mut leaves: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(self.ca, Direction::Outgoing)
            .collect();
        leaves.sort_unstable();
        leaves.into_iter().map(|idx| &self.graph[idx])
    }

    /// Every generator, CA first.
    pub fn specs(&self) -> impl Iterator<Item = &GeneratorSpec> {
        std::iter::once(self.ca()).chain(self.nodes())
    }

    /// Number of generators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Always `false`: the CA is present even without machines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns an execution order with every dependency before its dependents.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn resolve_order(&self) -> Result<Vec<GeneratorId>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|indices| indices.iter().map(|&idx| self.graph[idx].id.clone()).collect())
            .map_err(|_cycle| MeshtopoError::Config {
                message: "cyclic dependency detected in certificate graph".into(),
            })
    }

    /// Checks the shape: one shared root, leaves depending on it alone.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violation found.
    pub fn verify(&self) -> Result<()> {
        let violation = |message: String| MeshtopoError::Config { message };
        let ca = self.ca();
        if !ca.shared || !ca.dependencies.is_empty() {
            return Err(violation(format!("{} must be shared and have no dependencies", ca.id)));
        }
        if self.graph.neighbors_directed(self.ca, Direction::Incoming).count() != 0 {
            return Err(violation(format!("{} has incoming edges", ca.id)));
        }
        for idx in self.graph.node_indices().filter(|&idx| idx != self.ca) {
            let spec = &self.graph[idx];
            let parents: Vec<NodeIndex> =
                self.graph.neighbors_directed(idx, Direction::Incoming).collect();
            if parents != [self.ca] || spec.dependencies != [ca.id.clone()] {
                return Err(violation(format!("{} must depend on {} only", spec.id, ca.id)));
            }
            if self.graph.neighbors_directed(idx, Direction::Outgoing).count() != 0 {
                return Err(violation(format!("{} has dependents", spec.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machines() -> Vec<(MachineName, Ipv4Addr)> {
        vec![
            (MachineName::new("lighthouse1"), Ipv4Addr::new(10, 87, 0, 1)),
            (MachineName::new("node1"), Ipv4Addr::new(10, 87, 0, 10)),
            (MachineName::new("node2"), Ipv4Addr::new(10, 87, 0, 11)),
        ]
    }

    #[test]
    fn one_ca_regardless_of_machine_count() {
        let instance = InstanceName::new("mesh");
        for count in [0, 1, 3] {
            let graph = CertGraph::build(
                &instance,
                16,
                machines().into_iter().take(count),
                "nebula-cert",
            );
            assert_eq!(graph.len(), count + 1);
            assert_eq!(graph.specs().filter(|s| s.shared).count(), 1);
            graph.verify().expect("well formed");
        }
    }

    #[test]
    fn resolve_order_puts_ca_first() {
        let graph = CertGraph::build(&InstanceName::new("mesh"), 16, machines(), "nebula-cert");
        let order = graph.resolve_order().expect("acyclic");
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], graph.ca().id);
    }

    #[test]
    fn nodes_follow_machine_order() {
        let graph = CertGraph::build(&InstanceName::new("mesh"), 16, machines(), "nebula-cert");
        let names: Vec<String> = graph.nodes().map(|s| s.id.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "per-machine/lighthouse1/nebula-cert-mesh",
                "per-machine/node1/nebula-cert-mesh",
                "per-machine/node2/nebula-cert-mesh",
            ]
        );
    }

    #[test]
    fn every_node_depends_on_the_ca() {
        let graph = CertGraph::build(&InstanceName::new("mesh"), 16, machines(), "nebula-cert");
        let ca = graph.ca().id.clone();
        assert!(graph.nodes().all(|s| s.dependencies == vec![ca.clone()]));
    }
}
