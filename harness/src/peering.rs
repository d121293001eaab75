//! Static peering topologies.
//!
//! Peer identities exist after `init` and swarm ports are allocated up front,
//! so a whole topology is written into the configs before any daemon starts.
//! Nothing here waits for connections to form; callers assert that with
//! `eventually`.

use std::collections::BTreeSet;

use crate::error::{HarnessError, Result};
use crate::harness::Harness;
use crate::nodes::Nodes;

/// Directed intent: node `from` keeps a connection to node `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeeringEdge {
    /// Index of the node that dials.
    pub from: usize,
    /// Index of the node it peers with.
    pub to: usize,
}

impl PeeringEdge {
    /// Edge `from -> to`.
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// Both directions between `a` and `b`.
    pub fn mutual(a: usize, b: usize) -> [Self; 2] {
        [Self::new(a, b), Self::new(b, a)]
    }
}

/// Outgoing peers per node, deduplicated and sorted, after validating every edge.
pub fn plan_peers(n: usize, edges: &[PeeringEdge]) -> Result<Vec<Vec<usize>>> {
    let mut plan = vec![BTreeSet::new(); n];
    for edge in edges {
        if edge.from >= n || edge.to >= n {
            return Err(HarnessError::InvalidTopology(format!(
                "edge {} -> {} is outside a group of {n} nodes",
                edge.from, edge.to
            )));
        }
        if edge.from == edge.to {
            return Err(HarnessError::InvalidTopology(format!(
                "node {} cannot peer with itself",
                edge.from
            )));
        }
        plan[edge.from].insert(edge.to);
    }
    Ok(plan.into_iter().map(|peers| peers.into_iter().collect()).collect())
}

/// Create and initialise `n` nodes with routing disabled and the given static peerings.
///
/// Daemons are not started.
pub async fn create_peer_nodes(h: &Harness, n: usize, edges: &[PeeringEdge]) -> Result<Nodes> {
    let plan = plan_peers(n, edges)?;
    let nodes = h.new_nodes(n)?;
    nodes.init(&[]).await?;

    for node in &nodes {
        let swarm = node.swarm_addr().to_string();
        node.update_config(move |cfg| {
            cfg.set("Routing.Type", "none")?;
            cfg.set("Addresses.Swarm", [swarm])
        })
        .await?;
    }

    for (from, peers) in plan.iter().enumerate() {
        for &to in peers {
            nodes[from].peer_with(&nodes[to]).await?;
        }
    }

    tracing::debug!(nodes = n, edges = edges.len(), "peering topology written");
    Ok(nodes)
}
