//! N initialised, running nodes in one call.

use std::sync::Arc;

use crate::error::Result;
use crate::harness::Harness;
use crate::node::Node;
use crate::nodes::Nodes;

/// A group of running nodes together with the harness that owns them.
///
/// Fields drop in order: node handles first, then the harness, which reaps
/// the daemons and removes the temp root.
#[derive(Debug)]
pub struct Cluster {
    nodes: Nodes,
    harness: Harness,
}

impl Cluster {
    /// New harness from the environment, then `n` nodes initialised and started.
    pub async fn start(n: usize) -> Result<Self> {
        Self::with_harness(Harness::new()?, n).await
    }

    /// `n` nodes on an existing harness, initialised and started.
    pub async fn with_harness(harness: Harness, n: usize) -> Result<Self> {
        let nodes = harness.new_nodes(n)?;
        nodes.init(&[]).await?.start_daemons(&[]).await?;
        harness.log(format!("cluster of {n} nodes running"));
        Ok(Self { nodes, harness })
    }

    /// All members.
    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    /// Member `i`.
    pub fn node(&self, i: usize) -> Option<&Arc<Node>> {
        self.nodes.get(i)
    }

    /// The owning harness.
    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Stop every daemon. The harness stays alive until the cluster drops.
    pub async fn stop(&self) -> Result<()> {
        self.nodes.stop_daemons().await.map(|_| ())
    }
}
