//! Ordered node groups with parallel fan-out.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::node::Node;

/// An ordered group of nodes. Index `i` is stable for the group's lifetime.
#[derive(Debug, Clone, Default)]
pub struct Nodes(Vec<Arc<Node>>);

impl Deref for Nodes {
    type Target = [Arc<Node>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Arc<Node>>> for Nodes {
    fn from(nodes: Vec<Arc<Node>>) -> Self {
        Self(nodes)
    }
}

impl FromIterator<Arc<Node>> for Nodes {
    fn from_iter<I: IntoIterator<Item = Arc<Node>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Nodes {
    type Item = Arc<Node>;
    type IntoIter = std::vec::IntoIter<Arc<Node>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Nodes {
    type Item = &'a Arc<Node>;
    type IntoIter = std::slice::Iter<'a, Arc<Node>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn owned_args(args: &[&str]) -> Arc<Vec<String>> {
    Arc::new(args.iter().map(|a| a.to_string()).collect())
}

impl Nodes {
    /// Run `f` on every node concurrently and wait for all of them.
    ///
    /// Every member runs to completion even if others fail. All errors are
    /// returned together as [`HarnessError::Parallel`]; a panic in any task is
    /// re-raised after the barrier.
    pub async fn for_each_par<F, Fut>(&self, f: F) -> Result<()>
    where
        F: Fn(Arc<Node>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let tasks: Vec<_> = self
            .0
            .iter()
            .map(|node| tokio::spawn(f(node.clone())))
            .collect();

        let mut errors = Vec::new();
        let mut panic = None;
        for (index, outcome) in join_all(tasks).await.into_iter().enumerate() {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(join_err) if join_err.is_panic() => {
                    debug!(index, "fan-out task panicked");
                    if panic.is_none() {
                        panic = Some(join_err.into_panic());
                    }
                }
                Err(join_err) => errors.push(HarnessError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    format!("task for node index {index} cancelled: {join_err}"),
                ))),
            }
        }

        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Parallel(errors))
        }
    }

    /// `init` every node.
    pub async fn init(&self, args: &[&str]) -> Result<&Self> {
        let args = owned_args(args);
        self.for_each_par(move |node| {
            let args = args.clone();
            async move {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                node.init(&args).await.map(|_| ())
            }
        })
        .await?;
        Ok(self)
    }

    /// Start every daemon and wait for each to be ready.
    pub async fn start_daemons(&self, args: &[&str]) -> Result<&Self> {
        let args = owned_args(args);
        self.for_each_par(move |node| {
            let args = args.clone();
            async move {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                node.start_daemon(&args).await.map(|_| ())
            }
        })
        .await?;
        Ok(self)
    }

    /// Stop every daemon.
    pub async fn stop_daemons(&self) -> Result<&Self> {
        self.for_each_par(|node| async move { node.stop_daemon().await.map(|_| ()) })
            .await?;
        Ok(self)
    }

    /// Connect every unordered pair once, then wait until each node sees all others.
    pub async fn connect(&self) -> Result<&Self> {
        for (i, node) in self.0.iter().enumerate() {
            for other in &self.0[i + 1..] {
                node.connect(other).await?;
            }
        }

        let all = Arc::new(self.0.clone());
        self.for_each_par(move |node| {
            let all = all.clone();
            async move {
                for other in all.iter().filter(|o| o.id() != node.id()) {
                    node.wait_for_peer(other, node.startup_timeout()).await?;
                }
                Ok(())
            }
        })
        .await?;
        Ok(self)
    }
}
