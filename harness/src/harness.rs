//! Per-test harness: temp root, node factory, cleanup.
//!
//! A [`Harness`] owns one directory under the system temp area. Every node it
//! creates lives in a numbered subdirectory, so concurrent tests never share
//! state. Dropping the harness runs registered cleanups, terminates every
//! daemon it started and then removes the directory, whether the test passed,
//! failed or panicked.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::{HarnessConfig, ENV_IPFS_PATH};
use crate::error::Result;
use crate::logging;
use crate::node::{Node, Timing};
use crate::nodes::Nodes;
use crate::runner::{RunRequest, RunResult, Runner};
use crate::wait::poll_until;

type Cleanup = Box<dyn FnOnce() -> Result<()> + Send>;

/// Root object of a test.
pub struct Harness {
    id: String,
    config: HarnessConfig,
    runner: Runner,
    deadline: Option<Instant>,
    nodes: Mutex<Vec<Arc<Node>>>,
    cleanups: Mutex<Vec<Cleanup>>,
    // Dropped last so daemons are gone before their directories.
    temp_dir: TempDir,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("id", &self.id)
            .field("dir", &self.temp_dir.path())
            .field("ipfs_bin", &self.config.ipfs_bin)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Harness configured from the environment (see [`HarnessConfig::from_env`]).
    pub fn new() -> Result<Self> {
        Self::with_config(HarnessConfig::from_env())
    }

    /// Harness with an explicit configuration.
    pub fn with_config(config: HarnessConfig) -> Result<Self> {
        logging::init();

        let temp_dir = tempfile::Builder::new().prefix("ipfs-harness-").tempdir()?;
        let id = uuid::Uuid::new_v4().as_simple().to_string()[..8].to_string();
        let runner = Runner::inherited(temp_dir.path())
            .with_envs(config.env.clone())
            .with_env(ENV_IPFS_PATH, temp_dir.path().to_string_lossy());
        let deadline = config.deadline.map(|d| Instant::now() + d);

        info!(harness = %id, dir = %temp_dir.path().display(), bin = %config.ipfs_bin.display(), "harness created");
        Ok(Self {
            id,
            config,
            runner,
            deadline,
            nodes: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            temp_dir,
        })
    }

    /// Short unique identifier, attached to log lines.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Temp root of this test.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Effective configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runner rooted at the temp dir, with `IPFS_PATH` set to it.
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Forward a test-level line to the log, tagged with this harness.
    pub fn log(&self, msg: impl AsRef<str>) {
        info!(harness = %self.id, "{}", msg.as_ref());
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Create the next node. Its directory is `<root>/<id>`.
    pub fn new_node(&self) -> Result<Arc<Node>> {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let id = nodes.len();
        let timing = Timing {
            startup_timeout: self.config.startup_timeout,
            poll_interval: self.config.poll_interval,
            deadline: self.deadline,
        };
        let node = Arc::new(Node::new(
            id,
            self.dir().join(id.to_string()),
            self.config.ipfs_bin.clone(),
            &self.runner,
            timing,
        )?);
        nodes.push(node.clone());
        Ok(node)
    }

    /// Create `n` nodes.
    pub fn new_nodes(&self, n: usize) -> Result<Nodes> {
        (0..n).map(|_| self.new_node()).collect::<Result<Vec<_>>>().map(Nodes::from)
    }

    /// Every node created so far, in creation order.
    pub fn nodes(&self) -> Nodes {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner()).clone().into()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Run the binary against the harness root; must exit 0.
    pub async fn ipfs(&self, args: &[&str]) -> Result<RunResult> {
        self.runner
            .must_run(RunRequest::new(&self.config.ipfs_bin, args.iter().copied()))
            .await
    }

    /// Run the binary against the harness root; failures land in the result.
    pub async fn run_ipfs(&self, args: &[&str]) -> RunResult {
        self.runner
            .run(RunRequest::new(&self.config.ipfs_bin, args.iter().copied()))
            .await
    }

    /// Every command path the binary reports through `ipfs commands`.
    pub async fn ipfs_commands(&self) -> Result<Vec<String>> {
        let res = self.ipfs(&["commands"]).await?;
        Ok(res
            .stdout
            .lines()
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Run a shell snippet in the harness root.
    pub async fn sh(&self, script: &str) -> RunResult {
        self.runner.run(RunRequest::new("sh", ["-c", script])).await
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Write `content` at `rel` under the root, creating parents.
    pub async fn write_file(&self, rel: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.dir().join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Write `content` to a freshly named file under the root.
    pub async fn write_to_temp(&self, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let name = format!("temp-{}", uuid::Uuid::new_v4().as_simple());
        self.write_file(name, content).await
    }

    // ========================================================================
    // Synchronisation and teardown
    // ========================================================================

    /// Poll `pred` at the configured interval until it holds, bounded by
    /// `timeout` and the harness deadline.
    pub async fn eventually<F, Fut>(&self, what: &str, timeout: Duration, pred: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        self.eventually_every(what, timeout, self.config.poll_interval, pred)
            .await
    }

    /// [`Self::eventually`] with an explicit poll interval.
    pub async fn eventually_every<F, Fut>(
        &self,
        what: &str,
        timeout: Duration,
        interval: Duration,
        mut pred: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        poll_until(what, timeout, interval, self.deadline, || {
            let fut = pred();
            async move { Ok(fut.await) }
        })
        .await
    }

    /// Run `f` at teardown, before daemons are terminated. Cleanups run in
    /// reverse registration order; failures are logged.
    pub fn register_cleanup<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.cleanups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(f));
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let cleanups = std::mem::take(self.cleanups.get_mut().unwrap_or_else(|e| e.into_inner()));
        for (i, cleanup) in cleanups.into_iter().enumerate().rev() {
            match catch_unwind(AssertUnwindSafe(cleanup)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(harness = %self.id, cleanup = i, error = %e, "cleanup failed"),
                Err(_) => warn!(harness = %self.id, cleanup = i, "cleanup panicked"),
            }
        }

        let nodes = std::mem::take(self.nodes.get_mut().unwrap_or_else(|e| e.into_inner()));
        for node in &nodes {
            node.kill_daemon_blocking();
        }
        debug!(harness = %self.id, nodes = nodes.len(), "harness torn down");
    }
}
