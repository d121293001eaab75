//! A single node: one data directory, at most one daemon.
//!
//! Step methods return `Result<&Self>` so tests can chain them:
//!
//! ```rust,ignore
//! node.init(&[]).await?.start_daemon(&["--offline"]).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, OnceLock};
use std::time::{Duration, Instant};

use multiaddr::Multiaddr;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::Buffer;
use crate::config::{API_FILE, CONFIG_FILE, ENV_IPFS_PATH, GATEWAY_FILE, RESOURCE_OVERRIDES_FILE};
use crate::error::{ConfigError, HarnessError, Result};
use crate::http_client::HttpClient;
use crate::node_config::NodeConfig;
use crate::peer::{parse_multiaddr, peer_id_of, with_peer_id, without_peer_id, ApiAddr, PeerId};
use crate::ports::{loopback_tcp_addr, new_rand_port};
use crate::process::ProcessHandle;
use crate::runner::{CmdOpt, RunRequest, RunResult, Runner};
use crate::wait::{poll_until, read_trimmed, wait_for_file};

/// Listen address for the daemon's own RPC and gateway listeners.
const EPHEMERAL_LOOPBACK: &str = "/ip4/127.0.0.1/tcp/0";

/// How long address lookups wait for the daemon to report listeners.
const SWARM_ADDRS_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing knobs shared by every node of a harness.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub deadline: Option<Instant>,
}

/// One instance of the daemon under test.
pub struct Node {
    id: usize,
    dir: PathBuf,
    ipfs_bin: PathBuf,
    runner: Runner,
    swarm_addr: String,
    enable_mdns: AtomicBool,
    timing: Timing,
    daemon: Mutex<Option<ProcessHandle>>,
    daemon_output: StdMutex<Option<(Buffer, Buffer)>>,
    peer_id: OnceLock<PeerId>,
    config_lock: Mutex<()>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("dir", &self.dir)
            .field("swarm_addr", &self.swarm_addr)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create a node at `dir`, allocating its swarm port.
    pub(crate) fn new(
        id: usize,
        dir: PathBuf,
        ipfs_bin: PathBuf,
        runner: &Runner,
        timing: Timing,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let swarm_addr = loopback_tcp_addr(new_rand_port()?);
        let runner = Runner::new(runner.env().clone(), &dir)
            .with_env(ENV_IPFS_PATH, dir.to_string_lossy());

        debug!(node = id, dir = %dir.display(), swarm = %swarm_addr, "node created");
        Ok(Self {
            id,
            dir,
            ipfs_bin,
            runner,
            swarm_addr,
            enable_mdns: AtomicBool::new(false),
            timing,
            daemon: Mutex::new(None),
            daemon_output: StdMutex::new(None),
            peer_id: OnceLock::new(),
            config_lock: Mutex::new(()),
        })
    }

    /// Creation-order index within the harness.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Data directory (`IPFS_PATH`).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Binary under test.
    pub fn ipfs_bin(&self) -> &Path {
        &self.ipfs_bin
    }

    /// Runner with `IPFS_PATH` pointing at this node.
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Bound on daemon readiness and other harness-level waits.
    pub fn startup_timeout(&self) -> Duration {
        self.timing.startup_timeout
    }

    /// Pre-allocated swarm listen address.
    pub fn swarm_addr(&self) -> &str {
        &self.swarm_addr
    }

    /// Whether `init` leaves mDNS discovery on. Off unless enabled.
    pub fn enable_mdns(&self) -> bool {
        self.enable_mdns.load(Ordering::Relaxed)
    }

    /// Choose mDNS discovery for the next `init`.
    pub fn set_enable_mdns(&self, enabled: bool) -> &Self {
        self.enable_mdns.store(enabled, Ordering::Relaxed);
        self
    }

    fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.dir.join(name)
        }
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Write `bytes` to `name` under the node directory.
    pub async fn write_bytes(&self, name: impl AsRef<Path>, bytes: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read a file; relative names resolve under the node directory.
    pub async fn read_file(&self, name: impl AsRef<Path>) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.path(name)).await?)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Path of the JSON config file.
    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Parse the config file.
    pub async fn read_config(&self) -> Result<NodeConfig> {
        Ok(NodeConfig::load(&self.config_file()).await?)
    }

    /// Replace the config file.
    pub async fn write_config(&self, config: &NodeConfig) -> Result<()> {
        let _guard = self.config_lock.lock().await;
        Ok(config.save(&self.config_file()).await?)
    }

    /// Read, mutate, and write the config as one step.
    pub async fn update_config<F>(&self, mutate: F) -> Result<&Self>
    where
        F: FnOnce(&mut NodeConfig) -> std::result::Result<(), ConfigError>,
    {
        let _guard = self.config_lock.lock().await;
        let path = self.config_file();
        let mut config = NodeConfig::load(&path).await?;
        mutate(&mut config)?;
        config.save(&path).await?;
        Ok(self)
    }

    /// Path of the user-supplied resource manager overrides.
    pub fn resource_overrides_file(&self) -> PathBuf {
        self.dir.join(RESOURCE_OVERRIDES_FILE)
    }

    /// Parse the resource manager overrides. A missing file reads as `{}`.
    pub async fn read_resource_overrides(&self) -> Result<NodeConfig> {
        let path = self.resource_overrides_file();
        match NodeConfig::load(&path).await {
            Ok(overrides) => Ok(overrides),
            Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(NodeConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the resource manager overrides.
    pub async fn write_resource_overrides(&self, overrides: &NodeConfig) -> Result<()> {
        let _guard = self.config_lock.lock().await;
        Ok(overrides.save(&self.resource_overrides_file()).await?)
    }

    /// Read, mutate, and write the resource manager overrides as one step.
    pub async fn update_resource_overrides<F>(&self, mutate: F) -> Result<&Self>
    where
        F: FnOnce(&mut NodeConfig) -> std::result::Result<(), ConfigError>,
    {
        let mut overrides = self.read_resource_overrides().await?;
        mutate(&mut overrides)?;
        self.write_resource_overrides(&overrides).await?;
        Ok(self)
    }

    /// Set a dotted config key through `ipfs config --json`.
    pub async fn set_ipfs_config<T: Serialize>(&self, key: &str, value: T) -> Result<&Self> {
        let json = serde_json::to_string(&value).map_err(ConfigError::from)?;
        self.ipfs(&["config", "--json", key, &json]).await?;
        Ok(self)
    }

    /// Read a dotted config key through `ipfs config`.
    ///
    /// JSON output is parsed; anything else comes back as a string.
    pub async fn get_ipfs_config(&self, key: &str) -> Result<Value> {
        let res = self.ipfs(&["config", key]).await?;
        let text = res.stdout.trimmed();
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    // ========================================================================
    // CLI
    // ========================================================================

    fn request(&self, args: &[&str]) -> RunRequest {
        RunRequest::new(&self.ipfs_bin, args.iter().copied())
    }

    /// Run the binary; the result may be a failure.
    pub async fn run_ipfs(&self, args: &[&str]) -> RunResult {
        self.runner.run(self.request(args)).await
    }

    /// Run the binary with extra options; the result may be a failure.
    pub async fn run_ipfs_with(&self, args: &[&str], opts: Vec<CmdOpt>) -> RunResult {
        let mut req = self.request(args);
        req.opts = opts;
        self.runner.run(req).await
    }

    /// Run the binary; non-zero exit is an error.
    pub async fn ipfs(&self, args: &[&str]) -> Result<RunResult> {
        self.runner.must_run(self.request(args)).await
    }

    /// Run the binary with extra options; non-zero exit is an error.
    pub async fn ipfs_with(&self, args: &[&str], opts: Vec<CmdOpt>) -> Result<RunResult> {
        let mut req = self.request(args);
        req.opts = opts;
        self.runner.must_run(req).await
    }

    /// Pipe `input` to the binary; non-zero exit is an error.
    pub async fn pipe_str_to_ipfs(&self, input: &str, args: &[&str]) -> Result<RunResult> {
        self.ipfs_with(args, vec![CmdOpt::Stdin(input.as_bytes().to_vec())]).await
    }

    /// Stream `reader` to the binary; non-zero exit is an error.
    pub async fn pipe_to_ipfs<R>(&self, reader: R, args: &[&str]) -> Result<RunResult>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.ipfs_with(args, vec![CmdOpt::StdinReader(Box::new(reader))]).await
    }

    /// Stream `reader` to the binary; the result may be a failure.
    pub async fn run_pipe_to_ipfs<R>(&self, reader: R, args: &[&str]) -> RunResult
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.run_ipfs_with(args, vec![CmdOpt::StdinReader(Box::new(reader))]).await
    }

    /// `ipfs add -q` of a string; returns the CID.
    pub async fn ipfs_add_str(&self, content: &str, extra_args: &[&str]) -> Result<String> {
        self.ipfs_add_reader(std::io::Cursor::new(content.as_bytes().to_vec()), extra_args)
            .await
    }

    /// `ipfs add -q` of a stream; returns the CID.
    pub async fn ipfs_add_reader<R>(&self, reader: R, extra_args: &[&str]) -> Result<String>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut args = vec!["add", "-q"];
        args.extend_from_slice(extra_args);
        let res = self.pipe_to_ipfs(reader, &args).await?;
        Ok(res.stdout.trimmed())
    }

    /// Import a CAR stream and check `root_cid` is then stored locally.
    ///
    /// `extra_args` follow `--pin-roots=false`.
    pub async fn ipfs_dag_import<R>(&self, reader: R, root_cid: &str, extra_args: &[&str]) -> Result<&Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut args = vec!["dag", "import", "--pin-roots=false"];
        args.extend_from_slice(extra_args);
        self.pipe_to_ipfs(reader, &args).await?;
        self.ipfs(&["block", "stat", "--offline", root_cid]).await?;
        Ok(self)
    }

    /// Export `cid` as a CAR file at `path`.
    pub async fn ipfs_dag_export(&self, cid: &str, path: impl AsRef<Path>) -> Result<&Self> {
        let res = self.ipfs(&["dag", "export", cid]).await?;
        tokio::fs::write(self.path(path), res.stdout.bytes()).await?;
        Ok(self)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// `ipfs init`, then make the config hermetic: no bootstrap peers, the
    /// pre-allocated swarm address, ephemeral API and gateway ports, no NAT
    /// port mapping, and mDNS as chosen by [`Self::set_enable_mdns`].
    pub async fn init(&self, args: &[&str]) -> Result<&Self> {
        let mut init_args = vec!["init"];
        init_args.extend_from_slice(args);
        let res = self.run_ipfs(&init_args).await;
        self.runner.assert_no_error(&res).map_err(|e| HarnessError::Init {
            node: self.id,
            detail: e.to_string(),
        })?;

        let swarm = self.swarm_addr.clone();
        let mdns = self.enable_mdns();
        self.update_config(move |cfg| {
            cfg.set("Bootstrap", Vec::<String>::new())?;
            cfg.set("Addresses.Swarm", [swarm])?;
            cfg.set("Addresses.API", [EPHEMERAL_LOOPBACK])?;
            cfg.set("Addresses.Gateway", [EPHEMERAL_LOOPBACK])?;
            cfg.set("Swarm.DisableNatPortMap", true)?;
            cfg.set("Discovery.MDNS.Enabled", mdns)?;
            cfg.set("Routing.LoopbackAddressesOnLanDHT", true)?;
            Ok(())
        })
        .await
        .map_err(|e| HarnessError::Init {
            node: self.id,
            detail: e.to_string(),
        })?;

        info!(node = self.id, "initialised");
        Ok(self)
    }

    /// Start the daemon with extra args and wait until its RPC answers.
    pub async fn start_daemon(&self, args: &[&str]) -> Result<&Self> {
        self.start_daemon_with(RunRequest::new(&self.ipfs_bin, args.iter().copied()), None)
            .await
    }

    /// Like [`Self::start_daemon`], probing readiness with an `Authorization` header.
    pub async fn start_daemon_with_authorization(
        &self,
        authorization: &str,
        args: &[&str],
    ) -> Result<&Self> {
        self.start_daemon_with(
            RunRequest::new(&self.ipfs_bin, args.iter().copied()),
            Some(authorization),
        )
        .await
    }

    /// Start `daemon <req.args>` with `req.opts`, then wait for readiness.
    ///
    /// `req.path` and `req.mode` are ignored. If the daemon does not become
    /// ready it is stopped before the error is returned.
    pub async fn start_daemon_with(
        &self,
        req: RunRequest,
        authorization: Option<&str>,
    ) -> Result<&Self> {
        let mut slot = self.daemon.lock().await;
        let handle = self.spawn_daemon_locked(&mut slot, req).await?;

        let ready = self.wait_on_api(handle, authorization).await;
        if let Err(e) = ready {
            if let Some(handle) = slot.take() {
                if let Err(stop_err) = handle.stop().await {
                    warn!(node = self.id, error = %stop_err, "failed to stop daemon after failed start");
                }
            }
            return Err(e);
        }

        info!(node = self.id, "daemon ready");
        Ok(self)
    }

    /// Start the daemon without waiting for readiness.
    pub async fn spawn_daemon(&self, args: &[&str]) -> Result<&Self> {
        self.spawn_daemon_with(RunRequest::new(&self.ipfs_bin, args.iter().copied()))
            .await
    }

    /// Start `daemon <req.args>` with `req.opts`, without waiting for readiness.
    pub async fn spawn_daemon_with(&self, req: RunRequest) -> Result<&Self> {
        let mut slot = self.daemon.lock().await;
        self.spawn_daemon_locked(&mut slot, req).await?;
        Ok(self)
    }

    async fn spawn_daemon_locked<'a>(
        &self,
        slot: &'a mut Option<ProcessHandle>,
        req: RunRequest,
    ) -> Result<&'a ProcessHandle> {
        if let Some(existing) = slot.as_ref() {
            if existing.is_alive().await {
                return Err(HarnessError::AlreadyRunning { node: self.id });
            }
        }
        *slot = None;

        // A stale readiness file from a killed daemon would end the wait early.
        for name in [API_FILE, GATEWAY_FILE] {
            match tokio::fs::remove_file(self.dir.join(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut args = vec!["daemon".to_string()];
        args.extend(req.args);
        let daemon_req = RunRequest {
            path: self.ipfs_bin.clone(),
            args,
            opts: req.opts,
            mode: crate::runner::RunMode::Start,
        };

        debug!(node = self.id, "starting daemon");
        let mut res = self.runner.must_run(daemon_req).await?;
        let handle = res.take_process().ok_or(HarnessError::NotRunning { node: self.id })?;
        *self
            .daemon_output
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some((res.stdout.clone(), res.stderr.clone()));
        Ok(slot.insert(handle))
    }

    /// Poll until the `api` file appears and `POST /api/v0/id` answers with
    /// this node's identity.
    async fn wait_on_api(&self, handle: &ProcessHandle, authorization: Option<&str>) -> Result<()> {
        let expected = self.peer_id().await?;
        let what = format!("node {} API to come online", self.id);
        poll_until(
            &what,
            self.timing.startup_timeout,
            self.timing.poll_interval,
            self.timing.deadline,
            || {
                let expected = &expected;
                async move {
                    if !handle.is_alive().await {
                        let status = handle.wait().await.ok();
                        return Err(HarnessError::DaemonExited {
                            node: self.id,
                            exit_code: status.and_then(|s| s.code()),
                            stderr: handle.stderr().trimmed(),
                        });
                    }
                    self.check_api(expected, authorization).await
                }
            },
        )
        .await
    }

    async fn check_api(&self, expected: &PeerId, authorization: Option<&str>) -> Result<bool> {
        let addr = match self.try_api_addr().await {
            Ok(addr) => addr,
            Err(e) => {
                debug!(node = self.id, error = %e, "api addr not available yet");
                return Ok(false);
            }
        };

        let mut client = self.client_for(&addr)?;
        if let Some(auth) = authorization {
            client = client.with_authorization(auth);
        }
        let resp = match client.api_post("id", &[]).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(node = self.id, error = %e, "api check failed");
                return Ok(false);
            }
        };
        if resp.status != 200 {
            debug!(node = self.id, status = resp.status, "api check not ready");
            return Ok(false);
        }

        let reported = match resp.json::<Value>() {
            Ok(body) => body.get("ID").and_then(Value::as_str).map(str::to_string),
            Err(_) => None,
        };
        match reported {
            Some(id) if id == expected.as_str() => Ok(true),
            Some(got) => Err(HarnessError::IdentityMismatch {
                node: self.id,
                expected: expected.to_string(),
                got,
            }),
            None => Ok(false),
        }
    }

    /// Stop the daemon (SIGTERM, then escalate) and reap it. No-op if not running.
    pub async fn stop_daemon(&self) -> Result<&Self> {
        let handle = self.daemon.lock().await.take();
        match handle {
            Some(handle) => {
                debug!(node = self.id, "stopping daemon");
                let status = handle.stop().await?;
                info!(node = self.id, status = %status, "daemon stopped");
            }
            None => debug!(node = self.id, "stop_daemon: no daemon running"),
        }
        Ok(self)
    }

    /// Returns true while a daemon process is running.
    pub async fn is_alive(&self) -> bool {
        match self.daemon.lock().await.as_ref() {
            Some(handle) => handle.is_alive().await,
            None => false,
        }
    }

    /// OS pid of the current daemon, if one was started.
    pub async fn daemon_pid(&self) -> Option<u32> {
        self.daemon.lock().await.as_ref().and_then(ProcessHandle::pid)
    }

    /// Stdout and stderr of the most recent daemon.
    pub fn daemon_output(&self) -> Result<(Buffer, Buffer)> {
        self.daemon_output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(HarnessError::NotRunning { node: self.id })
    }

    /// Terminate the daemon synchronously, for teardown paths.
    pub(crate) fn kill_daemon_blocking(&self) {
        match self.daemon.try_lock() {
            Ok(mut slot) => {
                if let Some(handle) = slot.take() {
                    debug!(node = self.id, "terminating daemon at teardown");
                    drop(handle);
                }
            }
            Err(_) => warn!(node = self.id, "daemon slot busy at teardown"),
        }
    }

    // ========================================================================
    // Identity and endpoints
    // ========================================================================

    /// Peer identity from `Identity.PeerID`, cached after the first read.
    pub async fn peer_id(&self) -> Result<PeerId> {
        if let Some(id) = self.peer_id.get() {
            return Ok(id.clone());
        }
        let config = self.read_config().await?;
        let id = config
            .get_str("Identity.PeerID")
            .map(PeerId::new)
            .ok_or_else(|| HarnessError::Init {
                node: self.id,
                detail: "config has no Identity.PeerID".to_string(),
            })?;
        Ok(self.peer_id.get_or_init(|| id).clone())
    }

    /// Parse the `api` file without waiting.
    pub async fn try_api_addr(&self) -> Result<ApiAddr> {
        let path = self.dir.join(API_FILE);
        match read_trimmed(&path).await? {
            Some(text) => text.parse(),
            None => Err(HarnessError::NotRunning { node: self.id }),
        }
    }

    /// Wait for the `api` file and parse it.
    pub async fn api_addr(&self) -> Result<ApiAddr> {
        let text = wait_for_file(
            &self.dir.join(API_FILE),
            self.timing.startup_timeout,
            self.timing.poll_interval,
            self.timing.deadline,
        )
        .await?;
        text.parse()
    }

    /// Base URL of the RPC API.
    pub async fn api_url(&self) -> Result<String> {
        Ok(self.api_addr().await?.base_url())
    }

    /// Wait for the `gateway` file and return the URL it holds.
    pub async fn gateway_url(&self) -> Result<String> {
        wait_for_file(
            &self.dir.join(GATEWAY_FILE),
            self.timing.startup_timeout,
            self.timing.poll_interval,
            self.timing.deadline,
        )
        .await
    }

    fn client_for(&self, addr: &ApiAddr) -> Result<HttpClient> {
        match addr {
            #[cfg(unix)]
            ApiAddr::Unix(path) => Ok(HttpClient::from_transport(
                addr.base_url(),
                std::sync::Arc::new(crate::transport::UnixSocketTransport::new(path)),
            )),
            #[cfg(not(unix))]
            ApiAddr::Unix(path) => Err(HarnessError::Multiaddr {
                addr: addr.to_string(),
                reason: format!("unix sockets unsupported on this platform: {}", path.display()),
            }),
            ApiAddr::Tcp { .. } => HttpClient::new(addr.base_url()),
        }
    }

    /// HTTP client for the RPC API.
    pub async fn api_client(&self) -> Result<HttpClient> {
        let addr = self.api_addr().await?;
        self.client_for(&addr)
    }

    /// HTTP client for the gateway.
    pub async fn gateway_client(&self) -> Result<HttpClient> {
        HttpClient::new(self.gateway_url().await?)
    }

    // ========================================================================
    // Swarm
    // ========================================================================

    fn parse_lines(&self, res: &RunResult) -> Result<Vec<Multiaddr>> {
        res.stdout.lines().iter().map(|line| parse_multiaddr(line)).collect()
    }

    /// Addresses the running daemon listens on (`swarm addrs local`).
    pub async fn swarm_addrs(&self) -> Result<Vec<Multiaddr>> {
        let res = self.ipfs(&["swarm", "addrs", "local"]).await?;
        self.parse_lines(&res)
    }

    /// Poll [`Self::swarm_addrs`] until it is non-empty. Gives back an empty
    /// list if `timeout` passes first.
    pub async fn swarm_addrs_with_timeout(&self, timeout: Duration) -> Result<Vec<Multiaddr>> {
        let found = StdMutex::new(Vec::new());
        let what = format!("node {} swarm addresses", self.id);
        let polled = poll_until(&what, timeout, self.timing.poll_interval, self.timing.deadline, || {
            let found = &found;
            async move {
                let addrs = self.swarm_addrs().await?;
                let ready = !addrs.is_empty();
                *found.lock().unwrap_or_else(|e| e.into_inner()) = addrs;
                Ok(ready)
            }
        })
        .await;
        match polled {
            Ok(()) => Ok(found.into_inner().unwrap_or_else(|e| e.into_inner())),
            Err(HarnessError::ReadinessTimeout { .. }) => {
                debug!(node = self.id, ?timeout, "no swarm addresses reported");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// [`Self::swarm_addrs`] with `/p2p/<id>` appended where missing.
    pub async fn swarm_addrs_with_peer_id(&self) -> Result<Vec<Multiaddr>> {
        let id = self.peer_id().await?;
        self.swarm_addrs_with_timeout(SWARM_ADDRS_TIMEOUT)
            .await?
            .iter()
            .map(|addr| match peer_id_of(addr) {
                Some(_) => Ok(addr.clone()),
                None => with_peer_id(addr, &id),
            })
            .collect()
    }

    /// [`Self::swarm_addrs`] with `/p2p/<id>` stripped; addresses left empty are dropped.
    pub async fn swarm_addrs_without_peer_ids(&self) -> Result<Vec<Multiaddr>> {
        Ok(self
            .swarm_addrs()
            .await?
            .iter()
            .map(without_peer_id)
            .filter(|addr| !addr.is_empty())
            .collect())
    }

    /// `swarm connect` to the first address of `other`.
    pub async fn connect(&self, other: &Node) -> Result<&Self> {
        let addrs = other.swarm_addrs_with_peer_id().await?;
        let target = addrs.first().ok_or_else(|| HarnessError::Multiaddr {
            addr: String::new(),
            reason: format!("node {} reports no swarm addresses", other.id),
        })?;
        debug!(node = self.id, other = other.id, addr = %target, "swarm connect");
        self.ipfs(&["swarm", "connect", &target.to_string()]).await?;
        Ok(self)
    }

    /// Connect, then wait until `other` shows up in this node's peers.
    pub async fn connect_and_wait(&self, other: &Node, timeout: Duration) -> Result<&Self> {
        self.connect(other).await?;
        self.wait_for_peer(other, timeout).await
    }

    /// Wait until `other` shows up in this node's peers.
    pub async fn wait_for_peer(&self, other: &Node, timeout: Duration) -> Result<&Self> {
        let other_id = other.peer_id().await?;
        let what = format!("node {} to see node {} as a peer", self.id, other.id);
        poll_until(&what, timeout, self.timing.poll_interval, self.timing.deadline, || {
            let other_id = &other_id;
            async move { Ok(self.peer_ids().await?.contains(other_id)) }
        })
        .await?;
        Ok(self)
    }

    /// `swarm disconnect /p2p/<other>`.
    pub async fn disconnect(&self, other: &Node) -> Result<&Self> {
        let target = format!("/p2p/{}", other.peer_id().await?);
        self.ipfs(&["swarm", "disconnect", &target]).await?;
        Ok(self)
    }

    /// Connected peers (`swarm peers`).
    pub async fn peers(&self) -> Result<Vec<Multiaddr>> {
        let res = self.ipfs(&["swarm", "peers"]).await?;
        self.parse_lines(&res)
    }

    /// Identities of connected peers.
    pub async fn peer_ids(&self) -> Result<Vec<PeerId>> {
        Ok(self.peers().await?.iter().filter_map(peer_id_of).collect())
    }

    /// Add `other` to this node's `Peering.Peers` with its configured swarm addresses.
    pub async fn peer_with(&self, other: &Node) -> Result<&Self> {
        let other_config = other.read_config().await?;
        let addrs = match other_config.get("Addresses.Swarm")? {
            Some(Value::Array(addrs)) => addrs.clone(),
            Some(Value::String(addr)) => vec![Value::String(addr.clone())],
            _ => Vec::new(),
        };
        let entry = serde_json::json!({
            "ID": other.peer_id().await?.to_string(),
            "Addrs": addrs,
        });
        debug!(node = self.id, other = other.id, "peering");
        self.update_config(move |cfg| cfg.push("Peering.Peers", entry)).await
    }
}
