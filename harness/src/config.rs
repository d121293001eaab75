//! Harness configuration.
//!
//! Defaults come from the environment so CI can point the suite at a freshly
//! built binary without code changes:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `IPFS_BIN` | Path to the daemon binary under test |
//! | `IPFS_HARNESS_STARTUP_TIMEOUT_SECS` | Bound on daemon readiness |
//! | `IPFS_HARNESS_DEADLINE_SECS` | Overall per-test deadline for poll loops |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the JSON config file inside a node's data directory.
pub const CONFIG_FILE: &str = "config";

/// Readiness file holding the RPC multiaddress.
pub const API_FILE: &str = "api";

/// Readiness file holding the gateway URL.
pub const GATEWAY_FILE: &str = "gateway";

/// User-supplied libp2p resource manager overrides, beside the config file.
pub const RESOURCE_OVERRIDES_FILE: &str = "libp2p-resource-limit-overrides.json";

/// Environment variable that points the binary at a node's data directory.
pub const ENV_IPFS_PATH: &str = "IPFS_PATH";

/// Environment variable overriding the binary path.
pub const ENV_IPFS_BIN: &str = "IPFS_BIN";

/// Default binary name looked up on `PATH`.
pub const DEFAULT_BIN_NAME: &str = "ipfs";

/// Local build output, relative to the working directory.
pub const LOCAL_BUILD_BIN: &str = "cmd/ipfs/ipfs";

/// Signals sent by `stop_daemon`, with how long to wait after each.
#[cfg(unix)]
pub const STOP_SCHEDULE: [(libc::c_int, Duration); 4] = [
    (libc::SIGTERM, Duration::from_secs(1)),
    (libc::SIGTERM, Duration::from_secs(2)),
    (libc::SIGQUIT, Duration::from_secs(5)),
    (libc::SIGKILL, Duration::from_secs(5)),
];

/// Grace period before destructor-level cleanup escalates to SIGKILL.
pub const DROP_GRACE: Duration = Duration::from_secs(2);

/// Root configuration for a [`crate::Harness`].
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Path to the daemon binary under test.
    pub ipfs_bin: PathBuf,
    /// Extra environment applied to every process (after the inherited env).
    pub env: BTreeMap<String, String>,
    /// Bound on daemon readiness after `start_daemon`.
    pub startup_timeout: Duration,
    /// Interval between readiness polls.
    pub poll_interval: Duration,
    /// Optional overall deadline, measured from harness creation.
    pub deadline: Option<Duration>,
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            ipfs_bin: PathBuf::from(DEFAULT_BIN_NAME),
            env: BTreeMap::new(),
            startup_timeout: default_startup_timeout(),
            poll_interval: default_poll_interval(),
            deadline: None,
        }
    }
}

impl HarnessConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        let ipfs_bin = std::env::var_os(ENV_IPFS_BIN)
            .map(PathBuf::from)
            .unwrap_or_else(resolve_default_bin);

        let startup_timeout = env_secs("IPFS_HARNESS_STARTUP_TIMEOUT_SECS")
            .unwrap_or_else(default_startup_timeout);
        let deadline = env_secs("IPFS_HARNESS_DEADLINE_SECS");

        Self {
            ipfs_bin,
            startup_timeout,
            deadline,
            ..Self::default()
        }
    }

    /// Use a specific binary.
    pub fn with_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.ipfs_bin = path.into();
        self
    }

    /// Add an environment variable for every process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the readiness bound.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Bound every wait of the harness by `deadline` from its creation.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Prefer `ipfs` on `PATH`, then the local build output.
fn resolve_default_bin() -> PathBuf {
    if let Some(found) = find_on_path(DEFAULT_BIN_NAME) {
        return found;
    }
    let local = Path::new(LOCAL_BUILD_BIN);
    if local.is_file() {
        if let Ok(abs) = local.canonicalize() {
            return abs;
        }
    }
    tracing::warn!(
        "no '{}' binary on PATH and no local build at {}; set {}",
        DEFAULT_BIN_NAME,
        LOCAL_BUILD_BIN,
        ENV_IPFS_BIN
    );
    PathBuf::from(DEFAULT_BIN_NAME)
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
