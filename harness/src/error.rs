//! Error types for the harness.

use std::path::PathBuf;
use std::time::Duration;

/// Main error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The binary exited non-zero on a must-succeed path.
    #[error("`{cmd}` exited with {exit_code}: {stderr}")]
    Binary {
        /// Command line that was run.
        cmd: String,
        /// Exit code (-1 when killed by a signal).
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The OS refused to start the binary.
    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        /// Command line that was run.
        cmd: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `ipfs init` failed for a node.
    #[error("init failed for node {node}: {detail}")]
    Init {
        /// Node ID.
        node: usize,
        /// What went wrong.
        detail: String,
    },

    /// The daemon answered readiness probes with a different identity.
    #[error("node {node} daemon reports peer ID {got}, config has {expected}")]
    IdentityMismatch {
        /// Node ID.
        node: usize,
        /// `Identity.PeerID` from the node's config.
        expected: String,
        /// ID returned by `POST /api/v0/id`.
        got: String,
    },

    /// A polled condition did not hold within its bound.
    #[error("timed out after {timeout:?} waiting for {condition}")]
    ReadinessTimeout {
        /// Human-readable condition, including the node when there is one.
        condition: String,
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// The daemon process died before it became ready.
    #[error("daemon for node {node} exited before becoming ready (exit={exit_code:?}): {stderr}")]
    DaemonExited {
        /// Node ID.
        node: usize,
        /// Exit code if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// `start_daemon` called on a node whose daemon is still live.
    #[error("node {node} daemon is already running")]
    AlreadyRunning {
        /// Node ID.
        node: usize,
    },

    /// Operation needs a running daemon.
    #[error("node {node} has no running daemon")]
    NotRunning {
        /// Node ID.
        node: usize,
    },

    /// Configuration read/write failure.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP request failed at the transport level.
    #[error("network error: {0}")]
    Network(String),

    /// A multiaddress could not be parsed or used.
    #[error("invalid multiaddr {addr}: {reason}")]
    Multiaddr {
        /// The offending address text.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No free port could be found.
    #[error("port allocation failed: {0}")]
    PortAllocation(String),

    /// A peering edge names a node outside the group, or itself.
    #[error("invalid peering topology: {0}")]
    InvalidTopology(String),

    /// A harness assertion did not hold.
    #[error("assertion failed: {description}: {details}")]
    Assertion {
        /// What was checked.
        description: String,
        /// Failure details.
        details: String,
    },

    /// One or more parallel operations failed.
    #[error("{} parallel operation(s) failed: {}", .0.len(), join_errors(.0))]
    Parallel(Vec<HarnessError>),

    /// General I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for HarnessError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            HarnessError::Network(format!("connection failed: {e}"))
        } else {
            HarnessError::Network(e.to_string())
        }
    }
}

impl From<hyper::Error> for HarnessError {
    fn from(e: hyper::Error) -> Self {
        HarnessError::Network(e.to_string())
    }
}

impl From<http::Error> for HarnessError {
    fn from(e: http::Error) -> Self {
        HarnessError::Network(e.to_string())
    }
}

fn join_errors(errors: &[HarnessError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the config file as JSON.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to write the config file.
    #[error("failed to write config file {path}: {source}")]
    Write {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Dotted path is empty or has empty segments.
    #[error("malformed config path: {0:?}")]
    InvalidPath(String),

    /// An intermediate path segment is not a JSON object.
    #[error("config path {path} crosses a non-object value")]
    NotAnObject {
        /// The dotted path being resolved.
        path: String,
    },

    /// Value could not be serialized to JSON.
    #[error("failed to serialize config value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
