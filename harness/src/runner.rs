//! Process runner.
//!
//! Every process the harness launches goes through [`Runner::run`]. It returns
//! a [`RunResult`] on every path, including spawn failures, so tests can assert
//! on how a command failed. [`Runner::must_run`] is the must-succeed variant.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::buffer::Buffer;
use crate::error::{HarnessError, Result};
use crate::process::{pump, ProcessHandle};

/// Whether `run` waits for exit or returns a live process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Wait for exit and drain output.
    #[default]
    Wait,
    /// Return immediately; the caller owns the live process.
    Start,
}

/// Per-invocation option.
pub enum CmdOpt {
    /// Set or override environment variables.
    Env(BTreeMap<String, String>),
    /// Remove an environment variable.
    RemoveEnv(String),
    /// Feed these bytes on stdin.
    Stdin(Vec<u8>),
    /// Stream this reader to stdin.
    StdinReader(Box<dyn AsyncRead + Send + Unpin>),
    /// Run in this working directory.
    Dir(PathBuf),
}

impl std::fmt::Debug for CmdOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CmdOpt::Env(env) => f.debug_tuple("Env").field(env).finish(),
            CmdOpt::RemoveEnv(name) => f.debug_tuple("RemoveEnv").field(name).finish(),
            CmdOpt::Stdin(bytes) => write!(f, "Stdin({} bytes)", bytes.len()),
            CmdOpt::StdinReader(_) => f.write_str("StdinReader(..)"),
            CmdOpt::Dir(dir) => f.debug_tuple("Dir").field(dir).finish(),
        }
    }
}

/// Set environment variables for one invocation.
pub fn run_with_env<I, K, V>(vars: I) -> CmdOpt
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    CmdOpt::Env(
        vars.into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// Feed `input` on stdin for one invocation.
pub fn run_with_stdin(input: impl Into<Vec<u8>>) -> CmdOpt {
    CmdOpt::Stdin(input.into())
}

/// A command to run.
#[derive(Debug)]
pub struct RunRequest {
    /// Binary path.
    pub path: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
    /// Per-invocation options, applied in order.
    pub opts: Vec<CmdOpt>,
    /// Dispatch mode.
    pub mode: RunMode,
}

impl RunRequest {
    /// Run `path` with `args`, waiting for exit.
    pub fn new<I, S>(path: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            args: args.into_iter().map(Into::into).collect(),
            opts: Vec::new(),
            mode: RunMode::Wait,
        }
    }

    /// Add an option.
    pub fn opt(mut self, opt: CmdOpt) -> Self {
        self.opts.push(opt);
        self
    }

    /// Return without waiting for exit.
    pub fn start(mut self) -> Self {
        self.mode = RunMode::Start;
        self
    }

    fn describe(&self) -> String {
        let mut parts = vec![self.path.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Outcome of one process invocation.
#[derive(Debug)]
pub struct RunResult {
    /// Command line that was run.
    pub cmd: String,
    /// Exit status, once the process has been reaped.
    pub status: Option<ExitStatus>,
    /// Captured standard output.
    pub stdout: Buffer,
    /// Captured standard error.
    pub stderr: Buffer,
    /// Error from spawning or waiting, if any.
    pub error: Option<io::Error>,
    process: Option<ProcessHandle>,
}

impl RunResult {
    fn failed_to_start(cmd: String, error: io::Error) -> Self {
        Self {
            cmd,
            status: None,
            stdout: Buffer::new(),
            stderr: Buffer::new(),
            error: Some(error),
            process: None,
        }
    }

    /// Exit code; -1 when unknown (not exited, killed by a signal, or never started).
    pub fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }

    /// Returns true if the process started and exited with code 0.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.status.map(|s| s.success()).unwrap_or(false)
    }

    /// The process handle, for results of [`RunMode::Start`].
    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// Take ownership of the process handle.
    pub fn take_process(&mut self) -> Option<ProcessHandle> {
        self.process.take()
    }

    #[cfg(all(test, unix))]
    pub(crate) fn for_test(cmd: &str, code: Option<i32>, stderr: Buffer) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            cmd: cmd.to_string(),
            status: code.map(|c| ExitStatus::from_raw(c << 8)),
            stdout: Buffer::new(),
            stderr,
            error: None,
            process: None,
        }
    }
}

/// Launches processes with a default environment and working directory.
#[derive(Debug, Clone)]
pub struct Runner {
    env: BTreeMap<String, String>,
    dir: PathBuf,
}

impl Runner {
    /// A runner with exactly `env` in `dir`.
    pub fn new(env: BTreeMap<String, String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            env,
            dir: dir.into(),
        }
    }

    /// A runner starting from the inherited process environment.
    pub fn inherited(dir: impl Into<PathBuf>) -> Self {
        Self::new(std::env::vars().collect(), dir)
    }

    /// Copy of this runner with one more default variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy of this runner with several more default variables.
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Default environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Default working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run a command. Never fails; spawn and wait errors land in the result.
    pub async fn run(&self, req: RunRequest) -> RunResult {
        let cmd = req.describe();
        let mut env = self.env.clone();
        let mut dir = self.dir.clone();
        let mut stdin: Option<Box<dyn AsyncRead + Send + Unpin>> = None;

        for opt in req.opts {
            match opt {
                CmdOpt::Env(vars) => env.extend(vars),
                CmdOpt::RemoveEnv(name) => {
                    env.remove(&name);
                }
                CmdOpt::Stdin(bytes) => stdin = Some(Box::new(io::Cursor::new(bytes))),
                CmdOpt::StdinReader(reader) => stdin = Some(reader),
                CmdOpt::Dir(d) => dir = d,
            }
        }

        let mut command = Command::new(&req.path);
        command
            .args(&req.args)
            .env_clear()
            .envs(&env)
            .current_dir(&dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(cmd = %cmd, mode = ?req.mode, "run");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(cmd = %cmd, error = %e, "spawn failed");
                return RunResult::failed_to_start(cmd, e);
            }
        };

        let stdout = Buffer::new();
        let stderr = Buffer::new();
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(pump(pipe, stdout.clone())));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(pump(pipe, stderr.clone())));
        }
        if let (Some(mut reader), Some(mut sink)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut reader, &mut sink).await {
                    debug!(error = %e, "stdin copy stopped");
                }
                let _ = sink.shutdown().await;
            });
        }

        let handle = ProcessHandle::new(child, cmd.clone(), stdout.clone(), stderr.clone(), readers);
        let mut result = RunResult {
            cmd,
            status: None,
            stdout,
            stderr,
            error: None,
            process: None,
        };

        if req.mode == RunMode::Wait {
            match handle.wait().await {
                Ok(status) => result.status = Some(status),
                Err(e) => result.error = Some(e),
            }
        }
        result.process = Some(handle);
        result
    }

    /// Run a command that must start and (in wait mode) exit 0.
    pub async fn must_run(&self, req: RunRequest) -> Result<RunResult> {
        let result = self.run(req).await;
        self.assert_no_error(&result)?;
        Ok(result)
    }

    /// Convert a failed result into an error.
    ///
    /// A still-running process is not a failure.
    pub fn assert_no_error(&self, result: &RunResult) -> Result<()> {
        if let Some(e) = &result.error {
            return Err(HarnessError::Spawn {
                cmd: result.cmd.clone(),
                source: io::Error::new(e.kind(), e.to_string()),
            });
        }
        match result.status {
            None => Ok(()),
            Some(status) if status.success() => Ok(()),
            Some(_) => Err(HarnessError::Binary {
                cmd: result.cmd.clone(),
                exit_code: result.exit_code(),
                stderr: result.stderr.trimmed(),
            }),
        }
    }
}
