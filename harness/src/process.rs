//! Supervision of a spawned child process.
//!
//! A [`ProcessHandle`] owns the tokio `Child` plus the reader tasks filling its
//! output buffers. Dropping a handle whose process is still running sends
//! SIGTERM, waits a bounded grace period, then kills and reaps it, so no daemon
//! outlives the test that started it even when that test panics.

use std::io;
use std::process::ExitStatus;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::buffer::Buffer;
use crate::config::DROP_GRACE;
use crate::error::{HarnessError, Result};

/// Handle to a running (or reaped) child process.
pub struct ProcessHandle {
    child: Mutex<Child>,
    pid: Option<u32>,
    cmd: String,
    stdout: Buffer,
    stderr: Buffer,
    exit: StdMutex<Option<ExitStatus>>,
    readers: StdMutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("cmd", &self.cmd)
            .field("exit", &self.exit_status())
            .finish()
    }
}

impl ProcessHandle {
    pub(crate) fn new(
        child: Child,
        cmd: String,
        stdout: Buffer,
        stderr: Buffer,
        readers: Vec<JoinHandle<()>>,
    ) -> Self {
        let pid = child.id();
        Self {
            child: Mutex::new(child),
            pid,
            cmd,
            stdout,
            stderr,
            exit: StdMutex::new(None),
            readers: StdMutex::new(readers),
        }
    }

    /// OS process id, if the process was started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The command line this process was started with.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Captured standard output (still growing while the process runs).
    pub fn stdout(&self) -> &Buffer {
        &self.stdout
    }

    /// Captured standard error (still growing while the process runs).
    pub fn stderr(&self) -> &Buffer {
        &self.stderr
    }

    /// Exit status, once the process has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_exit(&self, status: ExitStatus) {
        *self.exit.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
    }

    /// Returns true while the process has not exited.
    ///
    /// Reaps the process if it has exited since the last check.
    pub async fn is_alive(&self) -> bool {
        if self.exit_status().is_some() {
            return false;
        }
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "try_wait failed");
                false
            }
        }
    }

    /// Wait for the process to exit, then for its output to be fully drained.
    pub async fn wait(&self) -> io::Result<ExitStatus> {
        let status = match self.exit_status() {
            Some(status) => status,
            None => {
                let status = self.child.lock().await.wait().await?;
                self.record_exit(status);
                status
            }
        };

        let readers = std::mem::take(&mut *self.readers.lock().unwrap_or_else(|e| e.into_inner()));
        for reader in readers {
            let _ = reader.await;
        }
        Ok(status)
    }

    /// Send a signal to the process. A process that already exited is not an error.
    #[cfg(unix)]
    pub fn signal(&self, signal: libc::c_int) -> io::Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.exit_status().is_some() {
            return Ok(());
        }
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(err)
    }

    /// Stop the process with escalating signals and reap it.
    ///
    /// SIGTERM, SIGTERM, SIGQUIT, then SIGKILL, waiting after each.
    #[cfg(unix)]
    pub async fn stop(&self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status() {
            return Ok(status);
        }

        for (signal, grace) in crate::config::STOP_SCHEDULE {
            debug!(pid = ?self.pid, signal, "sending stop signal");
            self.signal(signal)?;
            if let Ok(status) = tokio::time::timeout(grace, self.wait()).await {
                return Ok(status?);
            }
        }

        Err(HarnessError::ReadinessTimeout {
            condition: format!("process {:?} ({}) to exit after SIGKILL", self.pid, self.cmd),
            timeout: crate::config::STOP_SCHEDULE
                .iter()
                .map(|(_, grace)| *grace)
                .sum(),
        })
    }

    /// Stop the process and reap it.
    #[cfg(not(unix))]
    pub async fn stop(&self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status() {
            return Ok(status);
        }
        self.child.lock().await.start_kill()?;
        Ok(self.wait().await?)
    }

    /// Synchronous terminate-wait-kill, for destructors.
    fn terminate_blocking(&mut self, grace: Duration) {
        if self.exit_status().is_some() {
            return;
        }
        let pid = self.pid;
        let child = self.child.get_mut();

        #[cfg(unix)]
        if let Some(pid) = pid {
            // SAFETY: kill(2) has no memory-safety preconditions.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        if poll_exit(child, grace).is_some() {
            return;
        }

        warn!(pid = ?pid, "process ignored SIGTERM for {:?}, killing", grace);
        if let Err(e) = child.start_kill() {
            warn!(pid = ?pid, error = %e, "kill failed");
            return;
        }
        if poll_exit(child, Duration::from_secs(5)).is_none() {
            warn!(pid = ?pid, "process still not reaped after SIGKILL");
        }
    }
}

fn poll_exit(child: &mut Child, within: Duration) -> Option<ExitStatus> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => return None,
        }
        if start.elapsed() >= within {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate_blocking(DROP_GRACE);
    }
}

/// Copy everything from a pipe into a buffer until EOF.
pub(crate) async fn pump<R>(mut pipe: R, sink: Buffer)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.write(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "output pipe closed");
                break;
            }
        }
    }
}
