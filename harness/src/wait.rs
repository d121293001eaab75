//! Readiness polling.
//!
//! One primitive, [`poll_until`], backs every wait in the harness: daemon
//! readiness, readiness files, and test-level `eventually` checks.

use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{HarnessError, Result};

/// Re-evaluate `pred` every `interval` until it returns true.
///
/// Fails with [`HarnessError::ReadinessTimeout`] naming `what` once `timeout`
/// elapses.
pub async fn eventually<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut pred: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    poll_until(what, timeout, interval, None, || {
        let fut = pred();
        async move { Ok(fut.await) }
    })
    .await
}

/// Poll `pred` until it yields `Ok(true)`.
///
/// `Ok(false)` retries after `interval`; `Err` aborts immediately. The loop
/// gives up at `timeout` or at `deadline`, whichever comes first.
pub(crate) async fn poll_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    deadline: Option<Instant>,
    mut pred: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let mut limit = start + timeout;
    if let Some(deadline) = deadline {
        limit = limit.min(deadline);
    }

    loop {
        if pred().await? {
            return Ok(());
        }
        let now = Instant::now();
        if now >= limit {
            return Err(HarnessError::ReadinessTimeout {
                condition: what.to_string(),
                timeout: limit.saturating_duration_since(start),
            });
        }
        tokio::time::sleep(interval.min(limit - now)).await;
    }
}

/// Wait until `path` exists with non-blank content, and return that content trimmed.
pub(crate) async fn wait_for_file(
    path: &Path,
    timeout: Duration,
    interval: Duration,
    deadline: Option<Instant>,
) -> Result<String> {
    let content = Mutex::new(String::new());
    let what = format!("file {}", path.display());
    poll_until(&what, timeout, interval, deadline, || {
        let found = &content;
        async move {
            match read_trimmed(path).await? {
                Some(text) => {
                    *found.lock().unwrap_or_else(|e| e.into_inner()) = text;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    })
    .await?;
    Ok(content.into_inner().unwrap_or_else(|e| e.into_inner()))
}

/// Read a file's trimmed content; `None` if it is missing or blank.
pub(crate) async fn read_trimmed(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
