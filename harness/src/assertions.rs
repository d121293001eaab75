//! Assertion helpers.
//!
//! Pure functions over observed state (peer lists, run results, HTTP
//! responses) that return pass/fail. Convert with
//! [`AssertionResult::into_result`] to fail a test through `?`.

use crate::error::{HarnessError, Result};
use crate::http_client::HttpResponse;
use crate::peer::PeerId;
use crate::runner::RunResult;

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }

    /// `Ok(())` on pass, [`HarnessError::Assertion`] on fail.
    pub fn into_result(self) -> Result<()> {
        if self.passed {
            Ok(())
        } else {
            Err(HarnessError::Assertion {
                description: self.description,
                details: self.failure_details.unwrap_or_default(),
            })
        }
    }
}

/// Assert that every expected peer appears in `peers`.
pub fn assert_peers_contain(peers: &[PeerId], expected: &[PeerId]) -> AssertionResult {
    let missing: Vec<&str> = expected
        .iter()
        .filter(|p| !peers.contains(p))
        .map(PeerId::as_str)
        .collect();
    if missing.is_empty() {
        AssertionResult::pass(&format!("all {} expected peers connected", expected.len()))
    } else {
        AssertionResult::fail(
            "expected peers connected",
            &format!(
                "missing {} of {}: {}; connected: {}",
                missing.len(),
                expected.len(),
                missing.join(", "),
                peers.len()
            ),
        )
    }
}

/// Assert that none of `forbidden` appears in `items`.
pub fn assert_array_does_not_contain<T>(items: &[T], forbidden: &[T]) -> AssertionResult
where
    T: PartialEq + std::fmt::Debug,
{
    let present: Vec<&T> = forbidden.iter().filter(|f| items.contains(f)).collect();
    if present.is_empty() {
        AssertionResult::pass(&format!("none of {} forbidden items present", forbidden.len()))
    } else {
        AssertionResult::fail("forbidden items absent", &format!("found {present:?}"))
    }
}

/// Assert that a permissive run exited non-zero with `needle` on stderr.
pub fn assert_run_failed_with(result: &RunResult, needle: &str) -> AssertionResult {
    let description = format!("`{}` fails with {needle:?}", result.cmd);
    if result.success() {
        return AssertionResult::fail(&description, "command succeeded");
    }
    let stderr = result.stderr.string();
    if stderr.contains(needle) {
        AssertionResult::pass(&description)
    } else {
        AssertionResult::fail(
            &description,
            &format!("exit {} with stderr {:?}", result.exit_code(), stderr.trim()),
        )
    }
}

/// Assert an HTTP status code.
pub fn assert_status(response: &HttpResponse, expected: u16) -> AssertionResult {
    if response.status == expected {
        AssertionResult::pass(&format!("status {expected}"))
    } else {
        let body: String = response.body.chars().take(200).collect();
        AssertionResult::fail(
            &format!("status {expected}"),
            &format!("got {} with body {body:?}", response.status),
        )
    }
}
