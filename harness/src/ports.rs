//! Conflict-free TCP port allocation.

use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, OnceLock};

use crate::error::{HarnessError, Result};

const MAX_ATTEMPTS: usize = 100;

static ISSUED: OnceLock<Mutex<HashSet<u16>>> = OnceLock::new();

/// Return a TCP port that is free right now and has never been issued by
/// this process before.
pub fn new_rand_port() -> Result<u16> {
    let issued = ISSUED.get_or_init(|| Mutex::new(HashSet::new()));

    for _ in 0..MAX_ATTEMPTS {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let mut issued = issued.lock().unwrap_or_else(|e| e.into_inner());
        if issued.insert(port) {
            tracing::trace!(port, "allocated port");
            return Ok(port);
        }
    }

    Err(HarnessError::PortAllocation(format!(
        "no unused port after {MAX_ATTEMPTS} attempts"
    )))
}

/// Swarm listen address on loopback for `port`.
pub fn loopback_tcp_addr(port: u16) -> String {
    format!("/ip4/127.0.0.1/tcp/{port}")
}
